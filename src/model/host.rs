//! Host-side hooks run on the primary thread after a model is published.

use super::cell::{CellId, RegionId};

/// The host world as seen from the primary thread.
pub trait HostContext {
    /// Region currently being observed, if any.
    fn active_region(&self) -> Option<RegionId>;

    /// Invalidate cached lookups that captured the cell's old model data.
    fn request_model_data_refresh(&mut self, cell: CellId);

    /// Schedule a repaint of the cell.
    fn mark_cell_updated(&mut self, cell: CellId);
}

/// Host with no active region; publishes never trigger a refresh.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessHost;

impl HostContext for HeadlessHost {
    fn active_region(&self) -> Option<RegionId> {
        None
    }

    fn request_model_data_refresh(&mut self, _cell: CellId) {}

    fn mark_cell_updated(&mut self, _cell: CellId) {}
}
