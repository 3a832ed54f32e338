//! Voxel-bearing cells and their published model data.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::IVec3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::render_type::RenderLayer;
use crate::core::Result;
use crate::voxel::{ContentDescriptor, GridStatistics, VoxelGrid};

/// Spatial region (world, dimension) a cell belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// Identity of a cell: its region and coarse position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId {
    pub region: RegionId,
    pub pos: IVec3,
}

impl CellId {
    pub fn new(region: RegionId, pos: IVec3) -> Self {
        Self { region, pos }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}, {}, {}]", self.region.0, self.pos.x, self.pos.y, self.pos.z)
    }
}

/// Artifacts built for one cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelData<A> {
    known: BTreeMap<RenderLayer, A>,
    unknown: Option<A>,
}

impl<A> ModelData<A> {
    pub fn empty() -> Self {
        Self {
            known: BTreeMap::new(),
            unknown: None,
        }
    }

    pub(crate) fn new(known: BTreeMap<RenderLayer, A>, unknown: Option<A>) -> Self {
        Self { known, unknown }
    }

    /// Artifact for `layer`, falling back to the merged catch-all for
    /// layers that were not built.
    pub fn get(&self, layer: RenderLayer) -> Option<&A> {
        self.known.get(&layer).or(self.unknown.as_ref())
    }

    /// Artifact built specifically for `layer`.
    pub fn layer(&self, layer: RenderLayer) -> Option<&A> {
        self.known.get(&layer)
    }

    /// Merge of every per-layer artifact.
    pub fn unknown(&self) -> Option<&A> {
        self.unknown.as_ref()
    }

    pub fn layers(&self) -> impl Iterator<Item = (RenderLayer, &A)> {
        self.known.iter().map(|(layer, artifact)| (*layer, artifact))
    }

    /// Number of per-layer artifacts.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl<A> Default for ModelData<A> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A cell holding a voxel grid and the latest model data built from it.
///
/// Grid writes go through the write lock; model data is only replaced on
/// the primary thread.
pub struct VoxelCell<A> {
    id: CellId,
    grid: RwLock<VoxelGrid>,
    model: RwLock<Option<Arc<ModelData<A>>>>,
    publishes: AtomicU64,
}

impl<A> VoxelCell<A> {
    pub fn new(id: CellId, grid: VoxelGrid) -> Self {
        Self {
            id,
            grid: RwLock::new(grid),
            model: RwLock::new(None),
            publishes: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn region(&self) -> RegionId {
        self.id.region
    }

    /// World origin of the cell.
    pub fn origin(&self) -> IVec3 {
        self.id.pos
    }

    pub fn grid(&self) -> RwLockReadGuard<'_, VoxelGrid> {
        self.grid.read()
    }

    pub fn grid_mut(&self) -> RwLockWriteGuard<'_, VoxelGrid> {
        self.grid.write()
    }

    /// Copy of the grid for off-thread reads.
    pub fn snapshot(&self) -> VoxelGrid {
        self.grid.read().clone()
    }

    pub fn set(&self, pos: IVec3, descriptor: &ContentDescriptor) -> Result<()> {
        self.grid.write().set(pos, descriptor)
    }

    /// Compact the grid's palette; returns the number of entries removed.
    pub fn compact(&self) -> usize {
        self.grid.write().compact()
    }

    pub fn statistics(&self) -> GridStatistics {
        self.grid.read().statistics()
    }

    pub fn model_data(&self) -> Option<Arc<ModelData<A>>> {
        self.model.read().clone()
    }

    pub(crate) fn set_model_data(&self, data: Arc<ModelData<A>>) {
        *self.model.write() = Some(data);
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    /// How many times model data has been published to this cell.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }
}

impl<A> fmt::Debug for VoxelCell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelCell")
            .field("id", &self.id)
            .field("has_model", &self.model.read().is_some())
            .field("publishes", &self.publish_count())
            .finish()
    }
}
