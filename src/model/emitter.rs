//! Collaborator traits for geometry emission and layer classification.
//!
//! The pipeline never looks inside an artifact. It only asks the emitter
//! whether one is empty and how to merge several.

use glam::IVec3;

use super::neighborhood::Neighborhood;
use super::render_type::{ChiselRenderType, RenderLayer};
use crate::core::Result;
use crate::voxel::{AreaAccessor, ContentDescriptor};

/// Inputs for one emitted artifact.
pub struct EmitRequest<'a> {
    /// Voxels to build from.
    pub area: &'a dyn AreaAccessor,
    /// Most common non-empty content of the area.
    pub primary: &'a ContentDescriptor,
    pub render_type: ChiselRenderType,
    pub neighborhood: &'a Neighborhood,
    /// World position of the cell.
    pub origin: IVec3,
}

impl EmitRequest<'_> {
    /// Host render layer being built.
    pub fn layer(&self) -> RenderLayer {
        self.render_type.layer()
    }
}

/// Turns voxel content into render artifacts.
///
/// Artifacts must not depend on `origin`; results are cached across cells
/// with identical content.
pub trait GeometryEmitter: Send + Sync + 'static {
    type Artifact: Clone + Send + Sync + 'static;

    fn emit(&self, request: &EmitRequest<'_>) -> Result<Self::Artifact>;

    fn is_empty(&self, artifact: &Self::Artifact) -> bool;

    /// Merge non-empty artifacts into one composite.
    fn combine(&self, parts: Vec<Self::Artifact>) -> Self::Artifact;
}

/// Maps content to the render layers it appears in.
pub trait LayerClassifier: Send + Sync + 'static {
    fn layers(&self, state: &ContentDescriptor) -> Vec<RenderLayer>;

    /// Whether `layer` is built as separate solid and fluid halves.
    fn is_fluid_layer(&self, layer: RenderLayer) -> bool;
}
