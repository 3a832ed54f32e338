//! Render model building for voxel cells

pub mod render_type;
pub mod neighborhood;
pub mod emitter;
pub mod cache;
pub mod cell;
pub mod host;
pub mod executor;
pub mod pipeline;

pub use render_type::{ChiselRenderType, RenderLayer};
pub use neighborhood::{Neighbor, NeighborLookup, Neighborhood, NeighborhoodSignature, SharedArea};
pub use emitter::{EmitRequest, GeometryEmitter, LayerClassifier};
pub use cache::{ModelCache, ModelKey};
pub use cell::{CellId, ModelData, RegionId, VoxelCell};
pub use host::{HeadlessHost, HostContext};
pub use executor::PrimaryExecutor;
pub use pipeline::{BuildStatus, BuildTicket, ModelBuildPipeline, PerStateModels};
