//! Voxel data structures and operations

pub mod geometry;
pub mod descriptor;
pub mod codec;
pub mod palette;
pub mod storage;
pub mod grid;
pub mod accessor;
pub mod statistics;
pub mod persist;

pub use geometry::GridGeometry;
pub use descriptor::{ContentDescriptor, StateId, StateVariant, VariantValue};
pub use palette::{Palette, PaletteView, ResizeListener};
pub use storage::PackedIndices;
pub use grid::VoxelGrid;
pub use accessor::{AreaAccessor, AreaIter, AreaMutator, AreaSignature, FilteredAreaAccessor};
pub use statistics::{GridStatistics, StateCount};
pub use persist::{
    compress_grid, decompress_grid, delete_grid, grid_exists, grid_path, load_grid, load_grid_or_reset,
    save_grid,
};
