//! Chiselgrid - palette-compressed voxel cells with an asynchronous model build pipeline

pub mod core;
pub mod math;
pub mod voxel;
pub mod model;
