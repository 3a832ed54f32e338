//! Mathematical utilities and data structures

pub mod direction;
pub mod collision_index;
pub mod mutator;

pub use direction::{Axis, Direction};
pub use collision_index::{collision_index, collision_index_sized};
pub use mutator::PositionMutator;
