//! Read-only view of the six cells around a cell.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::math::Direction;
use crate::voxel::{AreaAccessor, AreaSignature, ContentDescriptor};

/// Shared accessor to a neighboring cell's voxels.
pub type SharedArea = Arc<dyn AreaAccessor + Send + Sync>;

/// What borders a cell on one side.
#[derive(Clone, Default)]
pub struct Neighbor {
    /// Content at the shared boundary.
    pub state: ContentDescriptor,
    /// Voxel view of the neighboring cell, if it is voxelized.
    pub area: Option<SharedArea>,
}

impl Neighbor {
    pub fn new(state: ContentDescriptor, area: Option<SharedArea>) -> Self {
        Self { state, area }
    }
}

impl fmt::Debug for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neighbor")
            .field("state", &self.state)
            .field("voxelized", &self.area.is_some())
            .finish()
    }
}

/// Supplies neighbors of a cell. Implemented by the host world.
pub trait NeighborLookup {
    fn neighbor(&self, direction: Direction) -> Neighbor;
}

impl<F> NeighborLookup for F
where
    F: Fn(Direction) -> Neighbor,
{
    fn neighbor(&self, direction: Direction) -> Neighbor {
        self(direction)
    }
}

/// The six neighbors of a cell, indexed by [`Direction::ordinal`].
#[derive(Clone, Debug, Default)]
pub struct Neighborhood {
    neighbors: [Neighbor; 6],
}

impl Neighborhood {
    /// Neighborhood with empty content on every side.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Query `lookup` once per direction.
    pub fn collect(lookup: &impl NeighborLookup) -> Self {
        Self {
            neighbors: Direction::ALL.map(|direction| lookup.neighbor(direction)),
        }
    }

    /// Build from separate state and area lookups.
    pub fn build(
        mut state: impl FnMut(Direction) -> ContentDescriptor,
        mut area: impl FnMut(Direction) -> Option<SharedArea>,
    ) -> Self {
        Self {
            neighbors: Direction::ALL.map(|direction| Neighbor::new(state(direction), area(direction))),
        }
    }

    pub fn with(mut self, direction: Direction, neighbor: Neighbor) -> Self {
        self.neighbors[direction.ordinal()] = neighbor;
        self
    }

    pub fn get(&self, direction: Direction) -> &Neighbor {
        &self.neighbors[direction.ordinal()]
    }

    pub fn state(&self, direction: Direction) -> &ContentDescriptor {
        &self.get(direction).state
    }

    pub fn area(&self, direction: Direction) -> Option<&SharedArea> {
        self.get(direction).area.as_ref()
    }

    /// Structural hash of all six sides.
    pub fn fingerprint(&self) -> u64 {
        self.signature().fingerprint
    }

    /// Canonical content of all six sides, used in model cache keys.
    pub fn signature(&self) -> NeighborhoodSignature {
        let mut hasher = DefaultHasher::new();
        let sides: Vec<(ContentDescriptor, Option<AreaSignature>)> = self
            .neighbors
            .iter()
            .map(|neighbor| {
                neighbor.state.hash(&mut hasher);
                let area = neighbor.area.as_ref().map(|area| area.signature());
                match &area {
                    Some(signature) => {
                        1u8.hash(&mut hasher);
                        signature.fingerprint().hash(&mut hasher);
                    }
                    None => 0u8.hash(&mut hasher),
                }
                (neighbor.state.clone(), area)
            })
            .collect();
        NeighborhoodSignature {
            fingerprint: hasher.finish(),
            sides,
        }
    }
}

/// Canonical content of a [`Neighborhood`]. Hashes by fingerprint and
/// compares in full.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborhoodSignature {
    fingerprint: u64,
    sides: Vec<(ContentDescriptor, Option<AreaSignature>)>,
}

impl NeighborhoodSignature {
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl Hash for NeighborhoodSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{GridGeometry, StateId, VoxelGrid};
    use glam::IVec3;

    fn stone() -> ContentDescriptor {
        ContentDescriptor::new(StateId(1))
    }

    #[test]
    fn test_build_by_direction() {
        let neighborhood = Neighborhood::build(
            |direction| {
                if direction == Direction::Up {
                    stone()
                } else {
                    ContentDescriptor::empty()
                }
            },
            |_| None,
        );
        assert_eq!(neighborhood.state(Direction::Up), &stone());
        assert!(neighborhood.state(Direction::Down).is_empty());
        assert!(neighborhood.area(Direction::Up).is_none());
    }

    #[test]
    fn test_collect_from_closure() {
        let lookup = |direction: Direction| Neighbor::new(ContentDescriptor::new(StateId(direction.ordinal() as u32)), None);
        let neighborhood = Neighborhood::collect(&lookup);
        for direction in Direction::ALL {
            assert_eq!(neighborhood.state(direction).state(), StateId(direction.ordinal() as u32));
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let empty = Neighborhood::empty();
        assert_eq!(empty.fingerprint(), Neighborhood::empty().fingerprint());

        let solid_below = Neighborhood::empty().with(Direction::Down, Neighbor::new(stone(), None));
        assert_ne!(empty.fingerprint(), solid_below.fingerprint());

        let mut grid = VoxelGrid::new(GridGeometry::new(2).unwrap());
        grid.set(IVec3::ZERO, &stone()).unwrap();
        let area: SharedArea = Arc::new(grid);
        let voxelized = Neighborhood::empty().with(Direction::Down, Neighbor::new(stone(), Some(area)));
        assert_ne!(voxelized.fingerprint(), solid_below.fingerprint());
        assert_ne!(voxelized.signature(), solid_below.signature());
        assert_eq!(voxelized.signature(), voxelized.clone().signature());
    }
}
