//! Per-grid content statistics.

use super::descriptor::ContentDescriptor;
use super::grid::VoxelGrid;

/// Voxel count of one descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateCount {
    pub descriptor: ContentDescriptor,
    pub count: usize,
}

/// Snapshot of what a grid contains, in palette order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridStatistics {
    counts: Vec<StateCount>,
    total: usize,
}

impl GridStatistics {
    pub fn from_grid(grid: &VoxelGrid) -> Self {
        let palette = grid.palette();
        let counts: Vec<StateCount> = grid
            .index_counts()
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .map(|(index, count)| StateCount {
                descriptor: palette.lookup(index),
                count,
            })
            .collect();
        Self {
            counts,
            total: grid.geometry().bits_per_block(),
        }
    }

    /// Counts of every present descriptor, the empty one included.
    pub fn state_counts(&self) -> &[StateCount] {
        &self.counts
    }

    pub fn count_of(&self, descriptor: &ContentDescriptor) -> usize {
        self.counts
            .iter()
            .find(|entry| &entry.descriptor == descriptor)
            .map_or(0, |entry| entry.count)
    }

    /// Total voxels in the grid.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Non-empty voxels.
    pub fn filled(&self) -> usize {
        self.counts
            .iter()
            .filter(|entry| !entry.descriptor.is_empty())
            .map(|entry| entry.count)
            .sum()
    }

    /// Distinct non-empty descriptors present.
    pub fn contained_states(&self) -> Vec<ContentDescriptor> {
        self.counts
            .iter()
            .filter(|entry| !entry.descriptor.is_empty())
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Most common non-empty descriptor; ties go to the lower palette index.
    /// Empty when the grid holds nothing else.
    pub fn primary_state(&self) -> ContentDescriptor {
        let mut best: Option<&StateCount> = None;
        for entry in self.counts.iter().filter(|entry| !entry.descriptor.is_empty()) {
            if best.is_none_or(|b| entry.count > b.count) {
                best = Some(entry);
            }
        }
        best.map(|entry| entry.descriptor.clone()).unwrap_or_default()
    }

    pub fn is_empty_only(&self) -> bool {
        self.counts.iter().all(|entry| entry.descriptor.is_empty())
    }
}
