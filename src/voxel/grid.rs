//! Dense per-cell voxel grid backed by a palette and packed indices.

use std::collections::{HashMap, HashSet};
use std::fmt;

use glam::IVec3;
use log::{debug, warn};

use super::accessor::{AreaAccessor, AreaMutator, AreaSignature, Fingerprinter};
use super::descriptor::ContentDescriptor;
use super::geometry::GridGeometry;
use super::palette::{Palette, PaletteView};
use super::statistics::GridStatistics;
use super::storage::{PackedIndices, bits_required};
use crate::core::{Error, Result};
use crate::math::collision_index;

/// Voxel grid of one cell.
///
/// Every stored index is a valid palette index. Writes need `&mut self`,
/// which gives the per-cell exclusion concurrent readers rely on.
#[derive(Clone)]
pub struct VoxelGrid {
    geometry: GridGeometry,
    palette: Palette,
    indices: PackedIndices,
}

impl VoxelGrid {
    /// All-empty grid.
    pub fn new(geometry: GridGeometry) -> Self {
        let palette = Palette::new();
        let indices = PackedIndices::new(geometry.bits_per_block(), bits_required(palette.len()));
        Self {
            geometry,
            palette,
            indices,
        }
    }

    /// Grid with every voxel set to `descriptor`.
    pub fn filled(geometry: GridGeometry, descriptor: &ContentDescriptor) -> Self {
        let mut grid = Self::new(geometry);
        grid.fill(descriptor);
        grid
    }

    /// Assemble a grid from decoded parts.
    ///
    /// `indices` still address the persisted palette list; `folded` is the
    /// remap the palette load returned for repeated entries and is applied
    /// first. Indices that still fall outside the palette are reset to 0
    /// (empty) and logged.
    pub(crate) fn from_parts(
        geometry: GridGeometry,
        palette: Palette,
        mut indices: PackedIndices,
        folded: &HashMap<usize, usize>,
    ) -> Result<Self> {
        if indices.len() != geometry.bits_per_block() {
            return Err(Error::corrupt(format!(
                "grid has {} voxels, geometry needs {}",
                indices.len(),
                geometry.bits_per_block()
            )));
        }
        let palette_len = palette.len();
        let mut reset = 0usize;
        indices.map_in_place(|index| {
            let index = folded.get(&(index as usize)).map_or(index as usize, |&first| first);
            if index < palette_len {
                index as u32
            } else {
                reset += 1;
                0
            }
        });
        if !folded.is_empty() {
            debug!("Rewrote voxel indices through {} folded palette slots", folded.len());
        }
        if reset > 0 {
            warn!("Reset {} out-of-range voxel indices (palette has {} entries)", reset, palette_len);
        }
        let mut grid = Self {
            geometry,
            palette,
            indices,
        };
        grid.fit_indices();
        Ok(grid)
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    /// Read-only view of the palette. Palette changes go through the grid
    /// so stored indices are remapped with them.
    pub fn palette(&self) -> PaletteView<'_> {
        PaletteView::new(&self.palette)
    }

    pub(crate) fn indices(&self) -> &PackedIndices {
        &self.indices
    }

    /// Palette index stored at `pos`, or `None` outside the grid.
    pub fn index_at(&self, pos: IVec3) -> Option<usize> {
        let offset = collision_index(pos, &self.geometry).ok()?;
        Some(self.indices.get(offset) as usize)
    }

    /// Widen the packed storage if the palette outgrew it. Never narrows,
    /// so stored indices always survive.
    fn grow_indices(&mut self) {
        if bits_required(self.palette.len()) > self.indices.bits() {
            self.fit_indices();
        }
    }

    /// Resize the packed storage to the width the palette needs.
    fn fit_indices(&mut self) {
        let bits = bits_required(self.palette.len());
        if bits != self.indices.bits() {
            debug!("Repacking voxel indices {} -> {} bits", self.indices.bits(), bits);
            self.indices.repack(bits);
        }
    }

    /// Write `descriptor` at `pos`. Positions outside the grid are rejected.
    pub fn set(&mut self, pos: IVec3, descriptor: &ContentDescriptor) -> Result<()> {
        let offset = collision_index(pos, &self.geometry)?;
        let index = self.palette.get_or_create_index(descriptor);
        self.grow_indices();
        self.indices.set(offset, index as u32);
        Ok(())
    }

    /// Set every voxel to `descriptor`, dropping all other palette entries.
    pub fn fill(&mut self, descriptor: &ContentDescriptor) {
        self.palette.clear();
        let index = self.palette.get_or_create_index(descriptor);
        self.indices = PackedIndices::new(self.geometry.bits_per_block(), bits_required(self.palette.len()));
        self.indices.fill(index as u32);
    }

    /// Reset to all-empty.
    pub fn clear(&mut self) {
        self.palette.clear();
        self.indices = PackedIndices::new(self.geometry.bits_per_block(), 1);
    }

    /// Voxel count per palette index.
    pub fn index_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.palette.len()];
        for index in self.indices.iter() {
            if let Some(count) = counts.get_mut(index as usize) {
                *count += 1;
            }
        }
        counts
    }

    /// Rewrite stored indices through `remap`. Indices absent from the map
    /// are unchanged.
    fn apply_remap(&mut self, remap: &HashMap<usize, usize>) {
        if remap.is_empty() {
            return;
        }
        self.indices.map_in_place(|index| {
            remap.get(&(index as usize)).map_or(index, |&new| new as u32)
        });
    }

    /// Drop palette entries no voxel references and remap the survivors.
    /// Returns the number of entries removed.
    pub fn compact(&mut self) -> usize {
        let counts = self.index_counts();
        let unused: HashSet<ContentDescriptor> = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| self.palette.lookup(index))
            .filter(|descriptor| !descriptor.is_empty())
            .collect();
        if unused.is_empty() {
            return 0;
        }

        let before = self.palette.len();
        self.sanitize(&unused);
        before - self.palette.len()
    }

    /// Remove `removable` descriptors from the palette and rewrite stored
    /// indices to match. Voxels that held a removed descriptor become empty.
    ///
    /// # Returns
    /// Every old -> new index pair applied. Removed entries map to the empty
    /// descriptor's index.
    pub fn sanitize(&mut self, removable: &HashSet<ContentDescriptor>) -> HashMap<usize, usize> {
        let dropped: Vec<usize> = self
            .palette
            .descriptors()
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| !descriptor.is_empty() && removable.contains(*descriptor))
            .map(|(index, _)| index)
            .collect();
        if dropped.is_empty() {
            return HashMap::new();
        }

        let counts = self.index_counts();
        let orphaned = dropped.iter().any(|&index| counts.get(index).is_some_and(|&count| count > 0));

        let mut remap = self.palette.sanitize(removable);
        let empty = if orphaned {
            Some(self.palette.get_or_create_index(&ContentDescriptor::empty()))
        } else {
            self.palette.index_of(&ContentDescriptor::empty())
        };
        if let Some(empty) = empty {
            for index in dropped {
                remap.insert(index, empty);
            }
        }
        self.grow_indices();
        self.apply_remap(&remap);
        self.fit_indices();
        remap
    }

    pub fn statistics(&self) -> GridStatistics {
        GridStatistics::from_grid(self)
    }

    pub fn is_empty_only(&self) -> bool {
        let empty = self.palette.index_of(&ContentDescriptor::empty());
        self.indices.iter().all(|index| Some(index as usize) == empty)
    }
}

impl AreaAccessor for VoxelGrid {
    fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    fn get(&self, pos: IVec3) -> ContentDescriptor {
        match self.index_at(pos) {
            Some(index) => self.palette.lookup(index),
            None => ContentDescriptor::empty(),
        }
    }

    fn contained_states(&self) -> Vec<ContentDescriptor> {
        self.statistics().contained_states()
    }

    fn fingerprint(&self) -> u64 {
        let mut fingerprint = Fingerprinter::new(self.geometry);
        for index in self.indices.iter() {
            fingerprint.push(index);
        }
        fingerprint.finish(|&index| self.palette.lookup(index))
    }

    fn signature(&self) -> AreaSignature {
        let mut fingerprint = Fingerprinter::recording(self.geometry);
        for index in self.indices.iter() {
            fingerprint.push(index);
        }
        fingerprint.finish_signature(|&index| self.palette.lookup(index))
    }
}

impl AreaMutator for VoxelGrid {
    fn set(&mut self, pos: IVec3, descriptor: &ContentDescriptor) -> Result<()> {
        VoxelGrid::set(self, pos, descriptor)
    }
}

/// Grids are equal when every voxel holds an equal descriptor, whatever the
/// palette layout.
impl PartialEq for VoxelGrid {
    fn eq(&self, other: &Self) -> bool {
        if self.geometry != other.geometry {
            return false;
        }
        if self.palette == other.palette {
            return self.indices.iter().eq(other.indices.iter());
        }
        let ours = self.palette.descriptors();
        let theirs = other.palette.descriptors();
        self.indices
            .iter()
            .zip(other.indices.iter())
            .all(|(a, b)| ours.get(a as usize) == theirs.get(b as usize))
    }
}

impl Eq for VoxelGrid {}

impl fmt::Debug for VoxelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelGrid")
            .field("side", &self.geometry.bits_per_side())
            .field("palette", &self.palette)
            .field("index_bits", &self.indices.bits())
            .finish()
    }
}
