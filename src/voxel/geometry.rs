//! Voxel grid dimensions

use glam::IVec3;

use crate::core::config::{GeometryConfig, MAX_BITS_PER_SIDE};
use crate::core::{Error, Result};

/// Dimensions of the fine grid inside one cell.
///
/// Fixed for the lifetime of any grid built from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridGeometry {
    bits_per_side: u32,
}

impl GridGeometry {
    /// 16 voxels per side, 4096 per cell.
    pub const DEFAULT: GridGeometry = GridGeometry { bits_per_side: 16 };

    /// Create a geometry with `bits_per_side` voxels along each axis.
    pub fn new(bits_per_side: u32) -> Result<Self> {
        if bits_per_side == 0 || bits_per_side > MAX_BITS_PER_SIDE {
            return Err(Error::out_of_range(format!(
                "bits_per_side must be in 1..={}, got {}",
                MAX_BITS_PER_SIDE, bits_per_side
            )));
        }
        Ok(Self { bits_per_side })
    }

    pub fn from_config(config: &GeometryConfig) -> Result<Self> {
        Self::new(config.bits_per_side)
    }

    /// Voxels along one side.
    pub const fn bits_per_side(&self) -> u32 {
        self.bits_per_side
    }

    /// Voxels in one layer (side²).
    pub const fn bits_per_layer(&self) -> usize {
        (self.bits_per_side * self.bits_per_side) as usize
    }

    /// Voxels in the whole cell (side³).
    pub const fn bits_per_block(&self) -> usize {
        self.bits_per_layer() * self.bits_per_side as usize
    }

    /// Edge length of one voxel relative to the cell.
    pub fn size_per_bit(&self) -> f32 {
        1.0 / self.bits_per_side as f32
    }

    /// Bits needed to address any voxel of the cell by linear offset.
    pub const fn position_bits(&self) -> u32 {
        let count = self.bits_per_block();
        if count <= 1 {
            1
        } else {
            usize::BITS - (count - 1).leading_zeros()
        }
    }

    /// Per-axis extent as a vector.
    pub const fn extent(&self) -> IVec3 {
        let side = self.bits_per_side as i32;
        IVec3::new(side, side, side)
    }

    /// Whether `pos` lies inside the cell.
    pub fn contains(&self, pos: IVec3) -> bool {
        let side = self.bits_per_side as i32;
        pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(side)).all()
    }
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}
