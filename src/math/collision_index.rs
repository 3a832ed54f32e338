//! Linear storage offsets for voxel coordinates.
//!
//! Storage is X-major: one full YZ layer per X step, then one Z row per Y
//! step, then Z.

use glam::IVec3;

use crate::core::{Error, Result};
use crate::voxel::geometry::GridGeometry;

/// Offset of `pos` inside a cell with the given geometry.
///
/// `index = x * bits_per_layer + y * bits_per_side + z`. Every component must
/// lie in `0..bits_per_side`.
pub fn collision_index(pos: IVec3, geometry: &GridGeometry) -> Result<usize> {
    if !geometry.contains(pos) {
        return Err(Error::out_of_range(format!(
            "position {} outside a cell of side {}",
            pos,
            geometry.bits_per_side()
        )));
    }

    let side = geometry.bits_per_side() as usize;
    Ok(pos.x as usize * geometry.bits_per_layer() + pos.y as usize * side + pos.z as usize)
}

/// Offset of `pos` inside an area of `y_size` by `z_size` rows.
///
/// `index = x * (y_size * z_size) + y * z_size + z`. X is only required to be
/// non-negative; it is not bounded above.
pub fn collision_index_sized(pos: IVec3, y_size: i32, z_size: i32) -> Result<usize> {
    if pos.x < 0 || pos.y < 0 || pos.z < 0 {
        return Err(Error::out_of_range(format!(
            "x, y and z must be positive: {}, {}, {}",
            pos.x, pos.y, pos.z
        )));
    }

    if pos.y >= y_size || pos.z >= z_size {
        return Err(Error::out_of_range(format!(
            "y and z must be smaller than the size: {}, {}, {}, {}",
            pos.y, pos.z, y_size, z_size
        )));
    }

    let layer = y_size as usize * z_size as usize;
    (pos.x as usize)
        .checked_mul(layer)
        .and_then(|offset| offset.checked_add(pos.y as usize * z_size as usize + pos.z as usize))
        .ok_or_else(|| Error::out_of_range(format!("offset of {} overflows", pos)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout() {
        let geometry = GridGeometry::new(16).unwrap();

        assert_eq!(collision_index(IVec3::new(0, 0, 0), &geometry).unwrap(), 0);
        assert_eq!(collision_index(IVec3::new(1, 0, 0), &geometry).unwrap(), 256);
        assert_eq!(collision_index(IVec3::new(0, 1, 0), &geometry).unwrap(), 16);
        assert_eq!(collision_index(IVec3::new(0, 0, 1), &geometry).unwrap(), 1);
        assert_eq!(collision_index(IVec3::new(15, 15, 15), &geometry).unwrap(), 4095);
    }

    #[test]
    fn test_canonical_rejects_outside() {
        let geometry = GridGeometry::new(16).unwrap();

        assert!(collision_index(IVec3::new(16, 0, 0), &geometry).is_err());
        assert!(collision_index(IVec3::new(0, -1, 0), &geometry).is_err());
        assert!(collision_index(IVec3::new(0, 0, 16), &geometry).is_err());
    }

    #[test]
    fn test_sized_layout() {
        assert_eq!(collision_index_sized(IVec3::new(0, 0, 0), 4, 8).unwrap(), 0);
        assert_eq!(collision_index_sized(IVec3::new(0, 0, 7), 4, 8).unwrap(), 7);
        assert_eq!(collision_index_sized(IVec3::new(0, 1, 0), 4, 8).unwrap(), 8);
        assert_eq!(collision_index_sized(IVec3::new(1, 0, 0), 4, 8).unwrap(), 32);
    }

    #[test]
    fn test_sized_rejects_negative_and_overflowing_yz() {
        assert!(matches!(collision_index_sized(IVec3::new(-1, 0, 0), 4, 4), Err(Error::OutOfRange(_))));
        assert!(matches!(collision_index_sized(IVec3::new(0, -1, 0), 4, 4), Err(Error::OutOfRange(_))));
        assert!(matches!(collision_index_sized(IVec3::new(0, 0, -1), 4, 4), Err(Error::OutOfRange(_))));
        assert!(matches!(collision_index_sized(IVec3::new(0, 4, 0), 4, 4), Err(Error::OutOfRange(_))));
        assert!(matches!(collision_index_sized(IVec3::new(0, 0, 4), 4, 4), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_sized_leaves_x_unbounded() {
        // X has no upper bound in the sized form; only y and z are checked.
        assert_eq!(collision_index_sized(IVec3::new(100, 0, 0), 4, 4).unwrap(), 1600);
    }
}
