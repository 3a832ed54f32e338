//! Coordinate permutations used to change iteration order without sorting.
//!
//! A mutator maps a storage position to the key it is visited under. Areas
//! visit keys in X, Y, Z lexicographic order (X slowest), so swapping which
//! coordinate member lands in the key's X slot changes the outermost loop
//! axis. Swapping X and Y of every position, for example, yields a Y-first
//! traversal.

use std::fmt;

use glam::IVec3;

use super::direction::Axis;

/// A permutation of the three coordinate members.
///
/// Output member `i` is input member `axes[i]`. The closed set of primitives
/// is the identity plus the six axis orders; composition stays inside it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionMutator {
    axes: [u8; 3],
}

impl PositionMutator {
    const fn from_axes(axes: [u8; 3]) -> Self {
        Self { axes }
    }

    /// Performs no change to the passed in position.
    pub const fn identity() -> Self {
        Self::from_axes([0, 1, 2])
    }

    /// The natural loop order; same mapping as [`PositionMutator::identity`].
    pub const fn xyz() -> Self {
        Self::from_axes([0, 1, 2])
    }

    /// Switches the Y and Z members.
    pub const fn xzy() -> Self {
        Self::from_axes([0, 2, 1])
    }

    /// Switches the X and Z members.
    pub const fn zyx() -> Self {
        Self::from_axes([2, 1, 0])
    }

    /// Switches the X and Y members.
    pub const fn yxz() -> Self {
        Self::from_axes([1, 0, 2])
    }

    /// Moves Z into the X slot, X into Y and Y into Z.
    pub const fn zxy() -> Self {
        Self::from_axes([2, 0, 1])
    }

    /// `zyx` followed by `yxz`.
    pub const fn yzx() -> Self {
        Self::zyx().then(Self::yxz())
    }

    /// The mutator that visits `axis` in the outermost loop.
    ///
    /// The remaining two axes keep their X, Y, Z relative order.
    pub const fn from_axis(axis: Axis) -> Self {
        match axis {
            Axis::X => Self::xyz(),
            Axis::Y => Self::yxz(),
            Axis::Z => Self::zxy(),
        }
    }

    /// Chain `next` after this mutator: `next.mutate(self.mutate(p, e), e)`.
    pub const fn then(self, next: PositionMutator) -> Self {
        let a = self.axes;
        let b = next.axes;
        Self::from_axes([a[b[0] as usize], a[b[1] as usize], a[b[2] as usize]])
    }

    /// The mutator undoing this one, so `m.then(m.inverse())` is the identity.
    pub const fn inverse(self) -> Self {
        let mut inv = [0u8; 3];
        let mut i = 0;
        while i < 3 {
            inv[self.axes[i] as usize] = i as u8;
            i += 1;
        }
        Self::from_axes(inv)
    }

    /// Applies the mutation to `input`.
    ///
    /// `extent` is the size of the area being iterated; permutations do not
    /// depend on it.
    pub fn mutate(&self, input: IVec3, _extent: IVec3) -> IVec3 {
        let members = input.to_array();
        IVec3::new(
            members[self.axes[0] as usize],
            members[self.axes[1] as usize],
            members[self.axes[2] as usize],
        )
    }

    /// Storage axis that varies slowest when iterating in key order.
    pub fn primary_axis(&self) -> Axis {
        Axis::ALL[self.axes[0] as usize]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

impl Default for PositionMutator {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for PositionMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [char; 3] = ['x', 'y', 'z'];
        write!(
            f,
            "PositionMutator({}{}{})",
            NAMES[self.axes[0] as usize],
            NAMES[self.axes[1] as usize],
            NAMES[self.axes[2] as usize]
        )
    }
}
