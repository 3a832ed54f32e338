//! Read and write views over a cubic voxel area.

use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};

use glam::IVec3;

use super::descriptor::ContentDescriptor;
use super::geometry::GridGeometry;
use super::storage::{PackedIndices, bits_required};
use crate::core::Result;
use crate::math::PositionMutator;

/// Read-only view of a voxel area.
pub trait AreaAccessor {
    fn geometry(&self) -> GridGeometry;

    /// Content at `pos`; the empty descriptor outside the area.
    fn get(&self, pos: IVec3) -> ContentDescriptor;

    /// Visit every voxel in the axis priority given by `order`.
    fn iterate(&self, order: PositionMutator) -> AreaIter<'_, Self>
    where
        Self: Sized,
    {
        AreaIter::new(self, order)
    }

    /// Distinct non-empty descriptors present, in first-seen storage order.
    fn contained_states(&self) -> Vec<ContentDescriptor> {
        let mut seen = Vec::new();
        for (_, descriptor) in AreaIter::new(self, PositionMutator::identity()) {
            if !descriptor.is_empty() && !seen.contains(&descriptor) {
                seen.push(descriptor);
            }
        }
        seen
    }

    /// Content hash independent of palette layout. Areas that agree on
    /// every `get` agree on their fingerprint.
    fn fingerprint(&self) -> u64 {
        let mut fingerprint = Fingerprinter::new(self.geometry());
        for (_, descriptor) in AreaIter::new(self, PositionMutator::identity()) {
            fingerprint.push(descriptor);
        }
        fingerprint.finish(|descriptor| descriptor.clone())
    }

    /// Full canonical content. Unlike [`fingerprint`](Self::fingerprint),
    /// two signatures compare equal only when the areas agree on every
    /// `get`.
    fn signature(&self) -> AreaSignature {
        let mut fingerprint = Fingerprinter::recording(self.geometry());
        for (_, descriptor) in AreaIter::new(self, PositionMutator::identity()) {
            fingerprint.push(descriptor);
        }
        fingerprint.finish_signature(|descriptor| descriptor.clone())
    }

    /// Copy every voxel into `dest`, writing voxel `p` to `order.mutate(p)`.
    fn copy_into(&self, dest: &mut dyn AreaMutator, order: PositionMutator) -> Result<()> {
        let extent = self.geometry().extent();
        for (pos, descriptor) in AreaIter::new(self, order) {
            dest.set(order.mutate(pos, extent), &descriptor)?;
        }
        Ok(())
    }
}

/// Writable voxel area. Writers must hold exclusive access to the area.
pub trait AreaMutator: AreaAccessor {
    fn set(&mut self, pos: IVec3, descriptor: &ContentDescriptor) -> Result<()>;

    fn clear(&mut self, pos: IVec3) -> Result<()> {
        self.set(pos, &ContentDescriptor::empty())
    }
}

/// Lazy iterator over `(position, descriptor)` pairs.
///
/// Walks iteration keys lexicographically (x slowest) and maps each key back
/// to a storage position through the inverse of `order`, so no sort is
/// needed to change axis priority.
pub struct AreaIter<'a, A: ?Sized> {
    area: &'a A,
    inverse: PositionMutator,
    extent: IVec3,
    bounds: IVec3,
    key: IVec3,
    remaining: usize,
}

impl<'a, A: AreaAccessor + ?Sized> AreaIter<'a, A> {
    pub fn new(area: &'a A, order: PositionMutator) -> Self {
        let extent = area.geometry().extent();
        let bounds = order.mutate(extent, extent);
        Self {
            area,
            inverse: order.inverse(),
            extent,
            bounds,
            key: IVec3::ZERO,
            remaining: area.geometry().bits_per_block(),
        }
    }
}

impl<A: AreaAccessor + ?Sized> Iterator for AreaIter<'_, A> {
    type Item = (IVec3, ContentDescriptor);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let pos = self.inverse.mutate(self.key, self.extent);
        self.key.z += 1;
        if self.key.z >= self.bounds.z {
            self.key.z = 0;
            self.key.y += 1;
            if self.key.y >= self.bounds.y {
                self.key.y = 0;
                self.key.x += 1;
            }
        }
        Some((pos, self.area.get(pos)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<A: AreaAccessor + ?Sized> ExactSizeIterator for AreaIter<'_, A> {}

/// View exposing only voxels equal to one descriptor. Everything else
/// reads as empty.
pub struct FilteredAreaAccessor<'a, A: ?Sized> {
    inner: &'a A,
    state: ContentDescriptor,
}

impl<'a, A: AreaAccessor + ?Sized> FilteredAreaAccessor<'a, A> {
    pub fn new(inner: &'a A, state: ContentDescriptor) -> Self {
        Self { inner, state }
    }

    pub fn state(&self) -> &ContentDescriptor {
        &self.state
    }
}

impl<A: AreaAccessor + ?Sized> AreaAccessor for FilteredAreaAccessor<'_, A> {
    fn geometry(&self) -> GridGeometry {
        self.inner.geometry()
    }

    fn get(&self, pos: IVec3) -> ContentDescriptor {
        let descriptor = self.inner.get(pos);
        if descriptor == self.state {
            descriptor
        } else {
            ContentDescriptor::empty()
        }
    }
}

/// Canonical content of an area.
///
/// Descriptors are numbered by first appearance and each voxel keeps its
/// number in storage order. Hashing uses the fingerprint alone; equality
/// compares everything, so a fingerprint collision cannot make two areas
/// equal.
#[derive(Clone, Debug)]
pub struct AreaSignature {
    fingerprint: u64,
    side: u32,
    states: Vec<ContentDescriptor>,
    ids: PackedIndices,
}

impl AreaSignature {
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Distinct descriptors in first-seen storage order, empty included.
    pub fn states(&self) -> &[ContentDescriptor] {
        &self.states
    }

    #[cfg(test)]
    pub(crate) fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = fingerprint;
        self
    }
}

impl PartialEq for AreaSignature {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.side == other.side
            && self.states == other.states
            && self.ids == other.ids
    }
}

impl Eq for AreaSignature {}

impl Hash for AreaSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

/// Canonical content hash. Values are numbered by first appearance so the
/// result does not depend on how a palette happens to be ordered.
pub(crate) struct Fingerprinter<K> {
    hasher: DefaultHasher,
    side: u32,
    ids: HashMap<K, u32>,
    order: Vec<K>,
    /// Per-voxel ids, kept only when a signature will be built.
    stream: Option<Vec<u32>>,
}

impl<K: Clone + Eq + Hash> Fingerprinter<K> {
    pub(crate) fn new(geometry: GridGeometry) -> Self {
        let side = geometry.bits_per_side();
        let mut hasher = DefaultHasher::new();
        side.hash(&mut hasher);
        Self {
            hasher,
            side,
            ids: HashMap::new(),
            order: Vec::new(),
            stream: None,
        }
    }

    pub(crate) fn recording(geometry: GridGeometry) -> Self {
        Self {
            stream: Some(Vec::with_capacity(geometry.bits_per_block())),
            ..Self::new(geometry)
        }
    }

    pub(crate) fn push(&mut self, key: K) {
        let next = self.order.len() as u32;
        let id = match self.ids.entry(key) {
            Entry::Occupied(slot) => *slot.get(),
            Entry::Vacant(slot) => {
                self.order.push(slot.key().clone());
                slot.insert(next);
                next
            }
        };
        self.hasher.write_u32(id);
        if let Some(stream) = &mut self.stream {
            stream.push(id);
        }
    }

    fn resolve_states(&mut self, resolve: impl Fn(&K) -> ContentDescriptor) -> Vec<ContentDescriptor> {
        let states: Vec<ContentDescriptor> = self.order.iter().map(|key| resolve(key)).collect();
        for state in &states {
            state.hash(&mut self.hasher);
        }
        states
    }

    pub(crate) fn finish(mut self, resolve: impl Fn(&K) -> ContentDescriptor) -> u64 {
        self.resolve_states(resolve);
        self.hasher.finish()
    }

    pub(crate) fn finish_signature(mut self, resolve: impl Fn(&K) -> ContentDescriptor) -> AreaSignature {
        let states = self.resolve_states(resolve);
        let stream = self.stream.take().unwrap_or_default();
        let mut ids = PackedIndices::new(stream.len(), bits_required(states.len()));
        for (offset, &id) in stream.iter().enumerate() {
            ids.set(offset, id);
        }
        AreaSignature {
            fingerprint: self.hasher.finish(),
            side: self.side,
            states,
            ids,
        }
    }
}
