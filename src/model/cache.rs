//! LRU cache for built artifacts
//!
//! Keyed by canonical content so cells with identical content and
//! surroundings share one artifact. When the cache is full, the least
//! recently used artifact is evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::Mutex;

use super::neighborhood::NeighborhoodSignature;
use super::render_type::ChiselRenderType;
use crate::voxel::{AreaSignature, ContentDescriptor};

/// Everything an emitted artifact depends on.
///
/// The signatures hash by their 64-bit fingerprints but compare by full
/// content, so colliding fingerprints share a bucket, never an artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    /// Canonical content of the area being built.
    pub area: Arc<AreaSignature>,
    pub primary: ContentDescriptor,
    pub render_type: ChiselRenderType,
    /// Canonical content of the neighborhood.
    pub neighborhood: Arc<NeighborhoodSignature>,
}

struct LruState<V> {
    /// Map of keys to cached artifacts
    entries: HashMap<ModelKey, V>,
    /// Access order: oldest first, newest last
    access_order: Vec<ModelKey>,
}

impl<V> LruState<V> {
    /// Update access order by moving a key to the end (most recent)
    fn touch(&mut self, key: &ModelKey) {
        self.forget(key);
        self.access_order.push(key.clone());
    }

    /// Remove a key from the access order
    fn forget(&mut self, key: &ModelKey) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
    }
}

/// Thread-safe LRU cache of artifacts with hit / miss counters.
///
/// Access order is tracked to determine which artifact to evict when the
/// cache is full.
pub struct ModelCache<V> {
    state: Mutex<LruState<V>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ModelCache<V> {
    /// Create a new artifact cache with the given capacity
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of artifacts to keep; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: HashMap::with_capacity(capacity),
                access_order: Vec::with_capacity(capacity),
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached artifact
    ///
    /// Updates the access order to mark this artifact as recently used and
    /// counts a hit or a miss.
    ///
    /// # Arguments
    /// * `key` - Content the artifact was built from
    ///
    /// # Returns
    /// A clone of the artifact if it is cached
    pub fn get(&self, key: &ModelKey) -> Option<V> {
        let mut state = self.state.lock();
        match state.entries.get(key).cloned() {
            Some(value) => {
                state.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert an artifact into the cache
    ///
    /// If the cache is at capacity, the least recently used artifact is
    /// evicted first.
    ///
    /// # Arguments
    /// * `key` - Content the artifact was built from
    /// * `value` - The artifact
    ///
    /// # Returns
    /// The evicted artifact, or the replaced one if `key` was already cached
    pub fn insert(&self, key: ModelKey, value: V) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let mut state = self.state.lock();

        let exists = state.entries.contains_key(&key);
        let evicted = if !exists && state.entries.len() >= self.capacity {
            let oldest = state.access_order.first().cloned();
            oldest.and_then(|oldest| {
                state.forget(&oldest);
                debug!("Evicting cached model for {}", oldest.render_type);
                state.entries.remove(&oldest)
            })
        } else {
            None
        };

        state.touch(&key);
        let replaced = state.entries.insert(key, value);
        evicted.or(replaced)
    }

    /// Remove an artifact from the cache
    ///
    /// # Returns
    /// The removed artifact if it was cached
    pub fn remove(&self, key: &ModelKey) -> Option<V> {
        let mut state = self.state.lock();
        state.forget(key);
        state.entries.remove(key)
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Drop every cached artifact. Hit / miss counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::neighborhood::Neighborhood;
    use crate::model::render_type::RenderLayer;
    use crate::voxel::{AreaAccessor, GridGeometry, StateId, VoxelGrid};

    fn area(id: u32) -> Arc<AreaSignature> {
        let grid = VoxelGrid::filled(GridGeometry::new(2).unwrap(), &ContentDescriptor::new(StateId(id)));
        Arc::new(grid.signature())
    }

    fn key(id: u32) -> ModelKey {
        ModelKey {
            area: area(id),
            primary: ContentDescriptor::new(StateId(1)),
            render_type: ChiselRenderType::solid(RenderLayer::Solid),
            neighborhood: Arc::new(Neighborhood::empty().signature()),
        }
    }

    #[test]
    fn test_cache_new() {
        let cache: ModelCache<u32> = ModelCache::new(10);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = ModelCache::new(10);
        cache.insert(key(1), "a");
        assert!(cache.contains(&key(1)));
        assert_eq!(cache.get(&key(1)), Some("a"));
        assert_eq!(cache.get(&key(2)), None);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_cache_insert_replace() {
        let cache = ModelCache::new(10);
        assert_eq!(cache.insert(key(1), 1), None);
        assert_eq!(cache.insert(key(1), 2), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1)), Some(2));
    }

    #[test]
    fn test_cache_eviction() {
        let cache = ModelCache::new(2);
        cache.insert(key(1), 1);
        cache.insert(key(2), 2);
        // Touch 1 so 2 becomes the oldest.
        cache.get(&key(1));
        assert_eq!(cache.insert(key(3), 3), Some(2));
        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn test_key_distinguishes_render_type() {
        let cache = ModelCache::new(4);
        let fluid = ModelKey {
            render_type: ChiselRenderType::fluid(RenderLayer::Solid),
            ..key(1)
        };
        cache.insert(key(1), "solid");
        cache.insert(fluid.clone(), "fluid");
        assert_eq!(cache.get(&key(1)), Some("solid"));
        assert_eq!(cache.get(&fluid), Some("fluid"));
    }

    #[test]
    fn test_colliding_fingerprints_stay_apart() {
        let cache = ModelCache::new(4);
        let original = key(1);
        let forged = ModelKey {
            area: Arc::new((*area(2)).clone().with_fingerprint(original.area.fingerprint())),
            ..key(1)
        };
        cache.insert(original.clone(), "one");
        assert_eq!(cache.get(&forged), None);
        cache.insert(forged.clone(), "two");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&original), Some("one"));
        assert_eq!(cache.get(&forged), Some("two"));
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = ModelCache::new(0);
        assert_eq!(cache.insert(key(1), 1), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ModelCache::new(4);
        cache.insert(key(1), 1);
        cache.insert(key(2), 2);
        assert_eq!(cache.remove(&key(1)), Some(1));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
