//! Deduplicating descriptor <-> index table.
//!
//! Index `i` always names the entry at position `i`. Indices stay stable
//! until the next [`Palette::sanitize`], which returns the remap every
//! index holder must apply.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use serde_json::Value;

use super::codec::{read_len, write_var_u64};
use super::descriptor::ContentDescriptor;
use crate::core::{Error, Result};

/// Upper bound on entries accepted from a persisted palette.
pub const MAX_PERSISTED_ENTRIES: usize = 1 << 20;

/// Called with the new entry count whenever the palette grows or shrinks.
pub type ResizeListener = Arc<dyn Fn(usize) + Send + Sync>;

/// One palette slot with its encodings cached.
struct PaletteEntry {
    descriptor: ContentDescriptor,
    compact: Box<[u8]>,
    tree: Value,
}

impl PaletteEntry {
    fn new(descriptor: ContentDescriptor) -> Self {
        let compact = descriptor.to_compact().into_boxed_slice();
        let tree = descriptor.to_tree();
        Self {
            descriptor,
            compact,
            tree,
        }
    }
}

struct PaletteState {
    entries: Vec<Arc<PaletteEntry>>,
    lookup: HashMap<ContentDescriptor, usize>,
}

impl PaletteState {
    fn seeded() -> Self {
        let mut state = Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
        };
        state.push(ContentDescriptor::empty());
        state
    }

    /// Build from a decoded entry list. A descriptor listed more than once
    /// keeps its first slot; the returned map sends every other slot whose
    /// index changed to its new index.
    fn from_entries(entries: Vec<Arc<PaletteEntry>>) -> (Self, HashMap<usize, usize>) {
        if entries.is_empty() {
            return (Self::seeded(), HashMap::new());
        }
        let mut state = Self {
            entries: Vec::with_capacity(entries.len()),
            lookup: HashMap::with_capacity(entries.len()),
        };
        let mut folded = HashMap::new();
        for (old_index, entry) in entries.into_iter().enumerate() {
            let existing = state.lookup.get(&entry.descriptor).copied();
            let new_index = match existing {
                Some(first) => first,
                None => {
                    let index = state.entries.len();
                    state.lookup.insert(entry.descriptor.clone(), index);
                    state.entries.push(entry);
                    index
                }
            };
            if new_index != old_index {
                folded.insert(old_index, new_index);
            }
        }
        (state, folded)
    }

    fn push(&mut self, descriptor: ContentDescriptor) -> usize {
        let index = self.entries.len();
        self.lookup.insert(descriptor.clone(), index);
        self.entries.push(Arc::new(PaletteEntry::new(descriptor)));
        index
    }
}

/// Palette mapping content descriptors to small indices.
///
/// Reads take a shared lock; inserts, sanitize and loads take the write lock,
/// so a reader observes either the state before or after a write. The resize
/// listener runs after the lock is released.
pub struct Palette {
    state: RwLock<PaletteState>,
    on_resize: Option<ResizeListener>,
}

impl Palette {
    /// New palette holding only the empty descriptor at index 0.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PaletteState::seeded()),
            on_resize: None,
        }
    }

    pub fn with_resize_listener(listener: ResizeListener) -> Self {
        Self {
            state: RwLock::new(PaletteState::seeded()),
            on_resize: Some(listener),
        }
    }

    pub fn set_resize_listener(&mut self, listener: Option<ResizeListener>) {
        self.on_resize = listener;
    }

    fn notify_resize(&self, len: usize) {
        if let Some(listener) = &self.on_resize {
            listener(len);
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Always false; a palette is never without its empty entry.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Index of `descriptor`, appending a new entry if it is not present.
    pub fn get_or_create_index(&self, descriptor: &ContentDescriptor) -> usize {
        if let Some(&index) = self.state.read().lookup.get(descriptor) {
            return index;
        }

        let (index, len) = {
            let mut state = self.state.write();
            // Another writer may have inserted between the two locks.
            if let Some(&index) = state.lookup.get(descriptor) {
                return index;
            }
            let index = state.push(descriptor.clone());
            (index, state.entries.len())
        };
        self.notify_resize(len);
        index
    }

    /// Current index of `descriptor`, without inserting.
    pub fn index_of(&self, descriptor: &ContentDescriptor) -> Option<usize> {
        self.state.read().lookup.get(descriptor).copied()
    }

    /// Descriptor at `index`; the empty descriptor for anything out of range,
    /// negative indices included.
    pub fn lookup<I: TryInto<usize>>(&self, index: I) -> ContentDescriptor {
        let Ok(index) = index.try_into() else {
            return ContentDescriptor::empty();
        };
        self.state
            .read()
            .entries
            .get(index)
            .map(|entry| entry.descriptor.clone())
            .unwrap_or_default()
    }

    /// Cached compact bytes of the entry at `index`.
    pub fn compact_bytes(&self, index: usize) -> Option<Box<[u8]>> {
        self.state.read().entries.get(index).map(|e| e.compact.clone())
    }

    /// All descriptors in index order.
    pub fn descriptors(&self) -> Vec<ContentDescriptor> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Remove every entry whose descriptor is in `removable` and return the
    /// old -> new index pairs that changed. Survivors keep their relative
    /// order. The empty descriptor is never removed.
    pub fn sanitize(&self, removable: &HashSet<ContentDescriptor>) -> HashMap<usize, usize> {
        let (remap, removed, len) = {
            let mut state = self.state.write();
            let before: Vec<Arc<PaletteEntry>> = std::mem::take(&mut state.entries);
            let before_len = before.len();

            let mut remap = HashMap::new();
            let mut survivors = Vec::with_capacity(before_len);
            for (old_index, entry) in before.into_iter().enumerate() {
                if !entry.descriptor.is_empty() && removable.contains(&entry.descriptor) {
                    continue;
                }
                let new_index = survivors.len();
                if new_index != old_index {
                    remap.insert(old_index, new_index);
                }
                survivors.push(entry);
            }

            // Survivors are already distinct.
            *state = PaletteState::from_entries(survivors).0;
            let len = state.entries.len();
            (remap, before_len.saturating_sub(len), len)
        };

        debug!(
            "Palette sanitized: removed {} entries, remapped {}, {} remain",
            removed,
            remap.len(),
            len
        );
        self.notify_resize(len);
        remap
    }

    /// Reset to a single empty entry.
    pub fn clear(&self) {
        *self.state.write() = PaletteState::seeded();
        self.notify_resize(1);
    }

    /// Replace the contents with already-decoded entries, keeping the
    /// seeded-on-empty invariant. Repeated descriptors are folded onto their
    /// first slot and the fold remap is returned.
    fn replace(&self, entries: Vec<Arc<PaletteEntry>>) -> HashMap<usize, usize> {
        let loaded = entries.len();
        let (before, after, folded) = {
            let mut state = self.state.write();
            let before = state.entries.len();
            let (rebuilt, folded) = PaletteState::from_entries(entries);
            *state = rebuilt;
            (before, state.entries.len(), folded)
        };
        if loaded > after {
            warn!(
                "Folded {} repeated palette entries ({} listed, {} distinct)",
                loaded - after,
                loaded,
                after
            );
        }
        if before != after {
            self.notify_resize(after);
        }
        folded
    }

    /// Tree form: an array of descriptor trees in index order.
    pub fn to_tree(&self) -> Value {
        Value::Array(
            self.state
                .read()
                .entries
                .iter()
                .map(|entry| entry.tree.clone())
                .collect(),
        )
    }

    /// Replace the contents from a tree. On error the palette is unchanged.
    ///
    /// # Returns
    /// Old -> new index pairs for slots that moved because the list repeated
    /// a descriptor. Empty for a well-formed list; index holders must apply
    /// it otherwise.
    pub fn load_tree(&self, value: &Value) -> Result<HashMap<usize, usize>> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::corrupt("palette tree is not an array"))?;
        if items.len() > MAX_PERSISTED_ENTRIES {
            return Err(Error::corrupt(format!("palette has {} entries", items.len())));
        }
        let entries = items
            .iter()
            .map(|item| ContentDescriptor::from_tree(item).map(|d| Arc::new(PaletteEntry::new(d))))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.replace(entries))
    }

    /// Like [`load_tree`](Self::load_tree) but resets to the cleared state on
    /// corrupt input.
    pub fn load_tree_or_reset(&self, value: &Value) {
        if let Err(err) = self.load_tree(value) {
            warn!("Resetting corrupt palette: {}", err);
            self.clear();
        }
    }

    /// Compact form: varint entry count, then each entry's compact bytes.
    pub fn write_compact(&self, writer: &mut impl Write) -> io::Result<()> {
        let state = self.state.read();
        write_var_u64(writer, state.entries.len() as u64)?;
        for entry in &state.entries {
            writer.write_all(&entry.compact)?;
        }
        Ok(())
    }

    pub fn to_compact(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = self.write_compact(&mut buf);
        buf
    }

    /// Replace the contents from a compact stream. On error the palette is
    /// unchanged. Returns the fold remap, as [`load_tree`](Self::load_tree).
    pub fn read_compact(&self, reader: &mut impl Read) -> Result<HashMap<usize, usize>> {
        let entries = Self::decode_compact(reader)
            .map_err(|e| Error::corrupt(format!("palette: {}", e)))?;
        Ok(self.replace(entries))
    }

    pub fn read_compact_or_reset(&self, reader: &mut impl Read) {
        if let Err(err) = self.read_compact(reader) {
            warn!("Resetting corrupt palette: {}", err);
            self.clear();
        }
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self> {
        let palette = Self::new();
        palette.read_compact(&mut Cursor::new(bytes))?;
        Ok(palette)
    }

    fn decode_compact(reader: &mut impl Read) -> io::Result<Vec<Arc<PaletteEntry>>> {
        let count = read_len(reader, MAX_PERSISTED_ENTRIES)?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let descriptor = ContentDescriptor::read_compact(reader)?;
            entries.push(Arc::new(PaletteEntry::new(descriptor)));
        }
        Ok(entries)
    }

    /// Copy of the entries without the resize listener.
    pub fn snapshot(&self) -> Palette {
        let entries = self.state.read().entries.clone();
        Palette {
            state: RwLock::new(PaletteState::from_entries(entries).0),
            on_resize: None,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones share entry storage; the resize listener is not carried over.
impl Clone for Palette {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl PartialEq for Palette {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let a = self.state.read();
        let b = other.state.read();
        a.entries.len() == b.entries.len()
            && a
                .entries
                .iter()
                .zip(b.entries.iter())
                .all(|(x, y)| x.descriptor == y.descriptor)
    }
}

impl Eq for Palette {}

impl Hash for Palette {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let entries = &self.state.read().entries;
        entries.len().hash(state);
        for entry in entries {
            entry.descriptor.hash(state);
        }
    }
}

impl fmt::Debug for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors()).finish()
    }
}

/// Read-only handle to a palette owned by an index holder.
///
/// The owner applies every remap, so only lookups and encodings are exposed.
#[derive(Clone, Copy)]
pub struct PaletteView<'a> {
    palette: &'a Palette,
}

impl<'a> PaletteView<'a> {
    pub(crate) fn new(palette: &'a Palette) -> Self {
        Self { palette }
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn index_of(&self, descriptor: &ContentDescriptor) -> Option<usize> {
        self.palette.index_of(descriptor)
    }

    pub fn lookup<I: TryInto<usize>>(&self, index: I) -> ContentDescriptor {
        self.palette.lookup(index)
    }

    pub fn compact_bytes(&self, index: usize) -> Option<Box<[u8]>> {
        self.palette.compact_bytes(index)
    }

    pub fn descriptors(&self) -> Vec<ContentDescriptor> {
        self.palette.descriptors()
    }

    pub fn to_tree(&self) -> Value {
        self.palette.to_tree()
    }

    pub fn write_compact(&self, writer: &mut impl Write) -> io::Result<()> {
        self.palette.write_compact(writer)
    }

    pub fn to_compact(&self) -> Vec<u8> {
        self.palette.to_compact()
    }

    /// Detached copy the caller may mutate freely.
    pub fn to_owned_palette(&self) -> Palette {
        self.palette.snapshot()
    }
}

impl PartialEq for PaletteView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.palette == other.palette
    }
}

impl Eq for PaletteView<'_> {}

impl fmt::Debug for PaletteView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.palette, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::descriptor::{StateId, StateVariant};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state(id: u32) -> ContentDescriptor {
        ContentDescriptor::new(StateId(id))
    }

    /// Palette with entries [empty, 1, 2, 3].
    fn abcd() -> Palette {
        let palette = Palette::new();
        for id in 1..=3 {
            palette.get_or_create_index(&state(id));
        }
        palette
    }

    #[test]
    fn test_new_palette_is_seeded() {
        let palette = Palette::new();
        assert_eq!(palette.len(), 1);
        assert!(!palette.is_empty());
        assert!(palette.lookup(0usize).is_empty());
    }

    #[test]
    fn test_lookup_of_created_index() {
        let palette = Palette::new();
        let water = ContentDescriptor::with_variant(StateId(9), StateVariant::new().with("level", 3i64));
        for descriptor in [state(1), state(2), water.clone(), ContentDescriptor::empty()] {
            let index = palette.get_or_create_index(&descriptor);
            assert_eq!(palette.lookup(index), descriptor);
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let palette = Palette::new();
        let first = palette.get_or_create_index(&state(7));
        let len = palette.len();
        let second = palette.get_or_create_index(&state(7));
        assert_eq!(first, second);
        assert_eq!(first, 1);
        assert_eq!(palette.len(), len);
    }

    #[test]
    fn test_lookup_out_of_range_is_empty() {
        let palette = abcd();
        assert!(palette.lookup(4usize).is_empty());
        assert!(palette.lookup(-1i32).is_empty());
        assert!(palette.lookup(i64::MIN).is_empty());
        assert!(palette.lookup(usize::MAX).is_empty());
    }

    #[test]
    fn test_sanitize_remaps_survivors() {
        let palette = abcd();
        let remap = palette.sanitize(&HashSet::from([state(1)]));

        assert_eq!(remap, HashMap::from([(2, 1), (3, 2)]));
        assert!(!remap.contains_key(&0));
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.lookup(1usize), state(2));
        assert_eq!(palette.lookup(2usize), state(3));
        assert_eq!(palette.index_of(&state(1)), None);
    }

    #[test]
    fn test_sanitize_keeps_empty_descriptor() {
        let palette = abcd();
        let remap = palette.sanitize(&HashSet::from([ContentDescriptor::empty(), state(3)]));
        assert!(remap.is_empty());
        assert_eq!(palette.len(), 3);
        assert!(palette.lookup(0usize).is_empty());
    }

    #[test]
    fn test_sanitize_with_unknown_descriptor_is_noop() {
        let palette = abcd();
        let remap = palette.sanitize(&HashSet::from([state(42)]));
        assert!(remap.is_empty());
        assert_eq!(palette, abcd());
    }

    #[test]
    fn test_resize_listener() {
        let seen = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let palette = {
            let seen = seen.clone();
            let calls = calls.clone();
            Palette::with_resize_listener(Arc::new(move |len: usize| {
                seen.store(len, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        };

        palette.get_or_create_index(&state(1));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        palette.get_or_create_index(&state(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        palette.sanitize(&HashSet::from([state(1)]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_read_palette() {
        let palette = Arc::new(std::sync::Mutex::new(None::<Arc<Palette>>));
        let slot = palette.clone();
        let mut inner = Palette::new();
        inner.set_resize_listener(Some(Arc::new(move |len: usize| {
            if let Some(p) = slot.lock().unwrap().as_ref() {
                // Would deadlock if called under the write lock.
                assert_eq!(p.len(), len);
            }
        })));
        let inner = Arc::new(inner);
        *palette.lock().unwrap() = Some(inner.clone());
        inner.get_or_create_index(&state(5));
        *palette.lock().unwrap() = None;
    }

    #[test]
    fn test_clear() {
        let palette = abcd();
        palette.clear();
        assert_eq!(palette, Palette::new());
    }

    #[test]
    fn test_tree_round_trip() {
        let palette = abcd();
        palette.get_or_create_index(&ContentDescriptor::with_variant(
            StateId(9),
            StateVariant::new().with("level", 8i64),
        ));
        let tree = palette.to_tree();
        let loaded = Palette::new();
        loaded.load_tree(&tree).unwrap();
        assert_eq!(loaded, palette);

        let fresh = Palette::new();
        let reloaded = Palette::new();
        reloaded.load_tree(&fresh.to_tree()).unwrap();
        assert_eq!(reloaded, fresh);
    }

    #[test]
    fn test_compact_round_trip() {
        let palette = abcd();
        let loaded = Palette::from_compact(&palette.to_compact()).unwrap();
        assert_eq!(loaded, palette);
        for index in 0..palette.len() {
            assert_eq!(loaded.lookup(index), palette.lookup(index));
            assert_eq!(loaded.compact_bytes(index), palette.compact_bytes(index));
        }

        let fresh = Palette::new();
        assert_eq!(Palette::from_compact(&fresh.to_compact()).unwrap(), fresh);
    }

    #[test]
    fn test_empty_tree_reseeds() {
        let palette = abcd();
        palette.load_tree(&json!([])).unwrap();
        assert_eq!(palette, Palette::new());
    }

    #[test]
    fn test_repeated_entries_fold_onto_first_slot() {
        let palette = Palette::new();
        let folded = palette
            .load_tree(&json!([{"state": 0}, {"state": 1}, {"state": 1, "variant": {}}, {"state": 2}]))
            .unwrap();
        assert_eq!(folded, HashMap::from([(2, 1), (3, 2)]));
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.index_of(&state(1)), Some(1));
        assert_eq!(palette.lookup(2usize), state(2));

        let mut bytes = Vec::new();
        write_var_u64(&mut bytes, 3).unwrap();
        for descriptor in [state(5), state(5), ContentDescriptor::empty()] {
            bytes.extend(descriptor.to_compact());
        }
        let folded = palette.read_compact(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(folded, HashMap::from([(1, 0), (2, 1)]));
        assert_eq!(palette.descriptors(), vec![state(5), ContentDescriptor::empty()]);
    }

    #[test]
    fn test_view_is_read_only_mirror() {
        let palette = abcd();
        let view = PaletteView::new(&palette);
        assert_eq!(view.len(), 4);
        assert_eq!(view.index_of(&state(2)), Some(2));
        assert_eq!(view.lookup(3usize), state(3));
        assert_eq!(view.to_compact(), palette.to_compact());

        let copy = view.to_owned_palette();
        copy.sanitize(&HashSet::from([state(1)]));
        assert_eq!(palette.len(), 4);
    }

    #[test]
    fn test_corrupt_load_leaves_state_untouched() {
        let palette = abcd();
        assert!(palette.load_tree(&json!([{"state": 1}, "bogus"])).is_err());
        assert_eq!(palette, abcd());

        // count 2, first entry ok, second truncated
        assert!(palette.read_compact(&mut Cursor::new(vec![2, 1, 0, 5])).is_err());
        assert_eq!(palette, abcd());
    }

    #[test]
    fn test_corrupt_load_or_reset() {
        let palette = abcd();
        palette.load_tree_or_reset(&json!({"not": "a list"}));
        assert_eq!(palette, Palette::new());

        let palette = abcd();
        palette.read_compact_or_reset(&mut Cursor::new(vec![0xFF]));
        assert_eq!(palette, Palette::new());
    }

    #[test]
    fn test_equality_is_index_for_index() {
        let a = Palette::new();
        a.get_or_create_index(&state(1));
        a.get_or_create_index(&state(2));
        let b = Palette::new();
        b.get_or_create_index(&state(2));
        b.get_or_create_index(&state(1));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_concurrent_inserts_agree() {
        let palette = Arc::new(Palette::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let palette = palette.clone();
                std::thread::spawn(move || {
                    (1..=64).map(|id| palette.get_or_create_index(&state(id))).collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(palette.len(), 65);
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
        for (i, index) in results[0].iter().enumerate() {
            assert_eq!(palette.lookup(*index), state(i as u32 + 1));
        }
    }
}
