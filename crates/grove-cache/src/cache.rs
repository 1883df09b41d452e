//! Fixed-capacity write-through cache over the record store.

use grove_common::{RecordCodec, Result};
use grove_store::RecordFile;

/// One occupied cache slot.
struct Slot<T> {
    /// Record ordinal this slot mirrors.
    position: u32,
    /// Decoded copy of the persisted record.
    node: T,
    /// Logical timestamp of the last hit or insertion.
    last_used: u64,
}

/// Fixed-capacity cache of decoded records, evicting by least recent use.
///
/// The cache owns the backing [`RecordFile`] and is the only path through
/// which its owner reads or writes records. Every [`NodeCache::put`] is
/// written through to the store immediately, so a slot's copy is always a
/// faithful mirror of the persisted record; the cache only ever saves
/// redundant reads. Lookup and eviction scan all slots linearly, which is
/// fine at the small fixed capacities this is used with.
///
/// A capacity of zero is legal and turns every access into store I/O.
pub struct NodeCache<T> {
    store: RecordFile,
    slots: Vec<Option<Slot<T>>>,
    clock: u64,
}

impl<T> NodeCache<T> {
    /// Creates a cache with `capacity` slots over `store`.
    pub fn new(store: RecordFile, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            store,
            slots,
            clock: 0,
        }
    }

    /// Returns the number of cache slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Empties every slot and restarts the logical clock.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.clock = 0;
    }

    /// Resets the cache and truncates the backing store.
    pub fn clear(&mut self) -> Result<()> {
        self.reset();
        self.store.clear()
    }

    /// Returns the backing store.
    pub fn store(&self) -> &RecordFile {
        &self.store
    }
}

impl<T: RecordCodec> NodeCache<T> {
    /// Returns the record at `position`, reading through the store on a miss.
    ///
    /// A miss decodes the record into a free slot if one exists, else into
    /// the slot with the smallest last-use stamp.
    pub fn get(&mut self, position: u32) -> Result<T> {
        // Single pass: find a hit, and failing that remember the victim
        // (first free slot wins over the least recently used one).
        let mut hit = None;
        let mut free = None;
        let mut victim = None;
        let mut victim_used = u64::MAX;

        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(s) if s.position == position => {
                    hit = Some(i);
                    break;
                }
                Some(s) => {
                    if s.last_used < victim_used {
                        victim_used = s.last_used;
                        victim = Some(i);
                    }
                }
                None => {
                    if free.is_none() {
                        free = Some(i);
                    }
                }
            }
        }

        if let Some(i) = hit {
            let stamp = self.tick();
            let slot = self.slots[i].as_mut().expect("hit index is occupied");
            slot.last_used = stamp;
            return Ok(slot.node.clone());
        }

        let bytes = self.store.read(position)?;
        let node = T::decode_record(&bytes);

        if let Some(i) = free.or(victim) {
            let stamp = self.tick();
            self.slots[i] = Some(Slot {
                position,
                node: node.clone(),
                last_used: stamp,
            });
        }

        Ok(node)
    }

    /// Writes `node` through to the store at `position`.
    ///
    /// If the position is cache-resident its slot copy is refreshed; a cold
    /// write does not populate the cache.
    pub fn put(&mut self, position: u32, node: &T) -> Result<()> {
        let mut bytes = vec![0u8; self.store.record_size()];
        node.encode_record(&mut bytes);
        self.store.update(position, &bytes)?;

        if let Some(i) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.position == position))
        {
            let stamp = self.tick();
            self.slots[i] = Some(Slot {
                position,
                node: node.clone(),
                last_used: stamp,
            });
        }

        Ok(())
    }

    /// Appends a new record to the store, bypassing the cache.
    pub fn append(&mut self, node: &T) -> Result<u32> {
        let mut bytes = vec![0u8; self.store.record_size()];
        node.encode_record(&mut bytes);
        self.store.append(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Minimal record type: a u32 payload in a 8-byte record.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Rec(u32);

    impl RecordCodec for Rec {
        fn encode_record(&self, buf: &mut [u8]) {
            buf[0..4].copy_from_slice(&self.0.to_le_bytes());
        }

        fn decode_record(buf: &[u8]) -> Self {
            Rec(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
        }
    }

    fn create_test_cache(capacity: usize) -> (NodeCache<Rec>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RecordFile::open(dir.path().join("cache.dat"), 4, 8, false).unwrap();
        (NodeCache::new(store, capacity), dir)
    }

    #[test]
    fn test_cache_new() {
        let (cache, _dir) = create_test_cache(4);
        assert_eq!(cache.capacity(), 4);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_populates_slot() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(7)).unwrap();
        assert!(cache.is_empty()); // append bypasses the cache

        assert_eq!(cache.get(pos).unwrap(), Rec(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_hit_returns_slot_copy() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(1)).unwrap();
        cache.get(pos).unwrap();

        // Mutate the store behind the cache's back; a hit must return the
        // cached copy without touching storage.
        let mut raw = vec![0u8; 8];
        Rec(99).encode_record(&mut raw);
        cache.store().update(pos, &raw).unwrap();

        assert_eq!(cache.get(pos).unwrap(), Rec(1));
    }

    #[test]
    fn test_put_writes_through() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(1)).unwrap();
        cache.put(pos, &Rec(2)).unwrap();

        // Visible in the store even after the cache forgets everything.
        cache.reset();
        assert_eq!(cache.get(pos).unwrap(), Rec(2));
    }

    #[test]
    fn test_cold_put_does_not_populate() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(1)).unwrap();
        cache.put(pos, &Rec(2)).unwrap();

        assert!(cache.is_empty());
    }

    #[test]
    fn test_warm_put_refreshes_slot() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(1)).unwrap();
        cache.get(pos).unwrap();
        cache.put(pos, &Rec(2)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(pos).unwrap(), Rec(2));
    }

    #[test]
    fn test_eviction_least_recently_used() {
        let (mut cache, _dir) = create_test_cache(2);

        let a = cache.append(&Rec(10)).unwrap();
        let b = cache.append(&Rec(11)).unwrap();
        let c = cache.append(&Rec(12)).unwrap();

        cache.get(a).unwrap();
        cache.get(b).unwrap();
        cache.get(a).unwrap(); // a is now more recent than b

        cache.get(c).unwrap(); // evicts b
        assert_eq!(cache.len(), 2);

        // a must still be resident: overwrite its stored bytes and expect
        // the stale cached value back.
        let mut raw = vec![0u8; 8];
        Rec(99).encode_record(&mut raw);
        cache.store().update(a, &raw).unwrap();
        assert_eq!(cache.get(a).unwrap(), Rec(10));

        // b was evicted, so its read goes to the store.
        cache.store().update(b, &raw).unwrap();
        assert_eq!(cache.get(b).unwrap(), Rec(99));
    }

    #[test]
    fn test_zero_capacity() {
        let (mut cache, _dir) = create_test_cache(0);

        let pos = cache.append(&Rec(5)).unwrap();
        assert_eq!(cache.get(pos).unwrap(), Rec(5));
        assert_eq!(cache.len(), 0);

        cache.put(pos, &Rec(6)).unwrap();
        assert_eq!(cache.get(pos).unwrap(), Rec(6));
    }

    #[test]
    fn test_clear_truncates_store() {
        let (mut cache, _dir) = create_test_cache(4);

        let pos = cache.append(&Rec(1)).unwrap();
        cache.get(pos).unwrap();

        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.store().record_count(), 0);
        assert_eq!(cache.append(&Rec(2)).unwrap(), 0);
    }
}
