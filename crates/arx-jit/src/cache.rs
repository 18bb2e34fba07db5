//! Translation cache: direct-mapped guest-PC → host-entry table.
//!
//! The table is a power-of-two array indexed by an XOR-folded hash of the
//! guest PC. Collisions overwrite; an entry is live iff its `guest_addr`
//! matches the probed PC. `hash` and `refcount` are reserved fields: they
//! are written on insert and never consulted.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u32 {
        const VALID = 1 << 0;
        const LINKED = 1 << 1;
        const HOT = 1 << 2;
        const DIRTY = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransCacheEntry {
    pub guest_addr: u64,
    pub host_addr: u64,
    pub hash: u64,
    pub size: u32,
    pub refcount: u32,
    pub flags: EntryFlags,
}

pub struct TransCache {
    entries: Vec<TransCacheEntry>,
    mask: u64,
}

impl TransCache {
    /// Table with `1 << bits` slots.
    #[must_use]
    pub fn new(bits: u32) -> Self {
        let len = 1usize << bits;
        Self {
            entries: vec![TransCacheEntry::default(); len],
            mask: (len as u64) - 1,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    fn fold(&self, pc: u64) -> u64 {
        (pc ^ (pc >> 32)) & self.mask
    }

    /// Host entry for `pc`, or None on miss/collision.
    #[must_use]
    pub fn lookup(&self, pc: u64) -> Option<&TransCacheEntry> {
        let entry = &self.entries[self.fold(pc) as usize];
        if entry.flags.contains(EntryFlags::VALID) && entry.guest_addr == pc {
            Some(entry)
        } else {
            None
        }
    }

    /// Insert unconditionally, replacing any collider in the slot.
    pub fn insert(&mut self, pc: u64, host_addr: u64, size: u32) {
        let hash = self.fold(pc);
        self.entries[hash as usize] = TransCacheEntry {
            guest_addr: pc,
            host_addr,
            hash,
            size,
            refcount: 0,
            flags: EntryFlags::VALID,
        };
    }

    /// Mark the entry for `pc` as chained into (LINKED).
    pub fn mark_linked(&mut self, pc: u64) {
        let slot = self.fold(pc) as usize;
        let entry = &mut self.entries[slot];
        if entry.flags.contains(EntryFlags::VALID) && entry.guest_addr == pc {
            entry.flags |= EntryFlags::LINKED;
        }
    }

    /// Clear the slot holding `pc`, if it is live.
    pub fn invalidate(&mut self, pc: u64) {
        let slot = self.fold(pc) as usize;
        let entry = &mut self.entries[slot];
        if entry.flags.contains(EntryFlags::VALID) && entry.guest_addr == pc {
            *entry = TransCacheEntry::default();
        }
    }

    /// Zero the whole table.
    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            *entry = TransCacheEntry::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let mut cache = TransCache::new(4);
        cache.insert(0x1000, 0xAAAA, 32);
        let entry = cache.lookup(0x1000).unwrap();
        assert_eq!(entry.host_addr, 0xAAAA);
        assert_eq!(entry.size, 32);
        assert!(entry.flags.contains(EntryFlags::VALID));
        assert!(cache.lookup(0x1004).is_none());
    }

    #[test]
    fn collision_overwrites() {
        let mut cache = TransCache::new(4);
        let a = 0x1000u64;
        // Same low bits after folding: differ by table_size * 8 bytes.
        let b = a + ((cache.len() as u64) << 3);
        cache.insert(a, 0xAAAA, 16);
        cache.insert(b, 0xBBBB, 16);
        assert!(cache.lookup(a).is_none(), "collider must evict");
        assert_eq!(cache.lookup(b).unwrap().host_addr, 0xBBBB);
    }

    #[test]
    fn invalidate_only_matching() {
        let mut cache = TransCache::new(4);
        cache.insert(0x2000, 0xCCCC, 8);
        // Invalidate of a colliding-but-different pc leaves the entry.
        cache.invalidate(0x2000 + ((cache.len() as u64) << 3));
        assert!(cache.lookup(0x2000).is_some());
        cache.invalidate(0x2000);
        assert!(cache.lookup(0x2000).is_none());
    }

    #[test]
    fn flush_clears_all() {
        let mut cache = TransCache::new(4);
        for i in 0..16u64 {
            cache.insert(0x1000 + i * 4, i, 4);
        }
        cache.flush();
        for i in 0..16u64 {
            assert!(cache.lookup(0x1000 + i * 4).is_none());
        }
    }

    #[test]
    fn high_bits_fold_into_index() {
        let mut cache = TransCache::new(4);
        // pc whose low bits are zero but high bits select a slot.
        let pc = 0x0000_0007_0000_0000u64;
        cache.insert(pc, 0x1234, 4);
        assert_eq!(cache.lookup(pc).unwrap().host_addr, 0x1234);
    }
}
