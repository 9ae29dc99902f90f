/// Cache directory: an arena of entries, a chained hash table over their
/// offsets, and the clock hand used to pick eviction victims.
///
/// Every entry is on exactly one hash chain at all times. Unused entries
/// carry unique placeholder offsets beyond any real block, so the table is
/// fully populated from the start and no free list is needed.
use std::collections::TryReserveError;

use super::layout::{
    bucket_of, CacheEntry, BLOCK_LEN, BUCKET_EMPTY, HASH_SIZE, PLACEHOLDER_BASE, SLOT_NONE,
};

pub struct CacheDirectory {
    entries: Vec<CacheEntry>,
    hash_table: Box<[i32]>,
    clock_hand: usize,
}

impl CacheDirectory {
    /// Build a directory of `count` entries, or report that the memory is not there.
    pub fn with_capacity(count: usize) -> Result<Self, TryReserveError> {
        let count = count.max(1);
        let mut entries = Vec::new();
        entries.try_reserve_exact(count)?;

        let mut dir = CacheDirectory {
            entries,
            hash_table: vec![BUCKET_EMPTY; HASH_SIZE].into_boxed_slice(),
            // First sweep starts at entry 0
            clock_hand: count - 1,
        };
        for i in 0..count {
            let offset = PLACEHOLDER_BASE + (i as u64 + 1) * BLOCK_LEN as u64;
            dir.entries.push(CacheEntry::placeholder(offset));
            dir.link(i);
        }
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn entry(&self, index: usize) -> &CacheEntry {
        &self.entries[index]
    }

    #[inline(always)]
    pub fn entry_mut(&mut self, index: usize) -> &mut CacheEntry {
        &mut self.entries[index]
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    /// Look up the entry holding block `offset`. Leaves LRU state alone.
    #[inline]
    pub fn find(&self, offset: u64) -> Option<usize> {
        let mut link = self.hash_table[bucket_of(offset)];
        while link != SLOT_NONE {
            let entry = &self.entries[link as usize];
            if entry.offset == offset {
                return Some(link as usize);
            }
            link = entry.hash_link;
        }
        None
    }

    /// Like [`find`](Self::find), but only reports dirty entries.
    #[inline]
    pub fn find_dirty(&self, offset: u64) -> Option<usize> {
        self.find(offset).filter(|&i| self.entries[i].dirty)
    }

    /// Advance the clock to the first entry not recently used, clearing the
    /// flag on every entry passed over. Finishes within two sweeps.
    pub fn select_victim(&mut self) -> usize {
        let len = self.entries.len();
        loop {
            self.clock_hand += 1;
            if self.clock_hand >= len {
                self.clock_hand = 0;
            }
            let entry = &mut self.entries[self.clock_hand];
            if !entry.recently_used {
                return self.clock_hand;
            }
            entry.recently_used = false;
        }
    }

    /// Push entry `index` onto the head of the chain for its current offset.
    pub fn link(&mut self, index: usize) {
        let head = &mut self.hash_table[bucket_of(self.entries[index].offset)];
        self.entries[index].hash_link = *head;
        *head = index as i32;
    }

    /// Remove entry `index` from the chain for its current offset.
    pub fn unlink(&mut self, index: usize) {
        let bucket = bucket_of(self.entries[index].offset);
        let next = self.entries[index].hash_link;
        let target = index as i32;

        if self.hash_table[bucket] == target {
            self.hash_table[bucket] = next;
        } else {
            let mut link = self.hash_table[bucket];
            while link != SLOT_NONE {
                let entry = &mut self.entries[link as usize];
                if entry.hash_link == target {
                    entry.hash_link = next;
                    break;
                }
                link = entry.hash_link;
            }
            debug_assert!(link != SLOT_NONE, "entry {index} missing from its hash chain");
        }
        self.entries[index].hash_link = SLOT_NONE;
    }

    /// Move entry `index` to a new block offset, keeping the hash table in step.
    pub fn rekey(&mut self, index: usize, offset: u64) {
        self.unlink(index);
        self.entries[index].offset = offset;
        self.link(index);
    }

    pub fn dirty_count(&self) -> usize {
        self.entries().filter(|e| e.dirty).count()
    }
}
