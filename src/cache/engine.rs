//! Block resolution and coalesced write-back.
//!
//! `resolve` turns a block-aligned logical offset into a directory index,
//! loading the block on a miss. `write_back` persists a dirty victim together
//! with the dirty run around it so that a sequential flush costs one seek.

use tracing::{debug, trace};

use super::layout::{BLOCK_LEN, WRITE_GAP};
use super::DiskCache;
use crate::codec;
use crate::error::Result;
use crate::store::BackingStore;

const STEP: u64 = BLOCK_LEN as u64;

impl DiskCache {
    /// Return the directory index holding the block at `block_offset`.
    ///
    /// On a store error the directory is left as it was, with the victim
    /// still linked under its old offset.
    pub(crate) fn resolve(&mut self, block_offset: u64) -> Result<usize> {
        if let Some(index) = self.directory.find(block_offset) {
            self.directory.entry_mut(index).recently_used = true;
            self.stats.hits += 1;
            trace!(block_offset, index, "cache hit");
            return Ok(index);
        }

        self.stats.misses += 1;
        let victim = self.directory.select_victim();
        if matches!(self.current, Some((_, index)) if index == victim) {
            self.current = None;
        }
        if self.directory.entry(victim).dirty {
            self.write_back(victim)?;
        }

        let shift = self.geometry.pixel_shift;
        let never_written = self.high_offset.map_or(true, |high| block_offset > high);
        if never_written {
            self.directory.rekey(victim, block_offset);
            self.directory.entry_mut(victim).pixels.fill(0);
            self.high_offset = Some(block_offset);
            self.stats.zero_fills += 1;
            trace!(block_offset, victim, "cache miss, zero fill");
        } else {
            let mut scratch = [0u8; BLOCK_LEN];
            let packed = &mut scratch[..codec::packed_len(shift)];
            let sequential = self.seek_offset.take() == Some(block_offset);
            if !sequential {
                self.cursor.seek(&mut self.store, block_offset >> shift)?;
            }
            self.cursor.read_into(&mut self.store, packed)?;
            self.seek_offset = Some(block_offset + STEP);

            self.directory.rekey(victim, block_offset);
            codec::unpack(shift, packed, &mut self.directory.entry_mut(victim).pixels);
            trace!(block_offset, victim, sequential, "cache miss, block loaded");
        }

        let entry = self.directory.entry_mut(victim);
        entry.dirty = false;
        entry.recently_used = true;
        Ok(victim)
    }

    /// Write the dirty entry `victim` back, along with every dirty block
    /// reachable from it across gaps of fewer than `WRITE_GAP` clean blocks.
    pub(crate) fn write_back(&mut self, victim: usize) -> Result<()> {
        let mut start = self.directory.entry(victim).offset;

        // Walk back to the head of the run, restarting the gap count on each hit
        let mut probe = start;
        let mut gap = 0;
        while gap < WRITE_GAP {
            let Some(prev) = probe.checked_sub(STEP) else {
                break;
            };
            probe = prev;
            gap += 1;
            if self.directory.find_dirty(probe).is_some() {
                start = probe;
                gap = 0;
            }
        }

        let shift = self.geometry.pixel_shift;
        let mut packed = [0u8; BLOCK_LEN];
        let packed = &mut packed[..codec::packed_len(shift)];
        let mut seeks = 0u64;
        let mut written = 0u64;
        let mut index = self.directory.find(start);

        // Invalidated up front so a failed write cannot leave a stale position
        self.seek_offset = None;

        'seek: while let Some(mut at) = index {
            let run_start = self.directory.entry(at).offset;
            self.cursor.seek(&mut self.store, run_start >> shift)?;
            seeks += 1;

            loop {
                let entry = self.directory.entry(at);
                let offset = entry.offset;
                codec::pack(shift, &entry.pixels, packed);
                self.cursor.write_from(&mut self.store, packed)?;
                self.directory.entry_mut(at).dirty = false;
                written += 1;

                let next = offset + STEP;
                if let Some(adjacent) = self.directory.find_dirty(next) {
                    at = adjacent;
                    continue;
                }

                // Look a little further ahead before giving up on the run
                index = (2..=WRITE_GAP)
                    .map(|k| next + (k - 1) * STEP)
                    .find_map(|offset| self.directory.find_dirty(offset));
                continue 'seek;
            }
        }

        self.stats.write_backs += 1;
        self.stats.write_seeks += seeks;
        self.stats.blocks_written += written;
        debug!(start, blocks = written, seeks, "write-back");
        Ok(())
    }

    /// Write back every dirty entry, then push the cursor and store buffers out.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(index) = self.first_dirty() {
            self.write_back(index)?;
        }
        self.cursor.flush(&mut self.store)?;
        self.store.flush()?;
        Ok(())
    }

    fn first_dirty(&self) -> Option<usize> {
        self.directory.entries().position(|e| e.dirty)
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::layout::BLOCK_LEN;
    use crate::cache::{DiskCache, OpenRequest};
    use crate::config::CacheConfig;
    use crate::store::StoreKind;

    /// 4 KiB of directory holds a single entry.
    fn tiny_config(kib: usize) -> CacheConfig {
        CacheConfig {
            cache_max_kib: kib,
            cache_min_kib: kib,
            ..CacheConfig::default()
        }
    }

    /// One row per block, so `y` selects the block.
    fn open_rows(rows: u32, kib: usize) -> DiskCache {
        let request = OpenRequest::generic(BLOCK_LEN as u32, rows, 256);
        DiskCache::open(request, &tiny_config(kib)).unwrap()
    }

    #[test]
    fn first_miss_zero_fills_without_store_read() {
        let mut cache = open_rows(4, 16);
        assert_eq!(cache.read(5, 2).unwrap(), 0);
        let info = cache.info();
        assert_eq!(info.misses, 1);
        assert_eq!(info.zero_fills, 1);
        assert_eq!(info.block_loads, 0);
        assert_eq!(info.store_kind, StoreKind::Memory);
    }

    #[test]
    fn hit_after_miss() {
        let mut cache = open_rows(4, 16);
        cache.write(1, 0, 9).unwrap();
        cache.write(1, 1, 9).unwrap();
        assert_eq!(cache.read(1, 0).unwrap(), 9);
        let info = cache.info();
        assert_eq!(info.misses, 2);
        assert_eq!(info.hits, 1);
    }

    #[test]
    fn sequential_run_written_with_one_seek() {
        let mut cache = open_rows(64, 64);
        let entries = cache.info().entries as u32;
        assert!(entries >= 8 && entries < 64);

        for y in 0..entries {
            cache.write(0, y, y as u8 + 1).unwrap();
        }
        // One more block evicts the first entry; the whole run goes out with it
        cache.write(0, entries, 1).unwrap();
        let info = cache.info();
        assert_eq!(info.write_backs, 1);
        assert_eq!(info.write_seeks, 1);
        assert_eq!(info.blocks_written, entries as u64);
        assert_eq!(info.dirty_entries, 1);
    }

    #[test]
    fn flush_from_a_later_block_starts_at_the_run_head() {
        let mut cache = open_rows(16, 64);
        // Entry 0 holds block 2, the tail of the run
        for y in [2, 1, 0] {
            cache.write(0, y, 7).unwrap();
        }
        cache.flush().unwrap();
        let info = cache.info();
        assert_eq!(
            (info.write_backs, info.write_seeks, info.blocks_written),
            (1, 1, 3)
        );
    }

    #[test]
    fn evicted_tail_writes_the_whole_run_back() {
        let mut cache = open_rows(16, 16);
        let entries = cache.info().entries as u32;
        assert!(entries >= 2 && entries < 16);

        // Fill in reverse so the first clock victim holds the highest block
        for y in (0..entries).rev() {
            cache.write(0, y, y as u8 + 1).unwrap();
        }
        cache.write(0, entries, 1).unwrap();
        let info = cache.info();
        assert_eq!(info.write_backs, 1);
        assert_eq!(info.write_seeks, 1);
        assert_eq!(info.blocks_written, entries as u64);
        assert_eq!(info.dirty_entries, 1);
    }

    #[test]
    fn backward_scan_crosses_a_short_gap() {
        let mut cache = open_rows(16, 64);
        // Victim is block 5; block 2 sits two clean blocks behind it
        cache.write(0, 5, 7).unwrap();
        cache.write(0, 2, 7).unwrap();
        cache.flush().unwrap();
        let info = cache.info();
        assert_eq!(
            (info.write_backs, info.write_seeks, info.blocks_written),
            (1, 2, 2)
        );
    }

    #[test]
    fn short_gap_is_bridged_with_a_reseek() {
        let mut cache = open_rows(16, 64);
        // Blocks 0 and 1 dirty, 2..=3 clean, 4 dirty
        for y in [0, 1, 4] {
            cache.write(0, y, 7).unwrap();
        }
        assert_eq!(cache.read(0, 2).unwrap(), 0);
        assert_eq!(cache.read(0, 3).unwrap(), 0);
        cache.flush().unwrap();
        let info = cache.info();
        assert_eq!(info.write_backs, 1);
        assert_eq!(info.write_seeks, 2);
        assert_eq!(info.blocks_written, 3);
    }

    #[test]
    fn wide_gap_splits_the_run() {
        let mut cache = open_rows(16, 64);
        cache.write(0, 0, 7).unwrap();
        cache.write(0, 5, 7).unwrap();
        cache.flush().unwrap();
        let info = cache.info();
        assert_eq!(info.write_backs, 2);
        assert_eq!(info.blocks_written, 2);
    }

    #[test]
    fn flush_leaves_nothing_dirty() {
        let mut cache = open_rows(8, 16);
        for y in 0..8 {
            cache.write(3, y, 200).unwrap();
        }
        cache.flush().unwrap();
        assert_eq!(cache.info().dirty_entries, 0);
        for y in 0..8 {
            assert_eq!(cache.read(3, y).unwrap(), 200);
        }
    }

    #[test]
    fn reloaded_block_matches_written_pixels() {
        // Single entry: every new block evicts the previous one
        let mut cache = open_rows(3, 4);
        assert_eq!(cache.info().entries, 1);
        cache.write(10, 0, 42).unwrap();
        cache.write(10, 1, 43).unwrap();
        cache.write(10, 2, 44).unwrap();
        assert_eq!(cache.read(10, 0).unwrap(), 42);
        assert_eq!(cache.read(10, 1).unwrap(), 43);
        assert_eq!(cache.read(10, 2).unwrap(), 44);
        assert!(cache.info().block_loads > 0);
    }
}
