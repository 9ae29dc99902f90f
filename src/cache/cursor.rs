/// Sequential byte cursor over a block-paged backing store.
///
/// Holds exactly one store block in a scratch buffer and only touches the
/// store when the position crosses into another block. The buffer is written
/// back only when it holds changes. Switching between reading and writing
/// reseeks to the current position, so streams of either kind may follow one
/// another without an explicit seek.
use super::layout::{BLOCK_LEN, BLOCK_MASK, BLOCK_SHIFT};
use crate::error::StoreError;
use crate::store::BackingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorMode {
    Idle,
    Reading,
    Writing,
}

pub struct StoreCursor {
    buffer: Box<[u8]>,
    /// Store block currently held in `buffer`.
    block: Option<u64>,
    pos: usize,
    header_length: u64,
    dirty: bool,
    mode: CursorMode,
    loads: u64,
}

impl StoreCursor {
    /// `header_length` bytes at the front of the store are skipped by every seek.
    pub fn new(header_length: u64) -> Self {
        StoreCursor {
            buffer: vec![0u8; BLOCK_LEN].into_boxed_slice(),
            block: None,
            pos: BLOCK_LEN,
            header_length,
            dirty: false,
            mode: CursorMode::Idle,
            loads: 0,
        }
    }

    /// Store blocks fetched so far.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    /// Position the cursor at `packed_offset` bytes past the header.
    pub fn seek<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        packed_offset: u64,
    ) -> Result<(), StoreError> {
        self.seek_absolute(store, packed_offset + self.header_length)?;
        self.mode = CursorMode::Idle;
        Ok(())
    }

    pub fn get_byte<S: BackingStore + ?Sized>(&mut self, store: &mut S) -> Result<u8, StoreError> {
        self.prepare(store, CursorMode::Reading)?;
        let byte = self.buffer[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    pub fn put_byte<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        byte: u8,
    ) -> Result<(), StoreError> {
        self.prepare(store, CursorMode::Writing)?;
        self.buffer[self.pos] = byte;
        self.pos += 1;
        self.dirty = true;
        Ok(())
    }

    /// Fill `out` from consecutive bytes at the cursor.
    pub fn read_into<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        out: &mut [u8],
    ) -> Result<(), StoreError> {
        let mut done = 0;
        while done < out.len() {
            self.prepare(store, CursorMode::Reading)?;
            let n = (BLOCK_LEN - self.pos).min(out.len() - done);
            out[done..done + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            done += n;
        }
        Ok(())
    }

    /// Write `data` to consecutive bytes at the cursor.
    pub fn write_from<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let mut done = 0;
        while done < data.len() {
            self.prepare(store, CursorMode::Writing)?;
            let n = (BLOCK_LEN - self.pos).min(data.len() - done);
            self.buffer[self.pos..self.pos + n].copy_from_slice(&data[done..done + n]);
            self.pos += n;
            self.dirty = true;
            done += n;
        }
        Ok(())
    }

    /// Write the buffered block back if it holds changes.
    pub fn flush<S: BackingStore + ?Sized>(&mut self, store: &mut S) -> Result<(), StoreError> {
        if self.dirty {
            if let Some(block) = self.block {
                store.write_block(block, &self.buffer)?;
            }
            self.dirty = false;
        }
        Ok(())
    }

    fn position(&self) -> Option<u64> {
        self.block.map(|b| (b << BLOCK_SHIFT) + self.pos as u64)
    }

    fn seek_absolute<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        absolute: u64,
    ) -> Result<(), StoreError> {
        let block = absolute >> BLOCK_SHIFT;
        if self.block != Some(block) {
            self.load(store, block)?;
        }
        self.pos = (absolute & BLOCK_MASK) as usize;
        Ok(())
    }

    fn load<S: BackingStore + ?Sized>(&mut self, store: &mut S, block: u64) -> Result<(), StoreError> {
        self.flush(store)?;
        self.block = None;
        store.read_block(block, &mut self.buffer)?;
        self.block = Some(block);
        self.loads += 1;
        Ok(())
    }

    /// Reseek on a change of direction, then step into the next block if the
    /// current one is used up.
    #[inline]
    fn prepare<S: BackingStore + ?Sized>(
        &mut self,
        store: &mut S,
        mode: CursorMode,
    ) -> Result<(), StoreError> {
        if self.mode != mode {
            if self.mode != CursorMode::Idle {
                if let Some(position) = self.position() {
                    self.seek_absolute(store, position)?;
                }
            }
            self.mode = mode;
        }
        if self.pos >= BLOCK_LEN {
            let next = self.block.map_or(0, |b| b + 1);
            self.load(store, next)?;
            self.pos = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn patterned_store(blocks: u64) -> MemoryStore {
        let mut store = MemoryStore::new(BLOCK_LEN, blocks);
        for b in 0..blocks {
            let data: Vec<u8> = (0..BLOCK_LEN).map(|i| (i as u64 + b * 3) as u8).collect();
            store.write_block(b, &data).unwrap();
        }
        store
    }

    fn block(store: &MemoryStore, index: u64) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_LEN];
        store.read_block(index, &mut buf).unwrap();
        buf
    }

    #[test]
    fn get_crosses_block_boundary() {
        let mut store = patterned_store(2);
        let mut cursor = StoreCursor::new(0);
        cursor.seek(&mut store, BLOCK_LEN as u64 - 2).unwrap();
        let bytes: Vec<u8> = (0..4).map(|_| cursor.get_byte(&mut store).unwrap()).collect();
        let last = (BLOCK_LEN - 1) as u8;
        assert_eq!(bytes, [last - 1, last, 3, 4]);
        assert_eq!(cursor.loads(), 2);
    }

    #[test]
    fn seek_skips_header() {
        let mut store = patterned_store(1);
        let mut cursor = StoreCursor::new(18);
        cursor.seek(&mut store, 0).unwrap();
        assert_eq!(cursor.get_byte(&mut store).unwrap(), 18);
    }

    #[test]
    fn seek_within_buffered_block_does_not_reload() {
        let mut store = patterned_store(2);
        let mut cursor = StoreCursor::new(0);
        cursor.seek(&mut store, 10).unwrap();
        cursor.seek(&mut store, 900).unwrap();
        assert_eq!(cursor.get_byte(&mut store).unwrap(), (900 % 256) as u8);
        assert_eq!(cursor.loads(), 1);
    }

    #[test]
    fn reading_never_writes_back() {
        let mut store = MemoryStore::new(BLOCK_LEN, 3);
        let mut cursor = StoreCursor::new(0);
        let mut out = vec![0u8; 2 * BLOCK_LEN + 7];
        cursor.seek(&mut store, 0).unwrap();
        cursor.read_into(&mut store, &mut out).unwrap();
        cursor.seek(&mut store, 0).unwrap();
        assert_eq!(store.resident_blocks(), 0);
    }

    #[test]
    fn writes_reach_store_on_block_change_and_flush() {
        let mut store = MemoryStore::new(BLOCK_LEN, 2);
        let mut cursor = StoreCursor::new(0);
        cursor.seek(&mut store, BLOCK_LEN as u64 - 1).unwrap();
        cursor.write_from(&mut store, &[7, 8, 9]).unwrap();

        // Leaving block 0 wrote it; block 1 is still only buffered
        assert_eq!(block(&store, 0)[BLOCK_LEN - 1], 7);
        assert_eq!(block(&store, 1)[..2], [0, 0]);

        cursor.flush(&mut store).unwrap();
        assert_eq!(block(&store, 1)[..2], [8, 9]);
    }

    #[test]
    fn mixed_get_and_put_without_seek() {
        let mut store = patterned_store(1);
        let mut cursor = StoreCursor::new(0);
        cursor.seek(&mut store, 100).unwrap();
        assert_eq!(cursor.get_byte(&mut store).unwrap(), 100);
        cursor.put_byte(&mut store, 0xee).unwrap();
        assert_eq!(cursor.get_byte(&mut store).unwrap(), 102);
        cursor.flush(&mut store).unwrap();

        let data = block(&store, 0);
        assert_eq!(data[100..103], [100, 0xee, 102]);
    }

    #[test]
    fn mode_switch_at_block_end() {
        let mut store = MemoryStore::new(BLOCK_LEN, 2);
        let mut cursor = StoreCursor::new(0);
        cursor.seek(&mut store, 0).unwrap();
        cursor.write_from(&mut store, &vec![1u8; BLOCK_LEN]).unwrap();
        // Position sits at the end of block 0; the read must come from block 1
        assert_eq!(cursor.get_byte(&mut store).unwrap(), 0);
        assert_eq!(block(&store, 0), vec![1u8; BLOCK_LEN]);
    }

    #[test]
    fn out_of_bounds_load_reports_error() {
        let mut store = MemoryStore::new(BLOCK_LEN, 1);
        let mut cursor = StoreCursor::new(0);
        assert!(matches!(
            cursor.seek(&mut store, BLOCK_LEN as u64),
            Err(StoreError::OutOfBounds { index: 1, count: 1 })
        ));
    }
}
