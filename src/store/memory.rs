/// Sparse in-memory store.
///
/// Blocks are materialised on first write. Reading a block that was never
/// written (or was filled with zero) yields zeros without allocating.
use ahash::RandomState;
use hashbrown::HashMap;

use super::{BackingStore, StoreKind};
use crate::error::StoreError;

pub struct MemoryStore {
    blocks: HashMap<u64, Box<[u8]>, RandomState>,
    block_len: usize,
    block_count: u64,
}

impl MemoryStore {
    pub fn new(block_len: usize, block_count: u64) -> Self {
        MemoryStore {
            blocks: HashMap::with_hasher(RandomState::new()),
            block_len,
            block_count,
        }
    }

    /// Number of blocks currently holding non-zero-filled data.
    pub fn resident_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl BackingStore for MemoryStore {
    fn block_len(&self) -> usize {
        self.block_len
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        self.check_access(index, buf.len())?;
        match self.blocks.get(&index) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<(), StoreError> {
        self.check_access(index, buf.len())?;
        match self.blocks.get_mut(&index) {
            Some(block) => block.copy_from_slice(buf),
            None => {
                self.blocks.insert(index, buf.into());
            }
        }
        Ok(())
    }

    fn fill_block(&mut self, index: u64, value: u8) -> Result<(), StoreError> {
        self.check_access(index, self.block_len)?;
        if value == 0 {
            self.blocks.remove(&index);
        } else {
            self.blocks
                .insert(index, vec![value; self.block_len].into_boxed_slice());
        }
        Ok(())
    }
}
