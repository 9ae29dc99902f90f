/// Block-oriented backing stores for the pixel cache.
///
/// The cache only ever moves whole blocks in and out of a store, so a store
/// is a fixed array of `block_len`-byte blocks addressed by index. Two
/// implementations exist: a sparse in-memory page map and a memory-mapped
/// file. `PagedStore` wraps both so the hot path dispatches without a vtable.
pub mod mapped;
pub mod memory;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;

pub use mapped::MappedStore;
pub use memory::MemoryStore;

/// Where a store's blocks live. Used as a placement hint at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Fast volatile memory.
    Memory,
    /// Persistent file on disk.
    Disk,
}

pub trait BackingStore {
    fn block_len(&self) -> usize;
    fn block_count(&self) -> u64;
    fn kind(&self) -> StoreKind;

    /// Copy block `index` into `buf`.
    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Copy `buf` over block `index`.
    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<(), StoreError>;

    /// Set every byte of block `index` to `value`.
    fn fill_block(&mut self, index: u64, value: u8) -> Result<(), StoreError>;

    /// Push buffered changes to the underlying medium.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Validate `index` and the transfer buffer length.
    fn check_access(&self, index: u64, len: usize) -> Result<(), StoreError> {
        if index >= self.block_count() {
            return Err(StoreError::OutOfBounds {
                index,
                count: self.block_count(),
            });
        }
        if len != self.block_len() {
            return Err(StoreError::BufferSize {
                expected: self.block_len(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// Concrete enum wrapping all stores, enabling devirtualization + inlining.
pub enum PagedStore {
    Memory(MemoryStore),
    Mapped(MappedStore),
}

impl PagedStore {
    /// File the store lives in, when it was created at a caller-chosen path.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::Mapped(s) => s.path(),
        }
    }

    /// Flush and give the store back to the system.
    ///
    /// Anonymous disk stores vanish here; stores created at a path keep their file.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.flush()?;
        debug!(kind = ?self.kind(), blocks = self.block_count(), "backing store released");
        Ok(())
    }
}

impl BackingStore for PagedStore {
    #[inline(always)]
    fn block_len(&self) -> usize {
        match self {
            Self::Memory(s) => s.block_len(),
            Self::Mapped(s) => s.block_len(),
        }
    }

    #[inline(always)]
    fn block_count(&self) -> u64 {
        match self {
            Self::Memory(s) => s.block_count(),
            Self::Mapped(s) => s.block_count(),
        }
    }

    #[inline(always)]
    fn kind(&self) -> StoreKind {
        match self {
            Self::Memory(s) => s.kind(),
            Self::Mapped(s) => s.kind(),
        }
    }

    #[inline(always)]
    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.read_block(index, buf),
            Self::Mapped(s) => s.read_block(index, buf),
        }
    }

    #[inline(always)]
    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.write_block(index, buf),
            Self::Mapped(s) => s.write_block(index, buf),
        }
    }

    #[inline(always)]
    fn fill_block(&mut self, index: u64, value: u8) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.fill_block(index, value),
            Self::Mapped(s) => s.fill_block(index, value),
        }
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.flush(),
            Self::Mapped(s) => s.flush(),
        }
    }
}

/// Allocate a store of `block_count` blocks of `block_len` bytes.
///
/// A `Memory` hint is honoured only when the request fits the configured
/// budget and the memory currently available; otherwise the store falls
/// through to disk. `path` pins a disk store to a named file.
pub fn allocate(
    block_len: usize,
    block_count: u64,
    hint: StoreKind,
    path: Option<&Path>,
    config: &StoreConfig,
) -> Result<PagedStore, StoreError> {
    let bytes = block_count.saturating_mul(block_len as u64);
    if bytes == 0 {
        return Err(StoreError::Exhausted { bytes });
    }

    if hint == StoreKind::Memory && path.is_none() {
        if memory_fits(bytes, config) {
            debug!(bytes, block_count, "backing store placed in memory");
            return Ok(PagedStore::Memory(MemoryStore::new(block_len, block_count)));
        }
        warn!(bytes, "not enough memory for backing store, falling back to disk");
    }

    let mapped = match path {
        Some(path) => MappedStore::create_at(path, block_len, block_count),
        None => MappedStore::create_temp(config.temp_dir.as_deref(), block_len, block_count),
    };
    match mapped {
        Ok(store) => {
            debug!(bytes, block_count, "backing store placed on disk");
            Ok(PagedStore::Mapped(store))
        }
        Err(e) => {
            warn!(bytes, error = %e, "disk backing store allocation failed");
            Err(StoreError::Exhausted { bytes })
        }
    }
}

fn memory_fits(bytes: u64, config: &StoreConfig) -> bool {
    if bytes > config.memory_budget {
        return false;
    }
    match available_memory() {
        Some(avail) => bytes.saturating_add(config.reserve_bytes) <= avail,
        None => true,
    }
}

/// Physical memory currently free, if the platform reports it.
fn available_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if pages <= 0 || page_size <= 0 {
            return None;
        }
        Some(pages as u64 * page_size as u64)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
