/// Disk-video pixel cache.
///
/// Provides `DiskCache`: a random-access pixel store whose full raster lives
/// in a block-paged backing store, with a small directory of decoded blocks
/// in front of it. Lookups go through a chained hash table, eviction is a
/// clock sweep, and dirty blocks are written back in coalesced runs.
mod cursor;
mod directory;
mod engine;
pub mod layout;
mod lifecycle;
mod pixels;

use std::fmt;
use std::path::PathBuf;

use cursor::StoreCursor;
use directory::CacheDirectory;

use crate::status::{StatusSink, StatusThrottle};
use crate::store::{BackingStore, PagedStore, StoreKind};

/// How the logical pixel store is laid out and initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// One palette index per pixel, packed by colour depth.
    Generic,
    /// 16-bit continuous potential: high bytes in the top half of the rows,
    /// low bytes in the bottom half.
    Potential,
    /// 24-bit BGR rows behind a file header.
    Targa,
}

/// Parameters for [`DiskCache::open`].
pub struct OpenRequest {
    pub(crate) row_stride: u64,
    pub(crate) row_count: u64,
    pub(crate) colors: u32,
    pub(crate) mode: OpenMode,
    pub(crate) header: Vec<u8>,
    pub(crate) store_path: Option<PathBuf>,
    pub(crate) status: Option<Box<dyn StatusSink + Send>>,
}

impl OpenRequest {
    pub fn generic(row_stride: u32, row_count: u32, colors: u32) -> Self {
        Self::new(
            row_stride as u64,
            row_count as u64,
            colors,
            OpenMode::Generic,
            Vec::new(),
        )
    }

    /// Room for `width` x `height` 16-bit potential values.
    pub fn potential(width: u32, height: u32) -> Self {
        Self::new(
            width as u64,
            height as u64 * 2,
            256,
            OpenMode::Potential,
            Vec::new(),
        )
    }

    /// A `width` x `height` 24-bit image preceded by `header`.
    pub fn targa(width: u32, height: u32, header: Vec<u8>) -> Self {
        Self::new(
            width as u64 * 3,
            height as u64,
            1 << 24,
            OpenMode::Targa,
            header,
        )
    }

    fn new(row_stride: u64, row_count: u64, colors: u32, mode: OpenMode, header: Vec<u8>) -> Self {
        OpenRequest {
            row_stride,
            row_count,
            colors,
            mode,
            header,
            store_path: None,
            status: None,
        }
    }

    /// Keep the backing store in a file at `path`.
    ///
    /// A store with a path is flushed on close whatever the mode.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_status(mut self, sink: impl StatusSink + Send + 'static) -> Self {
        self.status = Some(Box::new(sink));
        self
    }
}

/// Fixed shape of the logical pixel store.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub row_stride: u32,
    pub row_count: u32,
    pub pixel_shift: u8,
    pub header_length: u64,
    pub mode: OpenMode,
}

impl Geometry {
    /// Unpacked bytes addressed by pixel coordinates.
    pub fn logical_len(&self) -> u64 {
        self.row_stride as u64 * self.row_count as u64
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub zero_fills: u64,
    pub write_backs: u64,
    pub write_seeks: u64,
    pub blocks_written: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    /// Misses served by zero-filling a never-written block.
    pub zero_fills: u64,
    /// Store blocks the cursor fetched.
    pub block_loads: u64,
    /// Evictions or flushes that had to write back a dirty run.
    pub write_backs: u64,
    /// Seeks issued while writing back; one per coalesced run.
    pub write_seeks: u64,
    pub blocks_written: u64,
    pub entries: usize,
    pub dirty_entries: usize,
    pub store_kind: StoreKind,
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheInfo(hits={}, misses={}, zero_fills={}, block_loads={}, write_backs={}, write_seeks={}, blocks_written={}, entries={}, dirty_entries={}, store_kind={:?})",
            self.hits,
            self.misses,
            self.zero_fills,
            self.block_loads,
            self.write_backs,
            self.write_seeks,
            self.blocks_written,
            self.entries,
            self.dirty_entries,
            self.store_kind
        )
    }
}

/// The main disk-video cache handle.
///
/// One instance owns its directory, cursor and backing store. All operations
/// take `&mut self`; wrap it in [`SharedDiskCache`](crate::SharedDiskCache)
/// to share between threads.
pub struct DiskCache {
    directory: CacheDirectory,
    cursor: StoreCursor,
    store: PagedStore,
    geometry: Geometry,
    /// Highest block offset ever loaded; blocks above it were never written.
    high_offset: Option<u64>,
    /// Block offset the cursor will deliver next without seeking.
    seek_offset: Option<u64>,
    /// (block offset, entry index) of the last block referenced.
    current: Option<(u64, usize)>,
    /// (row, row base offset) of the last row referenced.
    row_cache: Option<(u32, u64)>,
    stats: CacheStats,
    status: Box<dyn StatusSink + Send>,
    throttle: StatusThrottle,
}

impl DiskCache {
    pub fn pixel_shift(&self) -> u8 {
        self.geometry.pixel_shift
    }

    pub fn row_stride(&self) -> u32 {
        self.geometry.row_stride
    }

    pub fn row_count(&self) -> u32 {
        self.geometry.row_count
    }

    pub fn mode(&self) -> OpenMode {
        self.geometry.mode
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            hits: self.stats.hits,
            misses: self.stats.misses,
            zero_fills: self.stats.zero_fills,
            block_loads: self.cursor.loads(),
            write_backs: self.stats.write_backs,
            write_seeks: self.stats.write_seeks,
            blocks_written: self.stats.blocks_written,
            entries: self.directory.len(),
            dirty_entries: self.directory.dirty_count(),
            store_kind: self.store_kind(),
        }
    }
}
