use thiserror::Error;

use crate::cache::OpenMode;

/// Failures reported by a backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Propagated file or mapping error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Block index past the end of the store.
    #[error("block {index} out of bounds (store has {count} blocks)")]
    OutOfBounds { index: u64, count: u64 },

    /// Transfer buffer does not match the store's block length.
    #[error("buffer of {actual} bytes does not match block length {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Neither memory nor disk could hold the requested store.
    #[error("cannot allocate {bytes} bytes of memory or disk space")]
    Exhausted { bytes: u64 },
}

#[derive(Error, Debug)]
pub enum DiskVideoError {
    /// The directory could not be sized even at the minimum cache size.
    #[error("insufficient free memory for cache buffers ({needed} bytes)")]
    CacheAllocation { needed: usize },

    /// The backing store could not be allocated.
    #[error("insufficient free memory/disk space: {0}")]
    StoreAllocation(#[source] StoreError),

    /// The caller interrupted the initial clear of the store.
    #[error("disk video initialization interrupted after {cleared} of {total} blocks")]
    Cancelled { cleared: u64, total: u64 },

    /// Raw byte access would cross a cache block boundary.
    #[error("{len} bytes at offset {offset} cross a cache block boundary")]
    BlockStraddle { offset: u64, len: usize },

    /// Raw byte access past the end of the logical pixel store.
    #[error("{len} bytes at offset {offset} lie outside the pixel store")]
    OutOfRange { offset: u64, len: usize },

    /// Operation needs a cache opened in a different mode.
    #[error("operation requires {expected:?} mode, cache is in {actual:?} mode")]
    WrongMode { expected: OpenMode, actual: OpenMode },

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("config error: {0}")]
    Config(String),

    /// Propagated backing store failure during pixel traffic.
    #[error("backing store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DiskVideoError>;
