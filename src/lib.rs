//! Block-cached "disk video" pixel store.
//!
//! A raster too large to keep in memory lives in a paged backing store
//! (RAM pages or a memory-mapped file) packed at its colour depth. A small
//! directory of decoded blocks sits in front of it, evicted by a clock sweep
//! and written back in coalesced runs.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod shared;
pub mod status;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use cache::{CacheInfo, DiskCache, OpenMode, OpenRequest};
pub use config::{CacheConfig, StoreConfig};
pub use error::{DiskVideoError, Result, StoreError};
pub use shared::SharedDiskCache;
pub use status::{StatusSink, TraceStatus};
pub use store::{BackingStore, MappedStore, MemoryStore, PagedStore, StoreKind};
