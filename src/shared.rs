use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheInfo, DiskCache};
use crate::error::Result;

/// A `DiskCache` behind one lock, for renderers running on several threads.
///
/// Every call takes the lock for its whole duration; the directory, clock
/// and cursor are never touched concurrently. Use [`with`](Self::with) to
/// batch a row of pixels under a single acquisition.
#[derive(Clone)]
pub struct SharedDiskCache {
    inner: Arc<Mutex<DiskCache>>,
}

impl SharedDiskCache {
    pub fn new(cache: DiskCache) -> Self {
        SharedDiskCache {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Run `f` with exclusive access to the cache.
    pub fn with<T>(&self, f: impl FnOnce(&mut DiskCache) -> T) -> T {
        let mut cache = self.inner.lock();
        f(&mut cache)
    }

    #[inline]
    pub fn read(&self, x: u32, y: u32) -> Result<u8> {
        self.inner.lock().read(x, y)
    }

    #[inline]
    pub fn write(&self, x: u32, y: u32, color: u8) -> Result<()> {
        self.inner.lock().write(x, y, color)
    }

    pub fn read_targa(&self, x: u32, y: u32) -> Result<(u8, u8, u8)> {
        self.inner.lock().read_targa(x, y)
    }

    pub fn write_targa(&self, x: u32, y: u32, r: u8, g: u8, b: u8) -> Result<()> {
        self.inner.lock().write_targa(x, y, r, g, b)
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    pub fn info(&self) -> CacheInfo {
        self.inner.lock().info()
    }

    /// Recover the cache once every other handle is gone.
    pub fn into_inner(self) -> std::result::Result<DiskCache, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| SharedDiskCache { inner })
    }
}
