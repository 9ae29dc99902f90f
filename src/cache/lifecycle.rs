//! Opening, reattaching and closing a disk-video cache.

use tracing::{debug, info, warn};

use super::cursor::StoreCursor;
use super::directory::CacheDirectory;
use super::layout::{round_up_block, BLOCK_LEN, BLOCK_SHIFT, ENTRY_SIZE, PLACEHOLDER_BASE};
use super::{CacheStats, DiskCache, Geometry, OpenMode, OpenRequest};
use crate::codec;
use crate::config::CacheConfig;
use crate::error::{DiskVideoError, Result};
use crate::status::{StatusSink, StatusThrottle, TraceStatus};
use crate::store::{self, BackingStore, PagedStore, StoreKind};

impl Geometry {
    fn for_request(request: &OpenRequest) -> Result<Self> {
        if request.row_stride == 0 || request.row_count == 0 {
            return Err(DiskVideoError::Geometry(format!(
                "empty raster {}x{}",
                request.row_stride, request.row_count
            )));
        }
        let (Ok(row_stride), Ok(row_count)) = (
            u32::try_from(request.row_stride),
            u32::try_from(request.row_count),
        ) else {
            return Err(DiskVideoError::Geometry(format!(
                "raster {}x{} exceeds the addressable row range",
                request.row_stride, request.row_count
            )));
        };

        let pixel_shift = match request.mode {
            OpenMode::Generic => codec::pixel_shift_for_colors(request.colors),
            OpenMode::Potential | OpenMode::Targa => 0,
        };
        let geometry = Geometry {
            row_stride,
            row_count,
            pixel_shift,
            header_length: request.header.len() as u64,
            mode: request.mode,
        };
        if geometry.logical_len() >= PLACEHOLDER_BASE {
            return Err(DiskVideoError::Geometry(format!(
                "raster of {} pixels is too large",
                geometry.logical_len()
            )));
        }
        Ok(geometry)
    }

    /// Store blocks needed for the packed raster plus the header.
    fn store_blocks(&self) -> u64 {
        let packed = round_up_block(self.logical_len()) >> self.pixel_shift;
        round_up_block(packed + self.header_length) >> BLOCK_SHIFT
    }
}

/// Reserve the largest directory the config allows, halving on failure.
fn size_directory(config: &CacheConfig) -> Result<CacheDirectory> {
    let mut kib = config.cache_max_kib;
    loop {
        let bytes = kib.saturating_mul(1024);
        match CacheDirectory::with_capacity(bytes / ENTRY_SIZE) {
            Ok(directory) => {
                debug!(kib, entries = directory.len(), "cache directory sized");
                return Ok(directory);
            }
            Err(e) => {
                debug!(kib, error = %e, "cache directory allocation failed");
                if kib <= config.cache_min_kib {
                    return Err(DiskVideoError::CacheAllocation { needed: bytes });
                }
                kib = (kib / 2).max(config.cache_min_kib);
            }
        }
    }
}

impl DiskCache {
    /// Open a cache over a freshly allocated and cleared backing store.
    pub fn open(request: OpenRequest, config: &CacheConfig) -> Result<Self> {
        Self::open_with_cancel(request, config, |_, _| false)
    }

    /// Like [`open`](Self::open), polling `cancel(cleared, total)` after each
    /// block of the initial clear. Returning `true` abandons the open.
    pub fn open_with_cancel(
        mut request: OpenRequest,
        config: &CacheConfig,
        mut cancel: impl FnMut(u64, u64) -> bool,
    ) -> Result<Self> {
        config.validate()?;
        let geometry = Geometry::for_request(&request)?;
        let mut status = request.status.take().unwrap_or_else(default_status);
        status.report(0, "clearing the 'screen'");

        let directory = size_directory(config)?;
        let block_count = geometry.store_blocks();
        let hint = match geometry.mode {
            OpenMode::Targa => StoreKind::Disk,
            OpenMode::Generic | OpenMode::Potential => config.store.prefer,
        };
        let mut store = store::allocate(
            BLOCK_LEN,
            block_count,
            hint,
            request.store_path.as_deref(),
            &config.store,
        )
        .map_err(DiskVideoError::StoreAllocation)?;

        let high_offset = match geometry.mode {
            OpenMode::Targa => {
                write_header(&mut store, &request.header)?;
                // Existing file contents are not known to be zero
                Some(u64::MAX)
            }
            OpenMode::Generic | OpenMode::Potential => {
                for index in 0..block_count {
                    store.fill_block(index, 0)?;
                    if cancel(index + 1, block_count) {
                        if let Err(e) = store.release() {
                            warn!(error = %e, "releasing store after cancel failed");
                        }
                        info!(cleared = index + 1, total = block_count, "disk video open cancelled");
                        return Err(DiskVideoError::Cancelled {
                            cleared: index + 1,
                            total: block_count,
                        });
                    }
                }
                None
            }
        };
        status.report(0, "");

        let cache = Self::assemble(directory, store, geometry, high_offset, status, config);
        info!(
            mode = ?geometry.mode,
            width = geometry.row_stride,
            height = geometry.row_count,
            pixel_shift = geometry.pixel_shift,
            entries = cache.directory.len(),
            store = ?cache.store_kind(),
            blocks = block_count,
            "disk video opened"
        );
        Ok(cache)
    }

    /// Reopen a cache over a store that already holds pixel data.
    ///
    /// Nothing is cleared and the request's header bytes are not written;
    /// only their length is used to skip the front of the store.
    pub fn attach(store: PagedStore, mut request: OpenRequest, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let geometry = Geometry::for_request(&request)?;
        let needed = geometry.store_blocks();
        if store.block_len() != BLOCK_LEN || store.block_count() < needed {
            return Err(DiskVideoError::Geometry(format!(
                "store of {} x {} bytes cannot hold {} blocks of {}",
                store.block_count(),
                store.block_len(),
                needed,
                BLOCK_LEN
            )));
        }
        let directory = size_directory(config)?;
        let status = request.status.take().unwrap_or_else(default_status);

        let cache = Self::assemble(directory, store, geometry, Some(u64::MAX), status, config);
        info!(
            mode = ?geometry.mode,
            entries = cache.directory.len(),
            store = ?cache.store_kind(),
            "disk video attached"
        );
        Ok(cache)
    }

    /// Flush everything and hand the backing store back for a later [`attach`](Self::attach).
    pub fn detach(mut self) -> Result<PagedStore> {
        self.flush()?;
        debug!(info = %self.info(), "disk video detached");
        Ok(self.store)
    }

    /// Shut the cache down and release its backing store.
    ///
    /// Dirty blocks are written out first in Targa mode and for stores kept
    /// at a path; anonymous stores are simply discarded.
    pub fn close(mut self) -> Result<()> {
        if self.geometry.mode == OpenMode::Targa || self.store.path().is_some() {
            self.flush()?;
        }
        let stats = self.info();
        self.store.release()?;
        info!(
            hits = stats.hits,
            misses = stats.misses,
            blocks_written = stats.blocks_written,
            "disk video closed"
        );
        Ok(())
    }

    fn assemble(
        directory: CacheDirectory,
        store: PagedStore,
        geometry: Geometry,
        high_offset: Option<u64>,
        status: Box<dyn StatusSink + Send>,
        config: &CacheConfig,
    ) -> Self {
        DiskCache {
            directory,
            cursor: StoreCursor::new(geometry.header_length),
            store,
            geometry,
            high_offset,
            seek_offset: None,
            current: None,
            row_cache: None,
            stats: CacheStats::default(),
            status,
            throttle: StatusThrottle::new(config.effective_status_interval()),
        }
    }
}

fn default_status() -> Box<dyn StatusSink + Send> {
    Box::new(TraceStatus)
}

/// Copy `header` over the front blocks of a new store.
fn write_header(store: &mut PagedStore, header: &[u8]) -> Result<()> {
    let mut block = [0u8; BLOCK_LEN];
    for (index, chunk) in header.chunks(BLOCK_LEN).enumerate() {
        block.fill(0);
        block[..chunk.len()].copy_from_slice(chunk);
        store.write_block(index as u64, &block)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CacheConfig {
        CacheConfig {
            cache_max_kib: 16,
            cache_min_kib: 4,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn store_size_accounts_for_packing_and_header() {
        let mut request = OpenRequest::generic(100, 50, 16);
        let geometry = Geometry::for_request(&request).unwrap();
        assert_eq!(geometry.pixel_shift, 1);
        // 5000 pixels round to 6144, pack to 3072, fit in 2 blocks
        assert_eq!(geometry.store_blocks(), 2);

        request.header = vec![0; BLOCK_LEN];
        let geometry = Geometry::for_request(&request).unwrap();
        assert_eq!(geometry.store_blocks(), 3);
    }

    #[test]
    fn targa_and_potential_are_unpacked() {
        let targa = Geometry::for_request(&OpenRequest::targa(10, 10, vec![0; 18])).unwrap();
        assert_eq!((targa.pixel_shift, targa.row_stride, targa.header_length), (0, 30, 18));
        let pot = Geometry::for_request(&OpenRequest::potential(10, 10)).unwrap();
        assert_eq!((pot.pixel_shift, pot.row_count), (0, 20));
    }

    #[test]
    fn rejects_empty_and_oversized_rasters() {
        assert!(matches!(
            Geometry::for_request(&OpenRequest::generic(0, 10, 256)),
            Err(DiskVideoError::Geometry(_))
        ));
        assert!(matches!(
            Geometry::for_request(&OpenRequest::targa(u32::MAX, 1, Vec::new())),
            Err(DiskVideoError::Geometry(_))
        ));
        assert!(matches!(
            Geometry::for_request(&OpenRequest::generic(u32::MAX, u32::MAX, 256)),
            Err(DiskVideoError::Geometry(_))
        ));
    }

    #[test]
    fn directory_sized_from_config() {
        let directory = size_directory(&small_config()).unwrap();
        assert_eq!(directory.len(), 16 * 1024 / ENTRY_SIZE);
    }

    #[test]
    fn open_reports_clearing() {
        let lines = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = {
            let lines = lines.clone();
            move |line: usize, msg: &str| lines.lock().push((line, msg.to_string()))
        };
        let request = OpenRequest::generic(64, 64, 256).with_status(sink);
        let _cache = DiskCache::open(request, &small_config()).unwrap();
        assert_eq!(
            *lines.lock(),
            [(0, "clearing the 'screen'".to_string()), (0, String::new())]
        );
    }

    #[test]
    fn cancel_stops_the_clear() {
        let request = OpenRequest::generic(BLOCK_LEN as u32, 8, 256);
        let result =
            DiskCache::open_with_cancel(request, &small_config(), |cleared, _| cleared == 3);
        assert!(matches!(
            result,
            Err(DiskVideoError::Cancelled {
                cleared: 3,
                total: 8
            })
        ));
    }

    #[test]
    fn targa_header_lands_in_front() {
        let header: Vec<u8> = (1..=18).collect();
        let request = OpenRequest::targa(4, 4, header.clone());
        let mut cache = DiskCache::open(request, &small_config()).unwrap();
        assert_eq!(cache.store_kind(), StoreKind::Disk);
        cache.write_targa(0, 0, 7, 8, 9).unwrap();
        let store = cache.detach().unwrap();

        let mut block = vec![0u8; BLOCK_LEN];
        store.read_block(0, &mut block).unwrap();
        assert_eq!(&block[..18], &header[..]);
        assert_eq!(&block[18..21], &[9, 8, 7]);
    }

    #[test]
    fn attach_rejects_small_store() {
        let store = PagedStore::Memory(store::MemoryStore::new(BLOCK_LEN, 1));
        let request = OpenRequest::generic(BLOCK_LEN as u32, 2, 256);
        assert!(matches!(
            DiskCache::attach(store, request, &small_config()),
            Err(DiskVideoError::Geometry(_))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_before_allocation() {
        let config = CacheConfig {
            status_interval: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(
            DiskCache::open(OpenRequest::generic(8, 8, 256), &config),
            Err(DiskVideoError::Config(_))
        ));
    }
}
