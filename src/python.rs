use std::path::PathBuf;

use parking_lot::Mutex;
use pyo3::exceptions::{PyOSError, PyValueError};
use pyo3::prelude::*;

use crate::cache::{self, DiskCache, OpenRequest};
use crate::config::CacheConfig;
use crate::error::DiskVideoError;

impl From<DiskVideoError> for PyErr {
    fn from(err: DiskVideoError) -> PyErr {
        match err {
            DiskVideoError::CacheAllocation { .. }
            | DiskVideoError::StoreAllocation(_)
            | DiskVideoError::Cancelled { .. }
            | DiskVideoError::Store(_) => PyOSError::new_err(err.to_string()),
            DiskVideoError::BlockStraddle { .. }
            | DiskVideoError::OutOfRange { .. }
            | DiskVideoError::WrongMode { .. }
            | DiskVideoError::Geometry(_)
            | DiskVideoError::Config(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

#[pyclass(frozen, name = "CacheInfo")]
pub struct PyCacheInfo {
    #[pyo3(get)]
    pub hits: u64,
    #[pyo3(get)]
    pub misses: u64,
    #[pyo3(get)]
    pub zero_fills: u64,
    #[pyo3(get)]
    pub block_loads: u64,
    #[pyo3(get)]
    pub write_backs: u64,
    #[pyo3(get)]
    pub write_seeks: u64,
    #[pyo3(get)]
    pub blocks_written: u64,
    #[pyo3(get)]
    pub entries: usize,
    #[pyo3(get)]
    pub dirty_entries: usize,
    #[pyo3(get)]
    pub store_kind: String,
}

#[pymethods]
impl PyCacheInfo {
    fn __repr__(&self) -> String {
        format!(
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

impl From<cache::CacheInfo> for PyCacheInfo {
    fn from(info: cache::CacheInfo) -> Self {
        PyCacheInfo {
            hits: info.hits,
            misses: info.misses,
            zero_fills: info.zero_fills,
            block_loads: info.block_loads,
            write_backs: info.write_backs,
            write_seeks: info.write_seeks,
            blocks_written: info.blocks_written,
            entries: info.entries,
            dirty_entries: info.dirty_entries,
            store_kind: format!("{:?}", info.store_kind).to_lowercase(),
        }
    }
}

/// Disk-video pixel cache exposed to Python.
///
/// The cache is closed explicitly with `close()`; every call after that
/// raises `ValueError`.
#[pyclass(frozen, name = "DiskCache")]
pub struct PyDiskCache {
    cache: Mutex<Option<DiskCache>>,
}

impl PyDiskCache {
    fn with_cache<T>(
        &self,
        f: impl FnOnce(&mut DiskCache) -> crate::error::Result<T>,
    ) -> PyResult<T> {
        let mut guard = self.cache.lock();
        let cache = guard
            .as_mut()
            .ok_or_else(|| PyValueError::new_err("disk video cache is closed"))?;
        Ok(f(cache)?)
    }
}

#[pymethods]
impl PyDiskCache {
    #[new]
    #[pyo3(signature = (width, height, colors=256, mode="generic", header=None, path=None, config=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        width: u32,
        height: u32,
        colors: u32,
        mode: &str,
        header: Option<Vec<u8>>,
        path: Option<PathBuf>,
        config: Option<&str>,
    ) -> PyResult<Self> {
        let config = match config {
            Some(json) => CacheConfig::from_json_str(json)?,
            None => CacheConfig::default(),
        }
        .with_env_overrides()?;

        let mut request = match mode {
            "generic" => OpenRequest::generic(width, height, colors),
            "potential" => OpenRequest::potential(width, height),
            "targa" => OpenRequest::targa(width, height, header.unwrap_or_default()),
            other => {
                return Err(PyValueError::new_err(format!(
                    "unknown mode {other:?}, expected generic, potential or targa"
                )))
            }
        };
        if let Some(path) = path {
            request = request.with_store_path(path);
        }

        let cache = DiskCache::open(request, &config)?;
        Ok(PyDiskCache {
            cache: Mutex::new(Some(cache)),
        })
    }

    fn read(&self, x: u32, y: u32) -> PyResult<u8> {
        self.with_cache(|c| c.read(x, y))
    }

    fn write(&self, x: u32, y: u32, color: u8) -> PyResult<()> {
        self.with_cache(|c| c.write(x, y, color))
    }

    fn read_targa(&self, x: u32, y: u32) -> PyResult<(u8, u8, u8)> {
        self.with_cache(|c| c.read_targa(x, y))
    }

    fn write_targa(&self, x: u32, y: u32, r: u8, g: u8, b: u8) -> PyResult<()> {
        self.with_cache(|c| c.write_targa(x, y, r, g, b))
    }

    fn read_potential(&self, x: u32, y: u32) -> PyResult<u16> {
        self.with_cache(|c| c.read_potential(x, y))
    }

    fn write_potential(&self, x: u32, y: u32, value: u16) -> PyResult<()> {
        self.with_cache(|c| c.write_potential(x, y, value))
    }

    fn read_bytes(&self, offset: u64, size: usize) -> PyResult<Vec<u8>> {
        self.with_cache(|c| {
            let mut out = vec![0u8; size];
            c.read_bytes(offset, &mut out)?;
            Ok(out)
        })
    }

    fn write_bytes(&self, offset: u64, data: Vec<u8>) -> PyResult<()> {
        self.with_cache(|c| c.write_bytes(offset, &data))
    }

    fn flush(&self) -> PyResult<()> {
        self.with_cache(|c| c.flush())
    }

    fn cache_info(&self) -> PyResult<PyCacheInfo> {
        self.with_cache(|c| Ok(c.info().into()))
    }

    #[getter]
    fn pixel_shift(&self) -> PyResult<u8> {
        self.with_cache(|c| Ok(c.pixel_shift()))
    }

    /// Release the backing store. Closing twice is a no-op.
    fn close(&self) -> PyResult<()> {
        let cache = self.cache.lock().take();
        if let Some(cache) = cache {
            cache.close()?;
        }
        Ok(())
    }
}

#[pymodule]
fn diskvid(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDiskCache>()?;
    m.add_class::<PyCacheInfo>()?;
    Ok(())
}
