//! Tunables for cache sizing, backing store placement and status reporting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DiskVideoError, Result};
use crate::store::StoreKind;

/// Largest cache tried first, in KiB.
pub const CACHE_MAX_KIB: usize = 64;
/// Smallest cache accepted before giving up, in KiB.
pub const CACHE_MIN_KIB: usize = 4;
/// Free memory to leave untouched when placing a store in RAM.
pub const RESERVE_BYTES: u64 = 33 << 10;
/// Pixel calls between status reports.
pub const STATUS_INTERVAL: u32 = 1000;
/// Status interval while extended-precision math makes each pixel slow.
pub const STATUS_INTERVAL_EXTENDED: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_max_kib: usize,
    pub cache_min_kib: usize,
    pub status_interval: u32,
    pub extended_precision: bool,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Preferred placement for non-Targa stores.
    pub prefer: StoreKind,
    /// Upper bound on a memory-resident store, in bytes.
    pub memory_budget: u64,
    pub reserve_bytes: u64,
    /// Directory for anonymous disk stores; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            cache_max_kib: CACHE_MAX_KIB,
            cache_min_kib: CACHE_MIN_KIB,
            status_interval: STATUS_INTERVAL,
            extended_precision: false,
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            prefer: StoreKind::Memory,
            memory_budget: 256 << 20,
            reserve_bytes: RESERVE_BYTES,
            temp_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CacheConfig =
            serde_json::from_str(json).map_err(|e| DiskVideoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DiskVideoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Apply `DISKVID_CACHE_KIB`, `DISKVID_STORE` and `DISKVID_TEMP_DIR`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(kib) = var("DISKVID_CACHE_KIB") {
            self.cache_max_kib = kib
                .trim()
                .parse()
                .map_err(|_| DiskVideoError::Config(format!("DISKVID_CACHE_KIB={kib:?}")))?;
            self.cache_min_kib = self.cache_min_kib.min(self.cache_max_kib);
        }
        if let Some(kind) = var("DISKVID_STORE") {
            self.store.prefer = match kind.trim().to_ascii_lowercase().as_str() {
                "memory" => StoreKind::Memory,
                "disk" => StoreKind::Disk,
                _ => return Err(DiskVideoError::Config(format!("DISKVID_STORE={kind:?}"))),
            };
        }
        if let Some(dir) = var("DISKVID_TEMP_DIR") {
            self.store.temp_dir = Some(PathBuf::from(dir));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_min_kib == 0 {
            return Err(DiskVideoError::Config("cache_min_kib must be non-zero".into()));
        }
        if self.cache_min_kib > self.cache_max_kib {
            return Err(DiskVideoError::Config(format!(
                "cache_min_kib ({}) exceeds cache_max_kib ({})",
                self.cache_min_kib, self.cache_max_kib
            )));
        }
        if self.status_interval == 0 {
            return Err(DiskVideoError::Config("status_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Calls between status reports, honouring extended precision.
    pub fn effective_status_interval(&self) -> u32 {
        if self.extended_precision {
            STATUS_INTERVAL_EXTENDED.min(self.status_interval)
        } else {
            self.status_interval
        }
    }
}
