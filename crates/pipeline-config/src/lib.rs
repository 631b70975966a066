pub mod config;

pub use config::{ConfigError, load, load_or_default};

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

pub const DEFAULT_IDENTIFIER: &str = "imagepipe.Example";

/// Roughly 64MB of decoded RGBA pixels
pub const DEFAULT_MEMORY_BYTE_BUDGET: usize = 64 * 1024 * 1024;
pub const DEFAULT_DISK_MAX_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyPolicy {
    pub max_concurrent_downloads: usize,
    pub max_concurrent_decodes: usize,
    /// Only one decode may run at a time across every pipeline sharing the
    /// global configuration.
    pub serialize_decoding: bool,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            max_concurrent_decodes: 2,
            serialize_decoding: false,
        }
    }
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloads, {} decodes{}",
            self.max_concurrent_downloads,
            self.max_concurrent_decodes,
            if self.serialize_decoding {
                " (serialized)"
            } else {
                ""
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of decoded images held in memory
    pub memory_capacity: usize,
    pub memory_byte_budget: usize,
    /// Maximum number of encoded images held in memory
    pub data_capacity: usize,
    pub data_byte_budget: usize,
    pub disk_enabled: bool,
    pub disk_max_bytes: u64,
    /// Falls back to the platform cache directory when unset
    pub disk_root: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_capacity: 200,
            memory_byte_budget: DEFAULT_MEMORY_BYTE_BUDGET,
            data_capacity: 400,
            data_byte_budget: 32 * 1024 * 1024,
            disk_enabled: true,
            disk_max_bytes: DEFAULT_DISK_MAX_BYTES,
            disk_root: None,
        }
    }
}

impl CacheSettings {
    pub fn resolved_disk_root(&self) -> PathBuf {
        self.disk_root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("imagepipe")
        })
    }
}

/// Sample app toggles. Read from the config file, never written back.
///
/// Only `debug_info_visible` changes behaviour here. The search fields
/// configure the image search screen, which this app does not ship; they
/// are parsed and carried so one config file serves every front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleAppSettings {
    pub search_count: u32,
    pub search_webp: bool,
    pub use_placeholder: bool,
    pub debug_info_visible: bool,
}

impl Default for SampleAppSettings {
    fn default() -> Self {
        Self {
            search_count: 100,
            search_webp: false,
            use_placeholder: false,
            debug_info_visible: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub identifier: String,
    pub clear_memory_caches_on_background: bool,
    pub concurrency: ConcurrencyPolicy,
    pub cache: CacheSettings,
    pub app: SampleAppSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            identifier: DEFAULT_IDENTIFIER.to_string(),
            clear_memory_caches_on_background: true,
            concurrency: ConcurrencyPolicy::default(),
            cache: CacheSettings::default(),
            app: SampleAppSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::Invalid("identifier must not be empty".into()));
        }

        if self.identifier.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "identifier {:?} must not contain path separators",
                self.identifier
            )));
        }

        if self.concurrency.max_concurrent_downloads == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_downloads must be > 0".into(),
            ));
        }

        if self.concurrency.max_concurrent_decodes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_decodes must be > 0".into(),
            ));
        }

        if self.cache.memory_capacity == 0 || self.cache.data_capacity == 0 {
            return Err(ConfigError::Invalid("cache capacities must be > 0".into()));
        }

        Ok(())
    }
}
