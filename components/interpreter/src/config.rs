//! Runtime configuration.
//!
//! Every field has a default, so a configuration file only needs to name
//! the settings it changes.

use std::path::Path;

use core_types::{ErrorKind, VmError, VmResult};
use serde::{Deserialize, Serialize};

/// Tunables of a [`Runtime`](crate::Runtime).
///
/// # Example
///
/// ```
/// use interpreter::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "cache_enabled": false }"#).unwrap();
/// assert!(!config.cache_enabled);
/// assert_eq!(config.max_frame_depth, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bytes per semispace
    pub heap_size: usize,
    /// Whether new functions get their bytecode rewritten to use inline caches
    pub cache_enabled: bool,
    /// Frames allowed on the call stack before RecursionError
    pub max_frame_depth: usize,
    /// Seed of the str and bytes hash secret
    pub hash_seed: u64,
    /// In-object attribute slots of instances of program-defined types
    pub instance_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            heap_size: 4 * 1024 * 1024,
            cache_enabled: true,
            max_frame_depth: 1000,
            hash_seed: 0,
            instance_capacity: 8,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> VmResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| VmError::value_error(format!("invalid runtime configuration: {}", e)))
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> VmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VmError::new(
                ErrorKind::ImportError,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&text)
    }
}
