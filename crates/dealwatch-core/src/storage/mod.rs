mod config;
pub mod kv;
pub mod tracking;

pub use config::{EngineConfig, ProximityConfig, StorageConfig, VouchersConfig};
pub use kv::{KeyValueStore, SqliteStore};
pub use tracking::{TrackingStore, TrackingWriter, ACTIVE_VOUCHERS_KEY};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/dealwatch[-dev]/` based on DEALWATCH_ENV.
///
/// Set DEALWATCH_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DEALWATCH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("dealwatch-dev")
    } else {
        base_dir.join("dealwatch")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
