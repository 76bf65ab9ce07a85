//! TOML-based engine configuration.
//!
//! Stores tuning for the two pollers:
//! - Proximity: tick period, movement gate, cool-down, tier radii
//! - Vouchers: tick period, maximum tracking duration
//! - Storage: database file name under the data directory
//!
//! Configuration is stored at `~/.config/dealwatch/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::collaborators::{LocationAccuracy, Tier};
use crate::error::ConfigError;

/// Proximity poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_proximity_interval")]
    pub interval_secs: u64,
    /// Minimum displacement between samples before matching runs again.
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold_m: f64,
    /// Minimum time before the same promotion may notify again.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_basic_radius")]
    pub basic_radius_km: f64,
    #[serde(default = "default_pro_radius")]
    pub pro_radius_km: f64,
    #[serde(default)]
    pub accuracy: LocationAccuracy,
}

/// Voucher status poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VouchersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_voucher_interval")]
    pub interval_secs: u64,
    /// Claims older than this are dropped without notifying.
    #[serde(default = "default_max_tracking")]
    pub max_tracking_secs: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file name, relative to the data directory.
    #[serde(default = "default_database")]
    pub database: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/dealwatch/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub vouchers: VouchersConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Upper bound for every `*_secs` setting (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

fn default_true() -> bool {
    true
}
fn default_proximity_interval() -> u64 {
    60
}
fn default_movement_threshold() -> f64 {
    100.0
}
fn default_cooldown() -> u64 {
    60 * 60
}
fn default_basic_radius() -> f64 {
    1.0
}
fn default_pro_radius() -> f64 {
    3.0
}
fn default_voucher_interval() -> u64 {
    3
}
fn default_max_tracking() -> u64 {
    5 * 60
}
fn default_database() -> String {
    "dealwatch.db".into()
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_proximity_interval(),
            movement_threshold_m: default_movement_threshold(),
            cooldown_secs: default_cooldown(),
            basic_radius_km: default_basic_radius(),
            pro_radius_km: default_pro_radius(),
            accuracy: LocationAccuracy::default(),
        }
    }
}

impl Default for VouchersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_voucher_interval(),
            max_tracking_secs: default_max_tracking(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

fn bounded_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn check_secs(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {MAX_DURATION_SECS} seconds"),
        });
    }
    Ok(())
}

fn check_non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a finite, non-negative number, got {value}"),
        });
    }
    Ok(())
}

impl ProximityConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(1, MAX_DURATION_SECS))
    }

    pub fn cooldown(&self) -> chrono::Duration {
        bounded_seconds(self.cooldown_secs)
    }

    /// Matching radius for a subscription tier.
    pub fn radius_km(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Basic => self.basic_radius_km,
            Tier::Pro => self.pro_radius_km,
        }
    }
}

impl VouchersConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(1, MAX_DURATION_SECS))
    }

    pub fn max_tracking(&self) -> chrono::Duration {
        bounded_seconds(self.max_tracking_secs)
    }
}

impl EngineConfig {
    /// Reject values the engine cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.proximity;
        check_secs("proximity.interval_secs", p.interval_secs)?;
        check_secs("proximity.cooldown_secs", p.cooldown_secs)?;
        check_non_negative("proximity.movement_threshold_m", p.movement_threshold_m)?;
        check_non_negative("proximity.basic_radius_km", p.basic_radius_km)?;
        check_non_negative("proximity.pro_radius_km", p.pro_radius_km)?;
        check_secs("vouchers.interval_secs", self.vouchers.interval_secs)?;
        check_secs("vouchers.max_tracking_secs", self.vouchers.max_tracking_secs)?;
        Ok(())
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a scalar setting".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Self = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::ParseFailed(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the value does not fit the setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Absolute path of the tracking database.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join(&self.storage.database))
    }
}
