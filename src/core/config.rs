use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::errors::SignerError;

/// Hardware signing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Attempts made to open the device transport before giving up
    #[serde(default = "HardwareConfig::default_open_attempts")]
    pub open_attempts: u32,

    /// Initial backoff between transport-open attempts (milliseconds)
    #[serde(default = "HardwareConfig::default_open_backoff_ms")]
    pub open_backoff_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "HardwareConfig::default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Delay before re-issuing a device call that waits on the user (milliseconds)
    #[serde(default = "HardwareConfig::default_device_poll_interval_ms")]
    pub device_poll_interval_ms: u64,
}

impl HardwareConfig {
    fn default_open_attempts() -> u32 { 3 }
    fn default_open_backoff_ms() -> u64 { 250 }
    fn default_max_backoff_ms() -> u64 { 2_000 }
    fn default_device_poll_interval_ms() -> u64 { 1_000 }

    /// Backoff before retry number `attempt` (0-based), doubling up to the ceiling.
    pub fn open_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.open_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            open_attempts: Self::default_open_attempts(),
            open_backoff_ms: Self::default_open_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
            device_poll_interval_ms: Self::default_device_poll_interval_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
}

impl LoggingConfig {
    fn default_filter() -> String { "info".to_string() }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: Self::default_filter() }
    }
}

/// Signer配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub hardware: HardwareConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SignerConfig {
    /// Parse a TOML document; missing sections and fields fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, SignerError> {
        toml::from_str(content)
            .map_err(|e| SignerError::Internal(format!("invalid signer config: {}", e)))
    }

    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SignerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SignerError::Internal(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `SIGNER_LOG`, `SIGNER_LEDGER_OPEN_ATTEMPTS`, `SIGNER_LEDGER_POLL_INTERVAL_MS`.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(filter) = std::env::var("SIGNER_LOG") {
            self.logging.filter = filter;
        }
        if let Some(v) = env_number::<u32>("SIGNER_LEDGER_OPEN_ATTEMPTS") {
            self.hardware.open_attempts = v;
        }
        if let Some(v) = env_number::<u64>("SIGNER_LEDGER_POLL_INTERVAL_MS") {
            self.hardware.device_poll_interval_ms = v;
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric config override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = SignerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SignerConfig::default());
        assert_eq!(config.hardware.open_attempts, 3);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_section() {
        let config = SignerConfig::from_toml_str("[hardware]\nopen_attempts = 5\n").unwrap();
        assert_eq!(config.hardware.open_attempts, 5);
        assert_eq!(config.hardware.open_backoff_ms, 250);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let hw = HardwareConfig::default();
        assert_eq!(hw.open_backoff(0), Duration::from_millis(250));
        assert_eq!(hw.open_backoff(1), Duration::from_millis(500));
        assert_eq!(hw.open_backoff(2), Duration::from_millis(1_000));
        assert_eq!(hw.open_backoff(5), Duration::from_millis(2_000));
        assert_eq!(hw.open_backoff(80), Duration::from_millis(2_000));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(SignerConfig::from_toml_str("[hardware\n").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("SIGNER_LEDGER_OPEN_ATTEMPTS", "7");
        std::env::set_var("SIGNER_LEDGER_POLL_INTERVAL_MS", "not-a-number");
        std::env::set_var("SIGNER_LOG", "debug");

        let mut config = SignerConfig::default();
        config.apply_env_overrides();

        std::env::remove_var("SIGNER_LEDGER_OPEN_ATTEMPTS");
        std::env::remove_var("SIGNER_LEDGER_POLL_INTERVAL_MS");
        std::env::remove_var("SIGNER_LOG");

        assert_eq!(config.hardware.open_attempts, 7);
        assert_eq!(config.hardware.device_poll_interval_ms, 1_000);
        assert_eq!(config.logging.filter, "debug");
    }
}
