//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::core::config::LoggingConfig;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured filter.
///
/// Returns `Ok(false)` when a global subscriber was already installed, so callers
/// (tests, embedding hosts) can call this more than once.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    Ok(tracing::subscriber::set_global_default(subscriber).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        let _first = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn test_bad_filter_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig { filter: "secure_keyring=loud".to_string() };
        assert!(init_logging(&config).is_err());
    }
}
