//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Initialize tracing from the logging configuration
///
/// Uses `logging.level` as the filter directive (falling back to `info` when
/// it does not parse) and JSON lines when `logging.json` is set. Calling it
/// again after a subscriber is installed is a no-op.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    };

    match installed {
        Ok(()) => tracing::debug!(level = %config.logging.level, json = config.logging.json, "Tracing initialized"),
        Err(_) => tracing::debug!("Tracing subscriber already installed"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let mut config = Config::default();
        config.logging.level = "not a [valid directive".to_string();
        assert!(init_tracing(&config).is_ok());

        config.logging.json = true;
        assert!(init_tracing(&config).is_ok());
    }
}
