//! Subscriber setup for the `barreplay` binary.
//!
//! Library code only emits `tracing` events; the binary installs a
//! stderr `fmt` subscriber once, filtered by `RUST_LOG` when set and by the
//! `[log] level` setting otherwise.

use tracing_subscriber::EnvFilter;

use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub include_target: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            include_target: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = Self::default();
        Self {
            level: config
                .get_string("log", "level")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.level),
            include_target: config.get_bool("log", "target", defaults.include_target),
            ansi: config.get_bool("log", "ansi", defaults.ansi),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// `RUST_LOG` wins over the configured level.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_ansi(config.ansi)
        .try_init()
}
