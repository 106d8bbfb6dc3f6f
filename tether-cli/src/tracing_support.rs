//! Tracing and logging support.
//!
//! Log output goes to stderr so that reports on stdout stay machine
//! readable. `RUST_LOG` overrides the level chosen on the command line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TracingFormat {
    /// Human-readable multi-line format.
    Pretty,

    /// Single-line format (default).
    #[default]
    Compact,

    /// JSON lines.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// Used when RUST_LOG is not set.
    pub level: tracing::Level,

    /// Output format.
    pub format: TracingFormat,

    /// Include target module names in output.
    pub target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::WARN,
            format: TracingFormat::Compact,
            target: false,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Install the global subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init_subscriber(config: &TracingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target);

    match config.format {
        TracingFormat::Pretty => registry.with(layer.pretty()).try_init(),
        TracingFormat::Compact => registry.with(layer.compact()).try_init(),
        TracingFormat::Json => registry.with(layer.json()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.level, tracing::Level::WARN);
        assert!(!config.target);
    }
}
