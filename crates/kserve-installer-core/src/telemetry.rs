//! Tracing initialisation for installer binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! (the global subscriber can only be set once per process).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON for log aggregation pipelines.
    Json,
}

/// Filter used when `RUST_LOG` is unset: `level` for everything, with the
/// HTTP stack held at `warn` so per-request chatter stays out of the logs.
pub fn default_filter(level: Level) -> String {
    format!("{},hyper=warn,hyper_util=warn,tower=warn,rustls=warn", level.as_str().to_lowercase())
}

/// Initialise the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to [`default_filter`] for `level`.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).json())
            .try_init()
            .ok(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_http_stack() {
        let filter = default_filter(Level::DEBUG);
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("hyper=warn"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(LogFormat::Text, Level::INFO);
        init_tracing(LogFormat::Json, Level::DEBUG);
    }
}
