//! Tracing subscriber setup.
//!
//! The configured `[logging].level` is the default directive; `RUST_LOG`
//! overrides it when set.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "off" | "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_log_level(&config.level).into())
        .from_env_lossy();

    // A subscriber may already be installed (tests, embedding binaries).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
