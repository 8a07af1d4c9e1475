//! Logging initialization.

use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::models::LoggingConfig;

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("foreman={}", config.level)));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
