//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Map the manager's log level onto per-crate filter directives
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Initialization is fallible rather than panicking, so embedding
//!   applications that already installed a subscriber keep theirs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter};

use crate::config::LogLevel;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: LogLevel) -> String {
    let directive = level.as_directive();
    format!("pluggable_server={directive},tower_http={directive}")
}

/// Install the global subscriber.
pub fn init(level: LogLevel) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_crate_and_http_layers() {
        assert_eq!(
            default_filter(LogLevel::Warn),
            "pluggable_server=warn,tower_http=warn"
        );
        assert_eq!(
            default_filter(LogLevel::Debug),
            "pluggable_server=debug,tower_http=debug"
        );
    }
}
