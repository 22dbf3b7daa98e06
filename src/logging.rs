//! Tracing subscriber setup for the `summ` binary.
//!
//! Logs go to stderr so stdout carries only command output. `RUST_LOG`
//! overrides the verbosity flag when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter for a `-v` count.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,summary_harness=info",
        1 => "info,summary_harness=debug",
        _ => "debug,summary_harness=trace",
    }
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_tracing(verbosity: u8, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(verbosity, json, "tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_verbosity() {
        assert_eq!(default_filter(0), "warn,summary_harness=info");
        assert!(default_filter(1).contains("summary_harness=debug"));
        assert_eq!(default_filter(2), default_filter(7));
    }

    #[test]
    fn test_init_twice() {
        init_tracing(0, false);
        init_tracing(1, true);
    }
}
