//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit level passed by the caller (if any)
//! 2. `WARDEN_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! ANSI colors are always off since daemonized output goes to a file.

use tracing::Level;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup; a second call panics (we only call once
/// in main).
pub fn init_logging(level: Option<Level>) {
    let level = level
        .or_else(|| {
            std::env::var("WARDEN_LOG")
                .ok()
                .and_then(|s| parse_level_str(&s))
        })
        .unwrap_or(Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
