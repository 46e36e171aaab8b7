//! Logging setup shared by the mfs crates.
//!
//! Logging is opt-in and configured through the environment:
//! - `MFS_LOG=off` (default) - no logs
//! - `MFS_LOG=info` - publishes, commits, command outcomes
//! - `MFS_LOG=debug` - per-node loads, stale commits, debounce timing
//!
//! Library code only uses the macros below; nothing in the core requires
//! `init_diagnostics` to have been called. Without a runtime installed the
//! macros are no-ops.

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable selecting the log level.
pub const LOG_ENV: &str = "MFS_LOG";

static INIT: Once = Once::new();

/// Minimum level parsed from the `MFS_LOG` value; `None` means logging is off.
fn parse_level(value: &str) -> Option<Option<emit::Level>> {
    match value {
        "off" => Some(None),
        "debug" => Some(Some(emit::Level::Debug)),
        "info" => Some(Some(emit::Level::Info)),
        "warn" => Some(Some(emit::Level::Warn)),
        "error" => Some(Some(emit::Level::Error)),
        _ => None,
    }
}

/// Initialize diagnostics based on the `MFS_LOG` environment variable.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let level = match parse_level(&log_level) {
            Some(None) => return,
            Some(Some(level)) => level,
            None => {
                // Bootstrap warning, the emitter is not set up yet
                eprintln!("Warning: Unknown {} value '{}', using 'info'", LOG_ENV, log_level);
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the whole process
        std::mem::forget(rt);
    });
}

/// Log basic operations (publishes, commits, command outcomes)
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (node loads, debounce timer decisions)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable problems (failed publishes that will be retried)
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that abort an operation
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;
