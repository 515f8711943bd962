//! Logging helpers
//!
//! Thin wrapper around `env_logger` so the binary and tests initialise
//! logging the same way.

/// Initialise the logger
///
/// `RUST_LOG` wins over `level` when it is set. Calling this more than once
/// is harmless; later calls are ignored.
///
/// # Parameters
///
/// * `level` - Fallback log filter (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
