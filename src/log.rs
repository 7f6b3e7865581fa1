use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Global flag to control per-buffer stream debug logging
pub static STREAM_DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set stream debug logging on/off
pub fn set_stream_debug(enabled: bool) {
    STREAM_DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    info!(
        "🔧 Stream debug logging {}",
        if enabled { "ENABLED" } else { "DISABLED" }
    );
}

/// Check if stream debug logging is enabled
pub fn is_stream_debug_enabled() -> bool {
    STREAM_DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Stream debug macro - only logs if stream debug is enabled.
/// Meant for hot paths (per refill, per read) that are too noisy for `debug!`.
#[macro_export]
macro_rules! stream_debug {
    ($($arg:tt)*) => {
        if $crate::log::STREAM_DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}
