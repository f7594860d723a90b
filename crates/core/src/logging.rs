//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVES: &str = "info,vkpbr_rhi=debug,vkpbr_renderer=debug";

/// Initialize tracing with `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVES`].
///
/// # Example
/// ```no_run
/// vkpbr_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_DIRECTIVES);
}

/// Initialize tracing with `RUST_LOG`, falling back to `directives`.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging_with(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
