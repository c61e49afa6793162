use tracing_subscriber::{fmt, EnvFilter};

/// Env var holding the log filter, e.g. `ui_bridge=debug`. `RUST_LOG` is used
/// when it is unset.
pub const LOG_ENV: &str = "UI_BRIDGE_LOG";

/// Install a fmt subscriber for the process. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
