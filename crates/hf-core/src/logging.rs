use tracing_subscriber::{fmt, EnvFilter};

/// Bootstrap tracing for a binary or test process.
///
/// `RUST_LOG` takes precedence when set; otherwise `default_level` is the
/// filter directive (e.g. "info" or "hf_session=debug,warn"). Repeated
/// calls are no-ops, so tests may call this freely.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised");
}
