use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Filters come from `RUST_LOG`,
/// defaulting to `info`. Later calls are ignored.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
