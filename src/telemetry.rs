use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Filter from `UMI_LOG`, then `RUST_LOG`, then `info`.
/// Output goes to stderr. Safe to call more than once.
pub fn init_tracing() {
    let filter = std::env::var("UMI_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(target = "ustudio_llm", "tracing initialized");
    }
}
