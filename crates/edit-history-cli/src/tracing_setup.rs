/// Installs a `tracing-subscriber` filter driven by `RUST_LOG`, raised to a
/// verbose default when `--verbose` was passed or `MCP_DEBUG=1` is set —
/// the same environment-variable-driven filter convention the rest of the
/// workspace's ambient stack uses.
pub fn setup_logging(verbose: bool) {
    let default_directive = if verbose || edit_history_engine::EngineConfig::debug_enabled() {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
