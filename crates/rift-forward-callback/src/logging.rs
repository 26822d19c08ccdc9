//! Tracing subscriber setup for embedding binaries.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info"` or `"rift_forward_callback=debug"`).
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = filter_for(std::env::var("RUST_LOG").ok(), default_filter);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Invalid `RUST_LOG` directives fall back to the default as well.
fn filter_for(directives: Option<String>, default_filter: &str) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter))
}
