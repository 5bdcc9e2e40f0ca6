//! Process-wide tracing setup for binaries embedding the relay.
//!
//! Library code only emits events; installing a subscriber is the host's call.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs a compact stderr subscriber filtered by `directives`.
///
/// Invalid directives are ignored and the default `warn` level applies.
/// Calling this twice is harmless: the second install is skipped.
pub fn init_tracing(directives: &str) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
