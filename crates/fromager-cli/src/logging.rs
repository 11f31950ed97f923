//! Tracing setup, matching `uv-logging`'s env-filter-plus-fmt-layer shape.
//! Logging configuration is explicitly out of scope for the core spec, but
//! the "machine-readable error log" and per-package build logs it requires
//! (`spec.md` §6, §4.14) still need a subscriber installed somewhere.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool, quiet: bool) {
    let default_directive = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE).with_target(false))
        .with(filter)
        .init();
}
