//! `tracing` initialization, ambient plumbing rather than a configuration
//! surface: CLI flag parsing for verbosity is out of scope (`spec.md` §1),
//! but every other component assumes `tracing` is already wired up.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The desired shape of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, compact, colorized when attached to a terminal.
    #[default]
    Human,
    /// Newline-delimited JSON, suitable for the machine-readable error log
    /// referenced in `spec.md` §6.
    Json,
}

/// Install a global `tracing` subscriber.
///
/// The filter defaults to `info` for the crate family and respects
/// `RUST_LOG` if set, matching `uv-logging`'s own default-then-env-override
/// behavior.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fromager=debug"));

    let fmt_layer = match format {
        LogFormat::Human => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter)
            .boxed(),
    };

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}
