//! Tracing setup shared by the three binaries, grounded in the teacher's
//! `plugins::logging` EnvFilter + non-blocking writer pattern, adapted from
//! a rolling log file to stderr since these are headless daemons rather
//! than a desktop app with a user-visible log directory.

use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes the global tracing subscriber. Verbosity is controlled by
/// `RUST_LOG` (defaults to `info`). Safe to call once per process; later
/// calls are no-ops.
pub fn init(process_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = GUARD.set(guard);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .try_init();

    tracing::info!(process = process_name, version = env!("CARGO_PKG_VERSION"), "starting");
}
