//! Logging initialization.
//!
//! Console output always; an optional daily-rotated file appender when a log
//! directory is configured. The returned guard must be held for the lifetime
//! of the process so buffered file output is flushed on shutdown.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "stepdoc=info,sqlx=warn,tower_http=info";

/// Initialize the tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise [`DEFAULT_LOG_FILTER`].
/// When `log_dir` is provided, a non-ANSI daily rolling file layer is added
/// alongside the console layer.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console = tracing_subscriber::fmt::layer();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "stepdoc.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}
