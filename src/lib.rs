//! TickRoute Market Data Session Client Library
//!
//! A correlation-keyed event routing core for clients of long-lived market
//! data sessions, with a simulated feed endpoint, a subscriber application
//! layer, and the configuration around them.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod feed;
pub mod session;

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

/// Application result type for consistent error handling
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize tracing subscriber for logging
///
/// When `log_file` is set, a non-blocking file layer is added; the returned
/// guard must stay alive for buffered log lines to be flushed.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tickroute={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer());

    match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "tickroute.log".into());

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();

            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
