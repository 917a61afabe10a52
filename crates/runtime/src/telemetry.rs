//! Tracing subscriber setup for binaries and tests.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::api::{Result, RuntimeError};

/// `RUST_LOG` when set, `default_directive` otherwise.
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Logs to stderr.
///
/// Fails instead of panicking when a global subscriber is already installed,
/// so tests may call it repeatedly.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(RuntimeError::Tracing)
}

/// Logs to `dir/file_name` through a background writer.
///
/// The returned guard flushes the writer on drop; keep it alive for as long
/// as logs should be written.
pub fn init_file_tracing(dir: &Path, file_name: &str, default_directive: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir).map_err(RuntimeError::LogDirectory)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(RuntimeError::Tracing)?;

    tracing::info!(target: "runtime", log = %dir.join(file_name).display(), "file logging initialized");
    Ok(guard)
}
