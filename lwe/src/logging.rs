use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr and append to `log_file`.
///
/// File output goes through a single writer thread, so lines from the
/// retry monitor and the main flow never interleave. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init(log_file: &Path) -> Option<WorkerGuard> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let (Some(dir), Some(name)) = (log_file.parent(), log_file.file_name()) else {
        tracing_subscriber::registry().with(stderr).init();
        return None;
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing_subscriber::registry().with(stderr).init();
        tracing::warn!("Logging to stderr only, cannot create {}: {}", dir.display(), e);
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(env_filter());

    tracing_subscriber::registry().with(stderr).with(file).init();
    Some(guard)
}
