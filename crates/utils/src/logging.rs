//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Environment variable holding an optional log file path.
pub const LOG_PATH_ENV_VAR: &str = "TOPO_SCHEDULER_LOG_PATH";

const DEFAULT_LOG_FILE: &str = "topo-scheduler.log";

/// initiate the global tracing subscriber
///
/// Logs always go to stderr. When `log_path` is set, they are also written to a
/// daily rolling file next to it; keep the returned guard alive for the lifetime
/// of the process so buffered lines get flushed.
pub fn init(log_path: Option<String>) -> Option<WorkerGuard> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let stderr_layer = layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match log_path.as_deref().and_then(rolling_appender) {
        Some(appender) => {
            let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
            let file_layer = layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true);
            (Some(file_layer), Some(file_guard))
        }
        None => (None, None),
    };

    registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

fn rolling_appender(log_path: &str) -> Option<RollingFileAppender> {
    let path = Path::new(log_path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);

    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("failed to create rolling file appender at {log_path}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_appender_in_temp_dir() {
        let dir = std::env::temp_dir().join("topo-scheduler-logging-test");
        std::fs::create_dir_all(&dir).expect("should create temp dir");
        let path = dir.join("scheduler.log");

        assert!(rolling_appender(path.to_str().expect("utf8 path")).is_some());
    }
}
