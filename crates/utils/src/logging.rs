//! provides logging helpers

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// When set, logs go to a daily rolling file under this directory instead of stderr.
pub const LOG_PATH_ENV_VAR: &str = "SRIOV_DRA_LOG_PATH";

const LOG_FILE_PREFIX: &str = "sriov-dra.log";

/// initiate the global tracing subscriber
///
/// The returned guard flushes buffered log lines on drop and must be kept
/// alive for the lifetime of the process.
pub fn init() -> WorkerGuard {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let (writer, guard) = match env::var(LOG_PATH_ENV_VAR) {
        Ok(dir) if !dir.is_empty() => match rolling_appender(Path::new(&dir)) {
            Ok(appender) => tracing_appender::non_blocking(appender),
            Err(err) => {
                eprintln!("failed to create rolling log file at {dir}: {err}; falling back to stderr");
                tracing_appender::non_blocking(std::io::stderr())
            }
        },
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    let fmt_layer = layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    registry().with(fmt_layer).init();
    guard
}

fn rolling_appender(
    dir: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(3)
        .build(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_appender_creates_files_in_directory() {
        let dir = tempfile::tempdir().expect("should create log dir");

        let appender = rolling_appender(dir.path());
        assert!(appender.is_ok(), "appender should build for existing dir");
    }
}
