use std::fs;
use std::path::Path;

use anyhow::Context;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub const LOG_FILE_NAME: &str = "villaops.log";
const MAX_LOG_BYTES: usize = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

/// Install the subscriber: JSON to stderr plus a size-rotated JSON file.
///
/// The returned guard flushes the file writer on drop and must be kept
/// alive for the lifetime of the process.
pub fn init(config: &Config) -> anyhow::Result<WorkerGuard> {
    let _ = tracing_log::LogTracer::init();

    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("create log directory {}", config.log_dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(rotating_writer(&config.log_dir));

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("parse log filter {:?}", config.log_filter))?;

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(file_writer);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    tracing::debug!(target: "villaops", event = "logging_ready", dir = %config.log_dir.display());
    Ok(guard)
}

fn rotating_writer(dir: &Path) -> FileRotate<AppendCount> {
    FileRotate::new(
        dir.join(LOG_FILE_NAME),
        AppendCount::new(MAX_LOG_FILES),
        ContentLimit::BytesSurpassed(MAX_LOG_BYTES),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotating_writer_creates_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = rotating_writer(dir.path());
        writer.write_all(b"{\"event\":\"smoke\"}\n").expect("write");
        writer.flush().expect("flush");
        let contents = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).expect("read log");
        assert!(contents.contains("smoke"));
    }
}
