// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.
//!
//! Diagnostics go to stderr so stdout stays free for the merged table. A
//! JSON log file per day can be kept alongside.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "qore-foreach.log";
const LOG_RETENTION_DAYS: u64 = 14;
const DEFAULT_FILTER: &str = "qore_foreach=info";

/// Sets up the global subscriber. Keep the returned guard alive until exit
/// so buffered file logs are flushed.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir.map(prepare_log_dir) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Log directory unavailable, logging to stderr only: {e}");
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    install_panic_hook();
    guard
}

fn prepare_log_dir(dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    if let Err(e) = cleanup_old_logs(dir, LOG_RETENTION_DAYS) {
        eprintln!("Failed to clean up old logs: {e}");
    }
    Ok(dir.to_path_buf())
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {s}")
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {s}")
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Application panicked");
        previous_hook(panic_info);
    }));
}

/// Removes `*.log*` files under `log_dir` older than `retention_days`.
fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {}: {e}", path.display()),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_keeps_recent_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("qore-foreach.log.2026-10-15"), "{}").expect("write log");
        fs::write(dir.path().join("notes.txt"), "keep").expect("write other");

        let removed = cleanup_old_logs(dir.path(), 14).expect("cleanup");
        assert_eq!(removed, 0);
        assert!(dir.path().join("qore-foreach.log.2026-10-15").exists());

        let removed = cleanup_old_logs(dir.path(), 0).expect("cleanup");
        assert!(removed <= 1);
        assert!(dir.path().join("notes.txt").exists());
    }
}
