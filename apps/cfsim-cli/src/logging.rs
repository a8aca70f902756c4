//! Logging initialization and log file management.
//!
//! Provides dual-output tracing: stderr (human-readable) and a JSON log file
//! at `.cfsim/logs/<command>/<timestamp>.log`. File logging is enabled for
//! commands that talk to the gateway (run, batch, commit).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber with stderr output.
///
/// When `command` is `Some`, an additional JSON file layer writes to
/// `.cfsim/logs/<command>/<timestamp>.log` under `work_dir`.
///
/// The returned [`WorkerGuard`] must be held for the lifetime of the program
/// so buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(work_dir: &Path, command: Option<&str>) -> Result<Option<WorkerGuard>> {
    let Some(command) = command else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter())
            .init();
        return Ok(None);
    };

    let (writer, guard) = open_log_writer(work_dir, command)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter()),
        )
        .init();
    Ok(Some(guard))
}

/// Create the log directory and file, returning a non-blocking writer.
fn open_log_writer(work_dir: &Path, command: &str) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(work_dir, command);
    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// `.cfsim/logs/<command>/<YYYYMMDD_HHMMSS>.log`, local time.
fn build_log_path(work_dir: &Path, command: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    logs_dir(work_dir)
        .join(command)
        .join(format!("{timestamp}.log"))
}

fn logs_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(".cfsim").join("logs")
}

/// Remove log files older than 3 days and any empty directories left behind.
///
/// Best effort: failures are reported with `eprintln!` since tracing is not
/// initialized yet.
pub fn cleanup_old_logs(work_dir: &Path) {
    let logs_dir = logs_dir(work_dir);
    if !logs_dir.is_dir() {
        return;
    }

    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(&logs_dir, cutoff);
    remove_empty_dirs(&logs_dir);
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: failed to read log directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("warning: failed to read metadata for {}: {e}", path.display());
                continue;
            }
        };
        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!("warning: failed to remove old log file {}: {e}", path.display());
        }
    }
}

/// Remove empty subdirectories under `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails when not empty.
            let _ = fs::remove_dir(&path);
        }
    }
}
