//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the level passed on the command line, e.g.
//! `RUST_LOG=kordiam_importer=debug`.

use chrono::{DateTime, Local};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the run log file for a given start time.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("kordiam_import_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Console subscriber, plus a file layer when the run log can be created.
///
/// The second value reports the log file, or why it could not be opened; the
/// subscriber logs to the console either way.
fn build_subscriber(
    level: &str,
    log_dir: Option<&Path>,
) -> (impl tracing::Subscriber + Send + Sync + 'static, std::io::Result<Option<PathBuf>>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    let opened = match log_dir {
        None => Ok(None),
        Some(dir) => {
            let path = dir.join(log_file_name(Local::now()));
            File::create(&path).map(|file| Some((path, file)))
        }
    };

    let (file_layer, log_file) = match opened {
        Ok(Some((path, file))) => {
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_writer(Arc::new(file));
            (Some(layer), Ok(Some(path)))
        }
        Ok(None) => (None, Ok(None)),
        Err(e) => (None, Err(e)),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer);
    (subscriber, log_file)
}

/// Initialise console logging, plus a run log file inside `log_dir` when given.
///
/// Console logging is installed even when the log file cannot be created;
/// the error is returned so the caller can report it.
pub fn init(level: &str, log_dir: Option<&Path>) -> std::io::Result<Option<PathBuf>> {
    let (subscriber, log_file) = build_subscriber(level, log_dir);
    subscriber.init();
    log_file
}

/// Verbose logging for tests; safe to call more than once.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
