/// Logging setup: stderr plus one log file per run.
///
/// `RUST_LOG` wins over the configured level. The returned [`LogGuard`]
/// must stay alive for the file writer to flush.
use chrono::{DateTime, Local};
use rand::Rng;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

use crate::schema::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the file writer alive; drop it last.
#[derive(Debug)]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
    path: Option<PathBuf>,
}

impl LogGuard {
    /// The per-run log file, when one was opened.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// `conv_<timestamp>_<suffix>.log`
pub fn log_file_name(now: DateTime<Local>, suffix: u32) -> String {
    format!("conv_{}_{:04}.log", now.format("%Y%m%d_%H%M%S"), suffix)
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(&config.level));

    let (file_layer, worker, path) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(log_file_name(
                Local::now(),
                rand::thread_rng().gen_range(0..10_000),
            ));
            let file = File::create(&path)?;
            let (writer, worker) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter(&config.level));
            (Some(layer), Some(worker), Some(path))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard {
        _worker: worker,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(log_file_name(now, 42), "conv_20240309_140507_0042.log");
    }

    #[test]
    fn bad_level_falls_back() {
        // Must not panic on an unparsable directive.
        let _ = env_filter("not a [valid filter");
    }
}
