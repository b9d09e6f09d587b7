//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when a file is configured, to a non-blocking file
//! writer. The filter defaults to [`DEFAULT_FILTER`] and is overridden by
//! `RUST_LOG`.

use std::path::Path;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "starchart=info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Keeps the file writer flushing; drop it at shutdown.
#[must_use = "dropping the guard stops the file writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset; `None` uses
/// [`DEFAULT_FILTER`].
pub fn init_logging(
    log_file: Option<&Path>,
    default_filter: Option<&str>,
) -> Result<LoggingGuard, LoggingError> {
    let directive = default_filter.unwrap_or(DEFAULT_FILTER);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
            std::fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDir {
                path: directory.display().to_string(),
                source,
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::new(Rfc3339));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter(directive))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_rejects_path_without_file_name() {
        let result = init_logging(Some(Path::new("/")), None);
        assert!(matches!(result, Err(LoggingError::InvalidPath(_))));
    }
}
