//! Log sink construction.
//!
//! Nothing here installs a global subscriber. Binaries build a [`Dispatch`]
//! and hand it to the store and engine, which scope it around their work.

use std::{io, path::Path};

use thiserror::Error;
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(Debug, Error)]
#[error("cannot open log file {path}: {reason}")]
pub struct LoggingError {
    pub path: String,
    pub reason: String,
}

/// Log to `log_file` (plain text, appended) and to stdout.
///
/// Level comes from `RUST_LOG`, defaulting to `info`.
pub fn file_dispatch(log_file: &Path) -> Result<Dispatch, LoggingError> {
    let error = |reason: String| LoggingError { path: log_file.display().to_string(), reason };

    let file_name = log_file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| error("log file needs a UTF-8 file name".into()))?;
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| error(e.to_string()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| error(e.to_string()))?;

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_ansi(false).with_writer(file_appender))
        .with(fmt::layer().with_writer(io::stdout));

    Ok(Dispatch::new(subscriber))
}
