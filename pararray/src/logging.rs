//! Tracing subscriber setup for binaries.
//!
//! The library only emits `tracing` events; applications decide where they
//! go. [`init_logging`] is the default wiring used by `pararray-demo`.

use std::path::{Path, PathBuf};

use pararray_shared::errors::{PipelineError, PipelineResult};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Where and how much to log.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directives; falls back to `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    /// Write to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Keeps the background log writer alive. Drop it last.
#[must_use]
pub struct LoggingGuard {
    _writer: Option<WorkerGuard>,
}

/// Install a global subscriber.
///
/// # Errors
///
/// - `Config` if the filter directives are invalid or a subscriber is
///   already installed
/// - `Io` if the log file's directory cannot be created
pub fn init_logging(options: &LogOptions) -> PipelineResult<LoggingGuard> {
    let filter = env_filter(options.filter.as_deref())?;

    match &options.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .map_err(already_initialized)?;
            Ok(LoggingGuard {
                _writer: Some(guard),
            })
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .map_err(already_initialized)?;
            Ok(LoggingGuard { _writer: None })
        }
    }
}

fn already_initialized(err: TryInitError) -> PipelineError {
    PipelineError::Config(format!("logging already initialized: {}", err))
}

fn env_filter(directives: Option<&str>) -> PipelineResult<EnvFilter> {
    let Some(directives) = directives else {
        let from_env = EnvFilter::try_from_default_env();
        return Ok(from_env.unwrap_or_else(|_| EnvFilter::new("info")));
    };
    EnvFilter::try_new(directives)
        .map_err(|e| PipelineError::Config(format!("invalid log filter '{directives}': {e}")))
}

/// Non-blocking writer appending to `path`, creating its directory.
fn file_writer(path: &Path) -> PipelineResult<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(file_name) = path.file_name() else {
        let message = format!("log path has no file name: {}", path.display());
        return Err(PipelineError::Config(message));
    };
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
