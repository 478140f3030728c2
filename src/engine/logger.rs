//! Structured logging
//!
//! Console output always goes to stderr so it does not fight the progress
//! bar's redraws. A daily rolling file in text or JSON format is optional.
//! `log` records from dependencies are bridged into the same subscriber.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::engine::config_loader::Logging;

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log filter \"{filter}\": {reason}")]
    Filter { filter: String, reason: String },

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

pub const LOG_FILE_PREFIX: &str = "gelbooru_downloader.log";

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn build_filter(level: &str) -> LoggerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggerError::Filter {
            filter: level.to_string(),
            reason: e.to_string(),
        })
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so hold it for
/// the life of the program.
pub fn init_logger(config: &Logging) -> LoggerResult<Option<WorkerGuard>> {
    let filter = build_filter(&config.log_level)?;
    let json = config.log_format == "json";

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    let (file, guard) = if config.log_to_file {
        let log_dir = Path::new(&config.log_directory);
        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir)?;
        }
        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = if json {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = %config.log_format,
        log_level = %config.log_level,
        log_to_file = config.log_to_file,
        "Logger initialized"
    );

    Ok(guard)
}
