//! Logging infrastructure for asio-host

use std::fs::File;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};
use crate::error::LoggingError;

/// Map a configured level onto a tracing level
fn to_level(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Install the global subscriber described by `config`.
///
/// Console output always goes to stderr; `log_to_file` adds a plain-text
/// copy. Fails if the log file cannot be created or a subscriber is
/// already installed. `RUST_LOG` directives refine the configured level.
pub fn init(config: &Config) -> Result<(), LoggingError> {
    let Some(level) = to_level(config.debug.log_level) else {
        return Ok(());
    };

    let file_layer = if config.debug.log_to_file {
        let path = &config.debug.log_path;
        let file = File::create(path).map_err(|source| LoggingError::LogFile {
            path: path.clone(),
            source,
        })?;
        Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Console-only logging at info, for tests and quick starts.
///
/// Does nothing if a subscriber is already installed.
pub fn init_default() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

// Component-specific logging. The realtime path never logs; these are for
// the control thread.

/// Log a registry debug message
#[macro_export]
macro_rules! registry_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "registry", $($arg)*)
    };
}

/// Log a registry warning
#[macro_export]
macro_rules! registry_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "registry", $($arg)*)
    };
}

/// Log a driver trace message (one per foreign call)
#[macro_export]
macro_rules! driver_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "driver", $($arg)*)
    };
}

/// Log a driver debug message
#[macro_export]
macro_rules! driver_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "driver", $($arg)*)
    };
}

/// Log a session state change
#[macro_export]
macro_rules! session_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "session", $($arg)*)
    };
}

/// Log a session debug message
#[macro_export]
macro_rules! session_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "session", $($arg)*)
    };
}

/// Log an event queued by the realtime path, from the control thread
#[macro_export]
macro_rules! realtime_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "realtime", $($arg)*)
    };
}
