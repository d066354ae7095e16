//! Logging setup
//!
//! The library only emits `tracing` events; binaries call [`init_logging`]
//! once to install a subscriber.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{RelayError, Result};

/// Install the global `fmt` subscriber
///
/// `RUST_LOG` wins over `config.level`. Events go to `config.output` when
/// set (appended, no ANSI colours), stderr otherwise.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| RelayError::Config(format!("log level '{}': {}", config.level, e)))?,
    };

    let (writer, ansi) = match &config.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| RelayError::Config(format!("log file {}: {}", path.display(), e)))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init()
        .map_err(|e| RelayError::Config(format!("install logger: {}", e)))
}
