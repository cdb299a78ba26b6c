//! Logging setup helpers
//!
//! The library only emits `tracing` events and never installs a subscriber
//! on its own; binaries call [`init_logging`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::error::{ModbusError, ModbusResult};

/// Initialize console logging at the given default level
///
/// `RUST_LOG` takes precedence when set. Fails if a global subscriber is
/// already installed.
pub fn init_logging(level: &str) -> ModbusResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| ModbusError::configuration(format!("Invalid log level: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ModbusError::configuration(format!("Failed to initialize logging: {e}")))?;

    Ok(())
}

/// Initialize logging for tests; safe to call more than once
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
