//! Error types for the Modbus ASCII master
//!
//! One error enum covers transport, framing and protocol failures so that
//! callers can match on a single type across the whole request path.

use thiserror::Error;

use crate::constants::exception_description;

/// Result type for Modbus ASCII operations
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// Modbus ASCII master errors
#[derive(Debug, Error, Clone)]
pub enum ModbusError {
    /// Connection errors (port open failures, closed streams)
    #[error("Connection error: {0}")]
    Connection(String),

    /// IO errors from the underlying stream
    #[error("IO error: {0}")]
    Io(String),

    /// An operation did not complete within its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Framing errors: bad delimiters, checksum mismatch, aborted assembly
    #[error("Frame error: {0}")]
    Frame(String),

    /// Protocol violations in an otherwise well-formed frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Slave rejected the request with an exception response
    #[error("Exception code: {code}")]
    Exception { function: u8, code: u8 },

    /// Response carried a function code that matches neither the request
    /// nor its exception form
    #[error("Invalid function code: 0x{0:02X}")]
    InvalidFunction(u8),

    /// Request parameters outside protocol limits
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A request is already in flight on the bus
    #[error("Bus busy: a request is already in flight")]
    Busy,
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ModbusError {
    fn from(err: serde_yaml::Error) -> Self {
        ModbusError::Configuration(format!("YAML error: {err}"))
    }
}

// Helper methods for creating errors
impl ModbusError {
    pub fn connection(msg: impl Into<String>) -> Self {
        ModbusError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        ModbusError::Io(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        ModbusError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        ModbusError::Frame(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ModbusError::Protocol(msg.into())
    }

    pub fn exception(function: u8, code: u8) -> Self {
        ModbusError::Exception { function, code }
    }

    pub fn invalid_function(function: u8) -> Self {
        ModbusError::InvalidFunction(function)
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        ModbusError::InvalidData(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        ModbusError::Configuration(msg.into())
    }

    /// Human-readable description of the exception code, if this is an
    /// exception error
    pub fn exception_info(&self) -> Option<(u8, &'static str)> {
        match self {
            ModbusError::Exception { code, .. } => Some((*code, exception_description(*code))),
            _ => None,
        }
    }

    /// Check if this error indicates the bus never produced a frame in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModbusError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = ModbusError::timeout("Response", 500);
        assert_eq!(err.to_string(), "Response timed out after 500ms");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_exception_display_and_info() {
        let err = ModbusError::exception(0x03, 0x02);
        assert_eq!(err.to_string(), "Exception code: 2");
        assert_eq!(err.exception_info(), Some((0x02, "Illegal Data Address")));
    }

    #[test]
    fn test_frame_display() {
        let err = ModbusError::frame("Invalid checksum");
        assert!(err.to_string().contains("Invalid checksum"));
    }

    #[test]
    fn test_invalid_function_display() {
        let err = ModbusError::invalid_function(0x83);
        assert_eq!(err.to_string(), "Invalid function code: 0x83");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ModbusError = io_err.into();
        assert!(matches!(err, ModbusError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
