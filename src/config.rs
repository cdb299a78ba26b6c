//! Configuration for the ASCII master
//!
//! Serial line parameters default to the Modbus ASCII profile (9600 baud,
//! 7 data bits, even parity, one stop bit); everything can be overridden
//! from a YAML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RESPONSE_TIMEOUT_MS;
use crate::error::{ModbusError, ModbusResult};

/// Frame transfer mode on the serial bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// ASCII framing (':' start, hex payload, LRC, CRLF)
    Ascii,
    /// Binary RTU framing; recognized in config files but not implemented
    /// by this crate
    Rtu,
}

impl Default for TransferMode {
    fn default() -> Self {
        TransferMode::Ascii
    }
}

/// Serial line and protocol configuration for one ASCII master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsciiMasterConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Transfer mode; only `ascii` is supported
    #[serde(default)]
    pub mode: TransferMode,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits per character
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Parity ("even", "odd" or "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Idle deadline for an armed response (milliseconds)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Budget for one whole command, send included (milliseconds);
    /// falls back to the response timeout when absent
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,
    /// Parse response bodies into typed values
    #[serde(default = "default_parse_slave_data")]
    pub parse_slave_data: bool,
}

// Default value functions for serde
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    7
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "even".to_string()
}
fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}
fn default_parse_slave_data() -> bool {
    true
}

impl Default for AsciiMasterConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            mode: TransferMode::default(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            response_timeout_ms: default_response_timeout_ms(),
            command_timeout_ms: None,
            parse_slave_data: default_parse_slave_data(),
        }
    }
}

impl AsciiMasterConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ModbusResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable by this crate
    pub fn validate(&self) -> ModbusResult<()> {
        if self.mode != TransferMode::Ascii {
            return Err(ModbusError::configuration(
                "RTU transfer mode is not supported, use ascii",
            ));
        }
        if self.device.is_empty() {
            return Err(ModbusError::configuration("Serial device not specified"));
        }
        if self.response_timeout_ms == 0 {
            return Err(ModbusError::configuration(
                "response_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Idle deadline for an armed response
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Budget for one whole command, send included
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.unwrap_or(self.response_timeout_ms))
    }
}
