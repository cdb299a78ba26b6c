//! # Modbus ASCII - Serial Master Library
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **License:** MIT
//!
//! An async Modbus ASCII master for half-duplex serial field buses, built on
//! Tokio. The ASCII transfer mode frames every request as printable hex
//! between a `:` start delimiter and a CRLF terminator, protected by an LRC
//! checksum, which keeps it debuggable with nothing but a serial console.
//!
//! ## Features
//!
//! - **Async Throughout**: Tokio-based transport with a background read pump
//! - **Strict Bus Discipline**: one request in flight, overlap rejected
//!   immediately instead of queued
//! - **Deadline Driven**: per-response idle deadline plus an overall command
//!   budget for every operation
//! - **Typed Results**: responses parse into tagged values, never raw byte
//!   offsets
//! - **Memory Safe**: pure Rust, zero unsafe code
//! - **Built-in Monitoring**: transport statistics for every master
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client |
//! |------|----------|--------|
//! | 0x01 | Read Coils | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ |
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x05 | Write Single Coil | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_ascii::{AsciiMaster, AsciiMasterConfig, ModbusClient, ModbusResult};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = AsciiMasterConfig {
//!         device: "/dev/ttyUSB0".to_string(),
//!         ..Default::default()
//!     };
//!     let master = AsciiMaster::open(&config).await?;
//!
//!     // Read 10 holding registers from slave 1, starting at address 0
//!     let registers = master.read_03(1, 0, 10).await?;
//!     println!("Registers: {:?}", registers);
//!
//!     // Write a value to register 100
//!     master.write_06(1, 100, 0x1234).await?;
//!
//!     master.close().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol constants based on the official specification
pub mod constants;

/// ASCII frame codec and streaming assembler
pub mod frame;

/// Request and response definitions
pub mod protocol;

/// Serial transport with the background read pump
pub mod transport;

/// High-level master client
pub mod client;

/// Master configuration
pub mod config;

/// Logging setup for binaries and tests
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_ascii::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::{AsciiMaster, ModbusClient};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use config::{AsciiMasterConfig, TransferMode};
pub use protocol::{ModbusFunction, ModbusRequest, ResponseValue, SlaveId};

// === Wire layer (advanced usage) ===
pub use frame::{calculate_lrc, decode_frame, encode_frame, AssemblerEvent, FrameAssembler};

// === Monitoring ===
pub use transport::{AsciiTransport, TransportStats};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    DEFAULT_RESPONSE_TIMEOUT_MS, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

// === Logging ===
pub use logging::{init_logging, init_test_logging};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Modbus ASCII v{} - async serial master library by Evan Liu",
        VERSION
    )
}
