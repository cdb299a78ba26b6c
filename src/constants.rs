//! Modbus ASCII protocol constants based on the official specification
//!
//! Quantity limits are the standard Modbus values; frame-size constants are
//! derived from the ASCII encoding where every payload byte costs two hex
//! characters plus the fixed delimiter and checksum overhead.

// ============================================================================
// Frame Delimiters
// ============================================================================

/// Frame start delimiter (':')
pub const FRAME_START: u8 = 0x3A;

/// First byte of the frame end delimiter (CR)
pub const FRAME_CR: u8 = 0x0D;

/// Second byte of the frame end delimiter (LF)
pub const FRAME_LF: u8 = 0x0A;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Fixed character overhead of an ASCII frame
///
/// A frame carrying `n` payload bytes encodes to
/// start(1) + 2×n hex chars + LRC(2) + CR(1) + LF(1) = 2n + 5 characters
pub const FRAME_OVERHEAD: usize = 5;

/// Minimum length of a valid ASCII frame
///
/// The shortest meaningful payload is an exception response:
/// address(1) + function(1) + exception code(1) = 3 bytes,
/// encoded as 2×3 + 5 = 11 characters
pub const MIN_FRAME_LEN: usize = 11;

/// Maximum payload size (address + PDU)
///
/// The Modbus PDU is capped at 253 bytes; with the one-byte slave address
/// the ASCII payload is at most 254 bytes, for a 513-character frame
pub const MAX_PAYLOAD_SIZE: usize = 254;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: function(1) + byte count(1) + N×2 ≤ 253 → N ≤ 125
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Request PDU: function(1) + address(2) + quantity(2) + byte count(1)
/// + N×2 ≤ 253 → N ≤ 123
pub const MAX_WRITE_REGISTERS: usize = 123;

// ============================================================================
// Coil Operation Limits
// ============================================================================

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
pub const MAX_READ_COILS: usize = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils)
pub const MAX_WRITE_COILS: usize = 1968;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set on the function code of an exception response
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// Coil Write Values
// ============================================================================

/// Register value driving a coil ON in FC05
pub const COIL_ON: u16 = 0xFF00;

/// Register value driving a coil OFF in FC05
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Default response timeout in milliseconds
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

/// Get exception description
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        // Exception frame: 3 payload bytes
        assert_eq!(MIN_FRAME_LEN, 2 * 3 + FRAME_OVERHEAD);
        // Largest frame fits the 513-character ASCII ADU limit
        assert_eq!(2 * MAX_PAYLOAD_SIZE + FRAME_OVERHEAD, 513);
    }

    #[test]
    fn test_register_limits() {
        // Read response PDU must fit 253 bytes
        let read_pdu_size = 1 + 1 + (MAX_READ_REGISTERS * 2);
        assert!(read_pdu_size <= 253);
        assert_eq!(MAX_READ_REGISTERS, 125);

        // Write request PDU must fit 253 bytes
        let write_pdu_size = 1 + 2 + 2 + 1 + (MAX_WRITE_REGISTERS * 2);
        assert!(write_pdu_size <= 253);
        assert_eq!(MAX_WRITE_REGISTERS, 123);
    }

    #[test]
    fn test_coil_limits() {
        let read_coil_pdu = 1 + 1 + MAX_READ_COILS.div_ceil(8);
        assert!(read_coil_pdu <= 253);
        assert_eq!(MAX_READ_COILS, 2000);

        let write_coil_pdu = 1 + 2 + 2 + 1 + MAX_WRITE_COILS.div_ceil(8);
        assert!(write_coil_pdu <= 253);
        assert_eq!(MAX_WRITE_COILS, 1968);
    }

    #[test]
    fn test_exception_descriptions() {
        assert_eq!(exception_description(0x02), "Illegal Data Address");
        assert_eq!(exception_description(0x0B), "Gateway Target Device Failed to Respond");
        assert_eq!(exception_description(0xFF), "Unknown Exception");
    }
}
