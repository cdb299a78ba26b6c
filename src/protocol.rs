//! Modbus request and response types
//!
//! A [`ModbusRequest`] describes one master-side operation; it knows how to
//! render itself as the raw frame payload and how long the matching response
//! frame will be on the wire. Response bodies parse into a [`ResponseValue`]
//! tagged by the kind of data the function code returns, so callers never
//! index into raw bytes themselves.

use byteorder::{BigEndian, ByteOrder};

use crate::constants::{
    COIL_ON, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_READ_COILS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::encoded_frame_len;

/// Modbus slave address
pub type SlaveId = u8;

/// Supported Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// FC01 - Read Coils
    ReadCoils,
    /// FC02 - Read Discrete Inputs
    ReadDiscreteInputs,
    /// FC03 - Read Holding Registers
    ReadHoldingRegisters,
    /// FC04 - Read Input Registers
    ReadInputRegisters,
    /// FC05 - Write Single Coil
    WriteSingleCoil,
    /// FC06 - Write Single Register
    WriteSingleRegister,
    /// FC15 - Write Multiple Coils
    WriteMultipleCoils,
    /// FC16 - Write Multiple Registers
    WriteMultipleRegisters,
}

impl ModbusFunction {
    /// Convert from raw function code
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            FC_READ_COILS => Ok(ModbusFunction::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Ok(ModbusFunction::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Ok(ModbusFunction::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(ModbusFunction::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Ok(ModbusFunction::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Ok(ModbusFunction::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Ok(ModbusFunction::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(ModbusFunction::WriteMultipleRegisters),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    /// Convert to raw function code
    pub fn to_u8(self) -> u8 {
        match self {
            ModbusFunction::ReadCoils => FC_READ_COILS,
            ModbusFunction::ReadDiscreteInputs => FC_READ_DISCRETE_INPUTS,
            ModbusFunction::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            ModbusFunction::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            ModbusFunction::WriteSingleCoil => FC_WRITE_SINGLE_COIL,
            ModbusFunction::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
            ModbusFunction::WriteMultipleCoils => FC_WRITE_MULTIPLE_COILS,
            ModbusFunction::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }
}

/// One master-side request
#[derive(Debug, Clone)]
pub struct ModbusRequest {
    /// Target slave address
    pub slave_id: SlaveId,
    /// Function code
    pub function: ModbusFunction,
    /// Starting address
    pub address: u16,
    /// Number of coils or registers addressed
    pub quantity: u16,
    /// Raw data for write operations (already big-endian / bit-packed)
    pub data: Vec<u8>,
}

impl ModbusRequest {
    /// Create a read request (FC01/02/03/04)
    pub fn new_read(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
            data: vec![],
        }
    }

    /// Create a single-value write request (FC05/06)
    ///
    /// For FC05 the value must be the coil drive word (0xFF00 or 0x0000).
    pub fn new_write_single(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: u16,
        value: u16,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity: 1,
            data: value.to_be_bytes().to_vec(),
        }
    }

    /// Create a multi-value write request (FC15/16)
    pub fn new_write_multiple(
        slave_id: SlaveId,
        function: ModbusFunction,
        address: u16,
        quantity: u16,
        data: Vec<u8>,
    ) -> Self {
        Self {
            slave_id,
            function,
            address,
            quantity,
            data,
        }
    }

    /// Validate quantities and data lengths against protocol limits
    pub fn validate(&self) -> ModbusResult<()> {
        match self.function {
            ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
                if self.quantity == 0 || self.quantity as usize > MAX_READ_COILS {
                    return Err(ModbusError::invalid_data("Invalid quantity"));
                }
            },
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                if self.quantity == 0 || self.quantity as usize > MAX_READ_REGISTERS {
                    return Err(ModbusError::invalid_data("Invalid quantity"));
                }
            },
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => {
                if self.data.len() != 2 {
                    return Err(ModbusError::invalid_data("Invalid data length"));
                }
            },
            ModbusFunction::WriteMultipleCoils => {
                if self.quantity == 0 || self.quantity as usize > MAX_WRITE_COILS {
                    return Err(ModbusError::invalid_data("Invalid quantity"));
                }
                if self.data.len() != (self.quantity as usize + 7) / 8 {
                    return Err(ModbusError::invalid_data("Invalid data length"));
                }
            },
            ModbusFunction::WriteMultipleRegisters => {
                if self.quantity == 0 || self.quantity as usize > MAX_WRITE_REGISTERS {
                    return Err(ModbusError::invalid_data("Invalid quantity"));
                }
                if self.data.len() != 2 * self.quantity as usize {
                    return Err(ModbusError::invalid_data("Invalid data length"));
                }
            },
        }
        Ok(())
    }

    /// Render the raw frame payload: address, function code and
    /// function-specific fields
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(7 + self.data.len());
        payload.push(self.slave_id);
        payload.push(self.function.to_u8());

        match self.function {
            ModbusFunction::ReadCoils
            | ModbusFunction::ReadDiscreteInputs
            | ModbusFunction::ReadHoldingRegisters
            | ModbusFunction::ReadInputRegisters => {
                payload.extend_from_slice(&self.address.to_be_bytes());
                payload.extend_from_slice(&self.quantity.to_be_bytes());
            },
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => {
                payload.extend_from_slice(&self.address.to_be_bytes());
                payload.extend_from_slice(&self.data);
            },
            ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => {
                payload.extend_from_slice(&self.address.to_be_bytes());
                payload.extend_from_slice(&self.quantity.to_be_bytes());
                payload.push(self.data.len() as u8);
                payload.extend_from_slice(&self.data);
            },
        }

        payload
    }

    /// Encoded length of the response frame this request produces
    ///
    /// Bit reads return `ceil(quantity / 8)` data bytes, register reads
    /// `2 × quantity`, and every write echoes a fixed 6-byte payload. The
    /// assembler is armed with this length before the request is sent.
    pub fn expected_frame_len(&self) -> usize {
        let payload_len = match self.function {
            ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
                3 + (self.quantity as usize + 7) / 8
            },
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                3 + 2 * self.quantity as usize
            },
            ModbusFunction::WriteSingleCoil
            | ModbusFunction::WriteSingleRegister
            | ModbusFunction::WriteMultipleCoils
            | ModbusFunction::WriteMultipleRegisters => 6,
        };
        encoded_frame_len(payload_len)
    }
}

/// Pack coil values into LSB-first bytes for FC15
pub fn pack_coils(values: &[bool]) -> Vec<u8> {
    let mut data = Vec::with_capacity((values.len() + 7) / 8);
    for chunk in values.chunks(8) {
        let mut byte = 0u8;
        for (i, &coil) in chunk.iter().enumerate() {
            if coil {
                byte |= 1 << i;
            }
        }
        data.push(byte);
    }
    data
}

/// Parsed value carried by a successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    /// Coil or discrete input states (FC01/FC02)
    Bits(Vec<bool>),
    /// Holding or input register words (FC03/FC04)
    Registers(Vec<u16>),
    /// Echoed coil state (FC05)
    CoilState(bool),
    /// Echoed register value (FC06)
    RegisterValue(u16),
    /// Echoed quantity of written items (FC15/FC16)
    Quantity(u16),
    /// Unparsed response body, when slave data parsing is disabled
    Raw(Vec<u8>),
}

impl ResponseValue {
    /// Short name of the carried value kind
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseValue::Bits(_) => "bits",
            ResponseValue::Registers(_) => "registers",
            ResponseValue::CoilState(_) => "coil state",
            ResponseValue::RegisterValue(_) => "register value",
            ResponseValue::Quantity(_) => "quantity",
            ResponseValue::Raw(_) => "raw",
        }
    }

    pub fn into_bits(self) -> ModbusResult<Vec<bool>> {
        match self {
            ResponseValue::Bits(bits) => Ok(bits),
            other => Err(ModbusError::invalid_data(format!(
                "Expected bits, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_registers(self) -> ModbusResult<Vec<u16>> {
        match self {
            ResponseValue::Registers(registers) => Ok(registers),
            other => Err(ModbusError::invalid_data(format!(
                "Expected registers, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_coil_state(self) -> ModbusResult<bool> {
        match self {
            ResponseValue::CoilState(state) => Ok(state),
            other => Err(ModbusError::invalid_data(format!(
                "Expected coil state, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_register_value(self) -> ModbusResult<u16> {
        match self {
            ResponseValue::RegisterValue(value) => Ok(value),
            other => Err(ModbusError::invalid_data(format!(
                "Expected register value, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_quantity(self) -> ModbusResult<u16> {
        match self {
            ResponseValue::Quantity(quantity) => Ok(quantity),
            other => Err(ModbusError::invalid_data(format!(
                "Expected quantity, got {}",
                other.kind()
            ))),
        }
    }
}

/// Parse the response body (payload after address and function code) for the
/// given request shape
pub fn parse_response_body(
    function: ModbusFunction,
    quantity: u16,
    body: &[u8],
) -> ModbusResult<ResponseValue> {
    match function {
        ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
            let expected_bytes = (quantity as usize + 7) / 8;
            if body.len() != expected_bytes + 1 || body[0] as usize != expected_bytes {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid byte count: {}",
                    body.first().copied().unwrap_or(0)
                )));
            }
            let mut bits = Vec::with_capacity(expected_bytes * 8);
            for &byte in &body[1..] {
                for i in 0..8 {
                    bits.push(byte & (1 << i) != 0);
                }
            }
            bits.truncate(quantity as usize);
            Ok(ResponseValue::Bits(bits))
        },
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
            let expected_bytes = 2 * quantity as usize;
            if body.len() != expected_bytes + 1 || body[0] as usize != expected_bytes {
                return Err(ModbusError::invalid_data(format!(
                    "Invalid byte count: {}",
                    body.first().copied().unwrap_or(0)
                )));
            }
            let mut registers = Vec::with_capacity(quantity as usize);
            for chunk in body[1..].chunks_exact(2) {
                registers.push(BigEndian::read_u16(chunk));
            }
            Ok(ResponseValue::Registers(registers))
        },
        ModbusFunction::WriteSingleCoil => {
            let value = parse_write_echo(body)?;
            Ok(ResponseValue::CoilState(value == COIL_ON))
        },
        ModbusFunction::WriteSingleRegister => {
            let value = parse_write_echo(body)?;
            Ok(ResponseValue::RegisterValue(value))
        },
        ModbusFunction::WriteMultipleCoils | ModbusFunction::WriteMultipleRegisters => {
            let echoed = parse_write_echo(body)?;
            Ok(ResponseValue::Quantity(echoed))
        },
    }
}

/// Write responses echo address(2) + value-or-quantity(2); return the value
fn parse_write_echo(body: &[u8]) -> ModbusResult<u16> {
    if body.len() != 4 {
        return Err(ModbusError::invalid_data(format!(
            "Invalid response length: {}",
            body.len()
        )));
    }
    Ok(BigEndian::read_u16(&body[2..4]))
}
