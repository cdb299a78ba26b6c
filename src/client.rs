//! High-level Modbus ASCII master
//!
//! [`AsciiMaster`] drives one half-duplex serial bus: a single request is in
//! flight at a time, and every call completes with exactly one of a parsed
//! response, a protocol error or a timeout.
//!
//! # API Naming Convention
//!
//! Every operation exists under two names:
//!
//! | Function Code | Primary Name | Semantic Alias |
//! |---------------|--------------|----------------|
//! | 0x01 | `read_01()` | `read_coils()` |
//! | 0x02 | `read_02()` | `read_discrete_inputs()` |
//! | 0x03 | `read_03()` | `read_holding_registers()` |
//! | 0x04 | `read_04()` | `read_input_registers()` |
//! | 0x05 | `write_05()` | `write_single_coil()` |
//! | 0x06 | `write_06()` | `write_single_register()` |
//! | 0x0F | `write_0f()` | `write_multiple_coils()` |
//! | 0x10 | `write_10()` | `write_multiple_registers()` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AsciiMasterConfig;
use crate::constants::{COIL_OFF, COIL_ON, EXCEPTION_BIT};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::AssemblerEvent;
use crate::protocol::{
    pack_coils, parse_response_body, ModbusFunction, ModbusRequest, ResponseValue, SlaveId,
};
use crate::transport::{AsciiTransport, TransportStats};

/// Master-side interface covering all supported function codes
///
/// # Protocol Limits
///
/// | Operation | Limit |
/// |-----------|-------|
/// | Read Coils (0x01) | 2000 coils |
/// | Read Discrete Inputs (0x02) | 2000 bits |
/// | Read Holding Registers (0x03) | 125 registers |
/// | Read Input Registers (0x04) | 125 registers |
/// | Write Multiple Coils (0x0F) | 1968 coils |
/// | Write Multiple Registers (0x10) | 123 registers |
#[async_trait]
pub trait ModbusClient: Send + Sync {
    /// Read coils (function code 0x01)
    async fn read_01(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>>;

    /// Read discrete inputs (function code 0x02)
    async fn read_02(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>>;

    /// Read holding registers (function code 0x03)
    async fn read_03(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>>;

    /// Read input registers (function code 0x04)
    async fn read_04(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>>;

    /// Write single coil (function code 0x05); returns the echoed state
    async fn write_05(&self, slave_id: SlaveId, address: u16, state: bool) -> ModbusResult<bool>;

    /// Write single register (function code 0x06); returns the echoed value
    async fn write_06(&self, slave_id: SlaveId, address: u16, value: u16) -> ModbusResult<u16>;

    /// Write multiple coils (function code 0x0F); returns the echoed quantity
    async fn write_0f(&self, slave_id: SlaveId, address: u16, states: &[bool])
        -> ModbusResult<u16>;

    /// Write multiple registers (function code 0x10); returns the echoed quantity
    async fn write_10(&self, slave_id: SlaveId, address: u16, values: &[u16])
        -> ModbusResult<u16>;

    /// Alias for [`ModbusClient::read_01`]
    async fn read_coils(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        self.read_01(slave_id, address, quantity).await
    }

    /// Alias for [`ModbusClient::read_02`]
    async fn read_discrete_inputs(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        self.read_02(slave_id, address, quantity).await
    }

    /// Alias for [`ModbusClient::read_03`]
    async fn read_holding_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.read_03(slave_id, address, quantity).await
    }

    /// Alias for [`ModbusClient::read_04`]
    async fn read_input_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.read_04(slave_id, address, quantity).await
    }

    /// Alias for [`ModbusClient::write_05`]
    async fn write_single_coil(
        &self,
        slave_id: SlaveId,
        address: u16,
        state: bool,
    ) -> ModbusResult<bool> {
        self.write_05(slave_id, address, state).await
    }

    /// Alias for [`ModbusClient::write_06`]
    async fn write_single_register(
        &self,
        slave_id: SlaveId,
        address: u16,
        value: u16,
    ) -> ModbusResult<u16> {
        self.write_06(slave_id, address, value).await
    }

    /// Alias for [`ModbusClient::write_0f`]
    async fn write_multiple_coils(
        &self,
        slave_id: SlaveId,
        address: u16,
        states: &[bool],
    ) -> ModbusResult<u16> {
        self.write_0f(slave_id, address, states).await
    }

    /// Alias for [`ModbusClient::write_10`]
    async fn write_multiple_registers(
        &self,
        slave_id: SlaveId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<u16> {
        self.write_10(slave_id, address, values).await
    }

    /// Whether the underlying transport is usable
    fn is_connected(&self) -> bool;

    /// Shut down the underlying transport
    async fn close(&self) -> ModbusResult<()>;

    /// Transport statistics for this client
    fn get_stats(&self) -> TransportStats;
}

/// RAII latch over the half-duplex bus
///
/// Acquired at the start of every operation and released on all exit paths,
/// so overlapping requests are impossible rather than discouraged.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> ModbusResult<Self> {
        match busy.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => Ok(Self { busy }),
            Err(_) => Err(ModbusError::Busy),
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Modbus ASCII serial master
///
/// A second call while a request is in flight fails immediately with
/// [`ModbusError::Busy`] instead of queueing behind the bus.
pub struct AsciiMaster {
    transport: AsciiTransport,
    command_timeout: Duration,
    parse_slave_data: bool,
    busy: AtomicBool,
}

impl AsciiMaster {
    /// Open the serial device named by the configuration
    pub async fn open(config: &AsciiMasterConfig) -> ModbusResult<Self> {
        let transport = AsciiTransport::open(config).await?;
        Ok(Self::with_transport(
            transport,
            config.command_timeout(),
            config.parse_slave_data,
        ))
    }

    /// Build a master over an existing transport
    pub fn with_transport(
        transport: AsciiTransport,
        command_timeout: Duration,
        parse_slave_data: bool,
    ) -> Self {
        Self {
            transport,
            command_timeout,
            parse_slave_data,
            busy: AtomicBool::new(false),
        }
    }

    /// Deadline for one complete command, send included
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Idle deadline the receiver applies while a response is pending
    pub async fn response_timeout(&self) -> Duration {
        self.transport.response_timeout().await
    }

    /// Change the response deadline; takes effect from the next request
    ///
    /// A zero timeout disables the idle deadline, leaving the command
    /// timeout as the only bound on a call.
    pub async fn set_response_timeout(&self, timeout: Duration) {
        self.transport.set_response_timeout(timeout).await;
    }

    /// Submit a single request and return its tagged response value
    ///
    /// The typed [`ModbusClient`] operations wrap this. With slave data
    /// parsing disabled this is the only useful entry point: it yields
    /// [`ResponseValue::Raw`] and leaves interpretation to the caller.
    pub async fn execute(&self, request: &ModbusRequest) -> ModbusResult<ResponseValue> {
        request.validate()?;
        let _guard = BusyGuard::acquire(&self.busy)?;

        let mut events = self.transport.subscribe();
        let timeout_ms = self.command_timeout.as_millis() as u64;

        let outcome = tokio::time::timeout(self.command_timeout, async {
            self.transport.send_request(request).await?;
            match events.recv().await {
                Ok(AssemblerEvent::Message(payload)) => self.check_response(request, payload),
                Ok(AssemblerEvent::Error(err)) => Err(err),
                Err(_) => Err(ModbusError::connection("Transport stopped")),
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                // Abandoned attempt: disarm so a late frame cannot complete
                // into a later call's subscription
                self.transport.cancel_listen().await;
                Err(ModbusError::timeout("Response", timeout_ms))
            },
        }
    }

    /// Validate the response envelope and parse the body
    ///
    /// The slave address is checked before the function code, so a reply
    /// from the wrong station is rejected even when it looks like a valid
    /// exception.
    fn check_response(
        &self,
        request: &ModbusRequest,
        payload: Vec<u8>,
    ) -> ModbusResult<ResponseValue> {
        if !self.parse_slave_data {
            return Ok(ResponseValue::Raw(payload));
        }

        if payload.len() < 2 {
            return Err(ModbusError::invalid_data(format!(
                "Response too short: {} bytes",
                payload.len()
            )));
        }

        let slave = payload[0];
        let function = payload[1];
        let expected = request.function.to_u8();

        if slave != request.slave_id {
            return Err(ModbusError::protocol(format!(
                "Invalid slave address: {slave}"
            )));
        }

        if function == expected {
            parse_response_body(request.function, request.quantity, &payload[2..])
        } else if function == expected | EXCEPTION_BIT {
            let code = payload.get(2).copied().unwrap_or(0);
            Err(ModbusError::exception(expected, code))
        } else {
            Err(ModbusError::invalid_function(function))
        }
    }
}

#[async_trait]
impl ModbusClient for AsciiMaster {
    async fn read_01(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request = ModbusRequest::new_read(slave_id, ModbusFunction::ReadCoils, address, quantity);
        self.execute(&request).await?.into_bits()
    }

    async fn read_02(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request =
            ModbusRequest::new_read(slave_id, ModbusFunction::ReadDiscreteInputs, address, quantity);
        self.execute(&request).await?.into_bits()
    }

    async fn read_03(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::new_read(
            slave_id,
            ModbusFunction::ReadHoldingRegisters,
            address,
            quantity,
        );
        self.execute(&request).await?.into_registers()
    }

    async fn read_04(
        &self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request =
            ModbusRequest::new_read(slave_id, ModbusFunction::ReadInputRegisters, address, quantity);
        self.execute(&request).await?.into_registers()
    }

    async fn write_05(&self, slave_id: SlaveId, address: u16, state: bool) -> ModbusResult<bool> {
        let value = if state { COIL_ON } else { COIL_OFF };
        let request =
            ModbusRequest::new_write_single(slave_id, ModbusFunction::WriteSingleCoil, address, value);
        self.execute(&request).await?.into_coil_state()
    }

    async fn write_06(&self, slave_id: SlaveId, address: u16, value: u16) -> ModbusResult<u16> {
        let request = ModbusRequest::new_write_single(
            slave_id,
            ModbusFunction::WriteSingleRegister,
            address,
            value,
        );
        self.execute(&request).await?.into_register_value()
    }

    async fn write_0f(
        &self,
        slave_id: SlaveId,
        address: u16,
        states: &[bool],
    ) -> ModbusResult<u16> {
        let request = ModbusRequest::new_write_multiple(
            slave_id,
            ModbusFunction::WriteMultipleCoils,
            address,
            states.len() as u16,
            pack_coils(states),
        );
        self.execute(&request).await?.into_quantity()
    }

    async fn write_10(
        &self,
        slave_id: SlaveId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<u16> {
        let mut data = Vec::with_capacity(2 * values.len());
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        let request = ModbusRequest::new_write_multiple(
            slave_id,
            ModbusFunction::WriteMultipleRegisters,
            address,
            values.len() as u16,
            data,
        );
        self.execute(&request).await?.into_quantity()
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn close(&self) -> ModbusResult<()> {
        self.transport.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.transport.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    fn master_over_duplex(parse_slave_data: bool) -> (AsciiMaster, DuplexStream) {
        let (master_io, slave_io) = duplex(256);
        let transport = AsciiTransport::from_stream(master_io, Duration::from_millis(500));
        let master =
            AsciiMaster::with_transport(transport, Duration::from_millis(500), parse_slave_data);
        (master, slave_io)
    }

    fn holding_request(slave_id: u8, quantity: u16) -> ModbusRequest {
        ModbusRequest::new_read(slave_id, ModbusFunction::ReadHoldingRegisters, 0, quantity)
    }

    #[test]
    fn test_busy_guard_is_exclusive_until_dropped() {
        let busy = AtomicBool::new(false);
        let guard = BusyGuard::acquire(&busy).unwrap();
        assert!(matches!(BusyGuard::acquire(&busy), Err(ModbusError::Busy)));

        drop(guard);
        assert!(BusyGuard::acquire(&busy).is_ok());
    }

    #[tokio::test]
    async fn test_check_response_parses_matching_reply() {
        let (master, _slave_io) = master_over_duplex(true);
        let value = master
            .check_response(&holding_request(0x11, 1), vec![0x11, 0x03, 0x02, 0x00, 0x0A])
            .unwrap();
        assert_eq!(value, ResponseValue::Registers(vec![0x000A]));
    }

    #[tokio::test]
    async fn test_check_response_slave_mismatch_wins_over_function() {
        // Wrong station is rejected even though the function code matches
        let (master, _slave_io) = master_over_duplex(true);
        let err = master
            .check_response(&holding_request(0x11, 1), vec![0x12, 0x03, 0x02, 0x00, 0x0A])
            .unwrap_err();
        assert!(err.to_string().contains("Invalid slave address: 18"));
    }

    #[tokio::test]
    async fn test_check_response_exception_reply() {
        let (master, _slave_io) = master_over_duplex(true);
        let err = master
            .check_response(&holding_request(0x11, 1), vec![0x11, 0x83, 0x02])
            .unwrap_err();
        assert_eq!(err.to_string(), "Exception code: 2");
        assert_eq!(err.exception_info(), Some((0x02, "Illegal Data Address")));
    }

    #[tokio::test]
    async fn test_check_response_unrelated_function_code() {
        let (master, _slave_io) = master_over_duplex(true);
        let err = master
            .check_response(&holding_request(0x11, 1), vec![0x11, 0x04, 0x02, 0x00, 0x0A])
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid function code: 0x04");
    }

    #[tokio::test]
    async fn test_check_response_raw_mode_skips_validation() {
        // With parsing disabled even a mismatched slave address passes
        // through untouched
        let (master, _slave_io) = master_over_duplex(false);
        let value = master
            .check_response(&holding_request(0x11, 1), vec![0x12, 0x03, 0x02, 0x00, 0x0A])
            .unwrap();
        assert_eq!(value, ResponseValue::Raw(vec![0x12, 0x03, 0x02, 0x00, 0x0A]));
    }

    #[tokio::test]
    async fn test_execute_rejects_invalid_quantity_before_sending() {
        let (master, _slave_io) = master_over_duplex(true);
        let err = master.read_03(0x11, 0, 126).await.unwrap_err();
        assert!(err.to_string().contains("Invalid quantity"));
        assert_eq!(master.get_stats().requests_sent, 0);
    }
}
