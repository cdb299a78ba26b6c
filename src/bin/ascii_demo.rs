//! Loopback demonstration of the Modbus ASCII master
//!
//! Runs a small in-memory slave on the far end of a duplex pipe and drives
//! every supported function code against it, so the full request path can be
//! exercised without serial hardware. Run with:
//!
//! ```bash
//! cargo run --bin ascii_demo
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, warn};

use modbus_ascii::constants::{
    COIL_ON, EXCEPTION_BIT, EXCEPTION_ILLEGAL_DATA_ADDRESS, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, FRAME_LF,
};
use modbus_ascii::protocol::pack_coils;
use modbus_ascii::{
    decode_frame, encode_frame, init_logging, AsciiMaster, AsciiTransport, ModbusClient,
    ModbusFunction, ModbusRequest, ResponseValue,
};

const SLAVE_ID: u8 = 0x11;
const BANK_SIZE: usize = 256;

/// Minimal in-memory slave: 256 coils and 256 holding registers, discrete
/// inputs and input registers aliased onto the same banks
struct DemoSlave {
    coils: Vec<bool>,
    registers: Vec<u16>,
}

impl DemoSlave {
    fn new() -> Self {
        Self {
            coils: (0..BANK_SIZE).map(|i| i % 3 == 0).collect(),
            registers: (0..BANK_SIZE).map(|i| (i as u16) * 7).collect(),
        }
    }

    /// Build the response payload for one request payload
    fn handle(&mut self, request: &[u8]) -> Vec<u8> {
        // All master requests carry at least address and quantity/value
        if request.len() < 6 || request[0] != SLAVE_ID {
            return vec![];
        }
        let function = request[1];

        let result = match function {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => self.read_bits(request),
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => self.read_registers(request),
            FC_WRITE_SINGLE_COIL => self.write_coil(request),
            FC_WRITE_SINGLE_REGISTER => self.write_register(request),
            FC_WRITE_MULTIPLE_COILS => self.write_coils(request),
            FC_WRITE_MULTIPLE_REGISTERS => self.write_registers(request),
            _ => None,
        };

        match result {
            Some(body) => {
                let mut payload = vec![SLAVE_ID, function];
                payload.extend_from_slice(&body);
                payload
            },
            None => vec![
                SLAVE_ID,
                function | EXCEPTION_BIT,
                EXCEPTION_ILLEGAL_DATA_ADDRESS,
            ],
        }
    }

    fn span(&self, request: &[u8]) -> Option<(usize, usize)> {
        let address = u16::from_be_bytes([request[2], request[3]]) as usize;
        let quantity = u16::from_be_bytes([request[4], request[5]]) as usize;
        (address + quantity <= BANK_SIZE).then_some((address, quantity))
    }

    fn read_bits(&self, request: &[u8]) -> Option<Vec<u8>> {
        let (address, quantity) = self.span(request)?;
        let packed = pack_coils(&self.coils[address..address + quantity]);
        let mut body = vec![packed.len() as u8];
        body.extend_from_slice(&packed);
        Some(body)
    }

    fn read_registers(&self, request: &[u8]) -> Option<Vec<u8>> {
        let (address, quantity) = self.span(request)?;
        let mut body = vec![(2 * quantity) as u8];
        for value in &self.registers[address..address + quantity] {
            body.extend_from_slice(&value.to_be_bytes());
        }
        Some(body)
    }

    fn write_coil(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let address = u16::from_be_bytes([request[2], request[3]]) as usize;
        let value = u16::from_be_bytes([request[4], request[5]]);
        if address >= BANK_SIZE {
            return None;
        }
        self.coils[address] = value == COIL_ON;
        Some(request[2..6].to_vec())
    }

    fn write_register(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let address = u16::from_be_bytes([request[2], request[3]]) as usize;
        if address >= BANK_SIZE {
            return None;
        }
        self.registers[address] = u16::from_be_bytes([request[4], request[5]]);
        Some(request[2..6].to_vec())
    }

    fn write_coils(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let (address, quantity) = self.span(request)?;
        let data = &request[7..];
        for i in 0..quantity {
            self.coils[address + i] = data[i / 8] & (1 << (i % 8)) != 0;
        }
        Some(request[2..6].to_vec())
    }

    fn write_registers(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let (address, quantity) = self.span(request)?;
        let data = &request[7..];
        for i in 0..quantity {
            self.registers[address + i] = u16::from_be_bytes([data[2 * i], data[2 * i + 1]]);
        }
        Some(request[2..6].to_vec())
    }
}

/// Read frames off the stream, answer each one through the slave model
async fn run_demo_slave(mut stream: DuplexStream) {
    let mut slave = DemoSlave::new();
    let mut pending = Vec::new();
    let mut buf = [0u8; 64];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        // Requests end with LF, so split on it
        while let Some(pos) = pending.iter().position(|&b| b == FRAME_LF) {
            let frame: Vec<u8> = pending.drain(..=pos).collect();
            let request = match decode_frame(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("slave: dropping bad frame: {e}");
                    continue;
                },
            };
            debug!("slave: request {:02X?}", request);

            let response = slave.handle(&request);
            if response.is_empty() {
                continue;
            }
            let encoded = match encode_frame(&response) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("slave: cannot encode response: {e}");
                    continue;
                },
            };
            if stream.write_all(&encoded).await.is_err() {
                return;
            }
        }
    }
}

fn loopback_master() -> AsciiMaster {
    let (master_io, slave_io) = tokio::io::duplex(1024);
    tokio::spawn(run_demo_slave(slave_io));
    let transport = AsciiTransport::from_stream(master_io, Duration::from_millis(500));
    AsciiMaster::with_transport(transport, Duration::from_millis(500), true)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info").context("logging setup failed")?;
    println!("{}\n", modbus_ascii::info());

    let master = loopback_master();

    // Writes first so the reads below see the values
    let state = master.write_05(SLAVE_ID, 2, true).await?;
    println!("write_05  coil[2] <- true          echoed state    {state}");

    let value = master.write_06(SLAVE_ID, 10, 0x1234).await?;
    println!("write_06  reg[10] <- 0x1234        echoed value    0x{value:04X}");

    let quantity = master
        .write_0f(SLAVE_ID, 0, &[true, false, true, true])
        .await?;
    println!("write_0f  coils[0..4]              echoed quantity {quantity}");

    let quantity = master.write_10(SLAVE_ID, 20, &[0x000A, 0x0102]).await?;
    println!("write_10  regs[20..22]             echoed quantity {quantity}");

    let coils = master.read_01(SLAVE_ID, 0, 8).await?;
    println!("read_01   coils[0..8]              {coils:?}");

    let inputs = master.read_02(SLAVE_ID, 0, 4).await?;
    println!("read_02   inputs[0..4]             {inputs:?}");

    let registers = master.read_03(SLAVE_ID, 8, 4).await?;
    println!("read_03   regs[8..12]              {registers:04X?}");

    let registers = master.read_04(SLAVE_ID, 20, 2).await?;
    println!("read_04   input regs[20..22]       {registers:04X?}");

    // Out-of-range read draws an exception response
    match master.read_03(SLAVE_ID, 0x2000, 1).await {
        Err(e) => println!("read_03   regs[0x2000] (invalid)    error: {e}"),
        Ok(_) => println!("read_03   regs[0x2000] unexpectedly succeeded"),
    }

    let stats = master.get_stats();
    master.close().await?;

    // Raw mode: same bus, parsing left to the caller
    let raw_master = {
        let (master_io, slave_io) = tokio::io::duplex(1024);
        tokio::spawn(run_demo_slave(slave_io));
        let transport = AsciiTransport::from_stream(master_io, Duration::from_millis(500));
        AsciiMaster::with_transport(transport, Duration::from_millis(500), false)
    };
    let request = ModbusRequest::new_read(SLAVE_ID, ModbusFunction::ReadHoldingRegisters, 8, 2);
    match raw_master.execute(&request).await? {
        ResponseValue::Raw(payload) => {
            println!("execute   raw response payload      {}", hex::encode_upper(&payload));
        },
        other => println!("execute   unexpected parsed value    {other:?}"),
    }
    raw_master.close().await?;

    let report = serde_json::json!({
        "requests_sent": stats.requests_sent,
        "responses_received": stats.responses_received,
        "errors": stats.errors,
        "timeouts": stats.timeouts,
        "bytes_sent": stats.bytes_sent,
        "bytes_received": stats.bytes_received,
    });
    println!("\ntransport stats: {}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
