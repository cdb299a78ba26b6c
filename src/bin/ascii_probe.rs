//! Serial probe for real hardware
//!
//! Opens the serial device named in a YAML configuration file and polls one
//! block of holding registers. Usage:
//!
//! ```bash
//! cargo run --bin ascii_probe -- config.yaml [slave] [address] [quantity]
//! ```

use anyhow::{bail, Context, Result};

use modbus_ascii::{init_logging, AsciiMaster, AsciiMasterConfig, ModbusClient};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("debug").context("logging setup failed")?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        bail!("usage: {} <config.yaml> [slave] [address] [quantity]", args[0]);
    }

    let slave: u8 = parse_arg(&args, 2, 1)?;
    let address: u16 = parse_arg(&args, 3, 0)?;
    let quantity: u16 = parse_arg(&args, 4, 10)?;

    let config = AsciiMasterConfig::from_yaml_file(&args[1])
        .with_context(|| format!("loading {}", args[1]))?;
    println!(
        "device {} @{}baud {}{}{}  slave {} address {} quantity {}",
        config.device,
        config.baud_rate,
        config.data_bits,
        config.parity,
        config.stop_bits,
        slave,
        address,
        quantity
    );

    let master = AsciiMaster::open(&config).await?;

    match master.read_03(slave, address, quantity).await {
        Ok(registers) => {
            for (i, value) in registers.iter().enumerate() {
                // A block crossing 0xFFFF wraps rather than panicking
                let reg = address.wrapping_add(i as u16);
                println!("reg[{}] = 0x{:04X} ({})", reg, value, value);
            }
        },
        Err(e) => eprintln!("read failed: {e}"),
    }

    let stats = master.get_stats();
    println!(
        "stats: {} sent / {} received / {} errors / {} timeouts",
        stats.requests_sent, stats.responses_received, stats.errors, stats.timeouts
    );

    master.close().await?;
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("argument {index} ({raw}): {e}")),
        None => Ok(default),
    }
}
