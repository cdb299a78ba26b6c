//! Serial transport with a background read pump
//!
//! [`AsciiTransport`] owns the write half of the stream directly and hands
//! the read half to a background task (the pump). The pump feeds every
//! received byte through the shared [`FrameAssembler`] and publishes each
//! completion on a broadcast channel, so a request path simply subscribes,
//! arms the assembler, writes its frame and waits for the next event.
//!
//! The pump also owns the assembler's idle deadline: it sleeps until the
//! armed deadline and fires it if no completion happened first. A fired
//! deadline ends the attempt for good; bytes that straggle in afterwards
//! are dropped as bus noise.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::AsciiMasterConfig;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{encode_frame, AssemblerEvent, FrameAssembler};
use crate::protocol::ModbusRequest;

/// Broadcast channel depth; one event per attempt, so a small buffer is
/// already generous
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Read buffer size; a full-length ASCII frame is 513 characters
const READ_BUFFER_SIZE: usize = 520;

/// Transport layer statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Lock-free counters shared between the pump and the request path
#[derive(Debug, Default)]
struct StatsCounters {
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> TransportStats {
        TransportStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Format raw bytes as hex string for packet logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Modbus ASCII transport over a half-duplex serial line
///
/// Also constructible over any `AsyncRead + AsyncWrite` stream, which is how
/// the tests and the loopback demo drive it without hardware.
pub struct AsciiTransport {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    assembler: Arc<Mutex<FrameAssembler>>,
    events: broadcast::Sender<AssemblerEvent>,
    rearm: Arc<Notify>,
    stats: Arc<StatsCounters>,
    connected: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl AsciiTransport {
    /// Open the configured serial device
    pub async fn open(config: &AsciiMasterConfig) -> ModbusResult<Self> {
        config.validate()?;

        let parity = match config.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let builder = tokio_serial::new(&config.device, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(config.response_timeout());

        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            ModbusError::connection(format!(
                "Failed to open serial port {}: {}",
                config.device, e
            ))
        })?;

        info!(
            "[ASCII] opened {} @{}baud {}{}{}",
            config.device, config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );

        Ok(Self::from_stream(port, config.response_timeout()))
    }

    /// Build a transport over an already-open bidirectional stream
    pub fn from_stream<S>(stream: S, response_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::start(Box::new(reader), Box::new(writer), response_timeout)
    }

    fn start(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        response_timeout: Duration,
    ) -> Self {
        let assembler = Arc::new(Mutex::new(FrameAssembler::new(response_timeout)));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let rearm = Arc::new(Notify::new());
        let stats = Arc::new(StatsCounters::default());
        let connected = Arc::new(AtomicBool::new(true));

        let pump = tokio::spawn(run_pump(
            reader,
            Arc::clone(&assembler),
            events.clone(),
            Arc::clone(&rearm),
            Arc::clone(&stats),
            Arc::clone(&connected),
        ));

        Self {
            writer: Mutex::new(writer),
            assembler,
            events,
            rearm,
            stats,
            connected,
            pump,
        }
    }

    /// Subscribe to assembly completions
    ///
    /// Each subscriber sees every completion published after the call;
    /// dropping the receiver detaches it.
    pub fn subscribe(&self) -> broadcast::Receiver<AssemblerEvent> {
        self.events.subscribe()
    }

    /// Arm the assembler for a response of the given encoded length
    pub async fn listen(&self, expected_frame_len: usize) {
        self.assembler.lock().await.listen(expected_frame_len);
        // Wake the pump so it picks up the fresh deadline
        self.rearm.notify_one();
    }

    /// Arm the assembler and transmit the request frame
    ///
    /// The assembler is armed before the first byte leaves so a fast slave
    /// cannot reply into an unarmed receiver. On a send failure the armed
    /// attempt is cancelled, since no response can ever arrive for it.
    pub async fn send_request(&self, request: &ModbusRequest) -> ModbusResult<()> {
        if !self.is_connected() {
            return Err(ModbusError::connection("Not connected"));
        }

        let frame = encode_frame(&request.to_payload())?;
        self.listen(request.expected_frame_len()).await;

        debug!(
            "[ASCII] TX slave:{} {}",
            request.slave_id,
            format_hex_packet(&frame)
        );

        let send_result = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&frame).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };

        if let Err(e) = send_result {
            self.assembler.lock().await.abort();
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(ModbusError::io(format!("Serial send error: {e}")));
        }

        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Disarm the active listen attempt, if any
    ///
    /// A caller that gives up on its response uses this so a late frame
    /// cannot complete into a later attempt's event stream.
    pub async fn cancel_listen(&self) {
        self.assembler.lock().await.abort();
        self.rearm.notify_one();
    }

    /// Idle deadline applied to response attempts
    pub async fn response_timeout(&self) -> Duration {
        self.assembler.lock().await.idle_timeout()
    }

    /// Change the idle deadline; applies from the next attempt, zero
    /// disables it
    pub async fn set_response_timeout(&self, timeout: Duration) {
        self.assembler.lock().await.set_idle_timeout(timeout);
    }

    /// Whether the stream is still usable
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Shut the transport down
    pub async fn close(&self) -> ModbusResult<()> {
        self.connected.store(false, Ordering::Relaxed);
        self.pump.abort();
        self.assembler.lock().await.abort();

        let mut writer = self.writer.lock().await;
        writer
            .shutdown()
            .await
            .map_err(|e| ModbusError::io(format!("Close error: {e}")))?;

        info!("[ASCII] transport closed");
        Ok(())
    }

    /// Get communication statistics
    pub fn get_stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

impl Drop for AsciiTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Sleep until the armed deadline, or forever when no attempt is armed
async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_pump(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    assembler: Arc<Mutex<FrameAssembler>>,
    events: broadcast::Sender<AssemblerEvent>,
    rearm: Arc<Notify>,
    stats: Arc<StatsCounters>,
    connected: Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        // Snapshot outside the select so the deadline cannot move under the
        // sleeping branch; a re-arm wakes the loop to take a new snapshot
        let deadline = assembler.lock().await.deadline();

        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    let event = {
                        let mut assembler = assembler.lock().await;
                        if assembler.is_listening() {
                            assembler.abort();
                            Some(AssemblerEvent::Error(ModbusError::connection(
                                "Connection closed",
                            )))
                        } else {
                            None
                        }
                    };
                    if let Some(event) = event {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                        let _ = events.send(event);
                    }
                    break;
                },
                Ok(n) => {
                    stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                    trace!("[ASCII] RX {}", format_hex_packet(&buf[..n]));

                    let event = assembler.lock().await.push(&buf[..n]);
                    if let Some(event) = event {
                        match &event {
                            AssemblerEvent::Message(_) => {
                                stats.responses_received.fetch_add(1, Ordering::Relaxed);
                            },
                            AssemblerEvent::Error(_) => {
                                stats.errors.fetch_add(1, Ordering::Relaxed);
                            },
                        }
                        let _ = events.send(event);
                    }
                },
                Err(e) => {
                    assembler.lock().await.abort();
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    let _ = events.send(AssemblerEvent::Error(ModbusError::io(format!(
                        "Serial read error: {e}"
                    ))));
                    break;
                },
            },
            _ = wait_deadline(deadline) => {
                let event = {
                    let mut assembler = assembler.lock().await;
                    // Only fire if this is still the deadline we slept on;
                    // a completion or re-arm in between invalidates it
                    if assembler.deadline() == deadline {
                        Some(assembler.fire_deadline())
                    } else {
                        None
                    }
                };
                if let Some(event) = event {
                    stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!("[ASCII] response deadline fired");
                    let _ = events.send(event);
                }
            },
            _ = rearm.notified() => {},
        }
    }

    connected.store(false, Ordering::Relaxed);
    debug!("[ASCII] read pump stopped");
}
