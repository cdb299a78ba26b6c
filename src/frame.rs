//! Modbus ASCII frame codec and streaming assembler
//!
//! ASCII frame format: `:AAFFDDD...LLCRLF`
//! - `:` - Start character
//! - `AA` - Address (2 ASCII hex chars)
//! - `FF` - Function code (2 ASCII hex chars)
//! - `DDD...` - Data (variable length ASCII hex chars)
//! - `LL` - LRC checksum (2 ASCII hex chars)
//! - `CRLF` - End characters (0x0D, 0x0A)
//!
//! The [`FrameAssembler`] is the receive half: it is armed with the expected
//! encoded length of the next response and fed raw bytes from the serial
//! stream, and reports exactly one completion per listen attempt.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::time::Instant;

use crate::constants::{
    FRAME_CR, FRAME_LF, FRAME_OVERHEAD, FRAME_START, MAX_PAYLOAD_SIZE, MIN_FRAME_LEN,
};
use crate::error::{ModbusError, ModbusResult};

/// Calculate LRC (Longitudinal Redundancy Check) over raw payload bytes
///
/// The LRC is the two's complement of the 8-bit sum of all payload bytes,
/// covering address, function code and data fields.
pub fn calculate_lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Encoded length of a frame carrying `payload_len` raw bytes
pub fn encoded_frame_len(payload_len: usize) -> usize {
    2 * payload_len + FRAME_OVERHEAD
}

/// Convert byte to 2-character uppercase ASCII hex
fn byte_to_ascii_hex(byte: u8) -> [u8; 2] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    [HEX[(byte >> 4) as usize], HEX[(byte & 0x0F) as usize]]
}

/// Convert single ASCII character to its hex value
///
/// Lowercase digits are tolerated on receive even though the master always
/// transmits uppercase.
fn ascii_char_to_hex(c: u8) -> ModbusResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(ModbusError::frame(format!(
            "Invalid hex character: {}",
            c as char
        ))),
    }
}

/// Convert 2-character ASCII hex to a byte
fn ascii_hex_to_byte(ascii: &[u8]) -> ModbusResult<u8> {
    let high = ascii_char_to_hex(ascii[0])?;
    let low = ascii_char_to_hex(ascii[1])?;
    Ok((high << 4) | low)
}

/// Encode raw payload bytes into a complete ASCII frame
///
/// Every payload up to [`MAX_PAYLOAD_SIZE`] encodes; the empty payload
/// yields a frame carrying only its checksum.
pub fn encode_frame(payload: &[u8]) -> ModbusResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ModbusError::invalid_data(format!(
            "Invalid payload length: {}",
            payload.len()
        )));
    }

    let mut frame = Vec::with_capacity(encoded_frame_len(payload.len()));
    frame.push(FRAME_START);
    for &byte in payload {
        frame.extend_from_slice(&byte_to_ascii_hex(byte));
    }
    frame.extend_from_slice(&byte_to_ascii_hex(calculate_lrc(payload)));
    frame.push(FRAME_CR);
    frame.push(FRAME_LF);

    Ok(frame)
}

/// Decode a complete ASCII frame into its raw payload bytes
///
/// Verifies delimiters, hex digits and the LRC; the returned payload has the
/// checksum stripped.
pub fn decode_frame(frame: &[u8]) -> ModbusResult<Vec<u8>> {
    // Start delimiter plus end pair; anything shorter cannot be a frame
    if frame.len() < 3 {
        return Err(ModbusError::frame("Frame too short"));
    }

    if frame[0] != FRAME_START {
        return Err(ModbusError::frame("Invalid frame start character"));
    }

    let len = frame.len();
    if frame[len - 2] != FRAME_CR || frame[len - 1] != FRAME_LF {
        return Err(ModbusError::frame("Invalid frame end characters"));
    }

    // Interior must hold an even number of hex chars
    let ascii_data = &frame[1..len - 2];
    if ascii_data.len() % 2 != 0 {
        return Err(ModbusError::frame("Invalid frame length"));
    }

    let mut raw_data = Vec::with_capacity(ascii_data.len() / 2);
    for chunk in ascii_data.chunks(2) {
        raw_data.push(ascii_hex_to_byte(chunk)?);
    }

    // Last raw byte is the transmitted LRC
    let received_lrc = match raw_data.pop() {
        Some(lrc) => lrc,
        None => return Err(ModbusError::frame("Frame too short")),
    };
    if received_lrc != calculate_lrc(&raw_data) {
        return Err(ModbusError::frame("Invalid checksum"));
    }

    Ok(raw_data)
}

/// Completion signal of one listen attempt
#[derive(Debug, Clone)]
pub enum AssemblerEvent {
    /// Frame decoded successfully; carries the payload with the LRC stripped
    Message(Vec<u8>),
    /// Attempt ended without a usable frame
    Error(ModbusError),
}

/// Streaming receive-side frame assembler
///
/// One listen attempt runs at a time: [`FrameAssembler::listen`] arms the
/// assembler with the expected encoded length and the idle deadline, raw
/// bytes are fed through [`FrameAssembler::push`], and the first completion
/// (decoded frame, checksum failure or fired deadline) ends the attempt.
/// Bytes arriving outside an attempt are dropped as bus noise.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    expected_len: usize,
    listening: bool,
    idle_timeout: Duration,
    deadline: Option<Instant>,
}

impl FrameAssembler {
    /// Create an assembler with the given idle timeout between arming and
    /// frame completion
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * MAX_PAYLOAD_SIZE + FRAME_OVERHEAD),
            expected_len: 0,
            listening: false,
            idle_timeout,
            deadline: None,
        }
    }

    /// Arm the assembler for the next response
    ///
    /// Any partial state from a previous attempt is discarded. A positive
    /// idle timeout restarts the deadline from now; a zero timeout leaves
    /// the attempt without a deadline.
    pub fn listen(&mut self, expected_len: usize) {
        self.buffer.clear();
        self.expected_len = expected_len;
        self.listening = true;
        self.deadline = if self.idle_timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + self.idle_timeout)
        };
    }

    /// Whether a listen attempt is currently active
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Deadline of the active attempt, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Idle timeout applied to future listen attempts
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Change the idle timeout; takes effect on the next listen attempt
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Feed received bytes into the active attempt
    ///
    /// Returns the completion event if this chunk ended the attempt. Bytes
    /// after a completion within the same chunk are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Option<AssemblerEvent> {
        for &byte in chunk {
            if let Some(event) = self.push_byte(byte) {
                return Some(event);
            }
        }
        None
    }

    fn push_byte(&mut self, byte: u8) -> Option<AssemblerEvent> {
        if !self.listening {
            return None;
        }
        self.buffer.put_u8(byte);

        // Expected length reached: the frame is taken as-is, good or bad
        if self.buffer.len() >= self.expected_len {
            self.buffer.truncate(self.expected_len);
            return Some(self.complete());
        }

        // An exception response is always exactly 11 characters; decode
        // speculatively so a rejection surfaces before the full-length
        // response could have arrived
        if self.buffer.len() == MIN_FRAME_LEN && decode_frame(&self.buffer).is_ok() {
            return Some(self.complete());
        }

        None
    }

    /// End the active attempt because its idle deadline fired
    ///
    /// The attempt is over: buffered bytes are discarded and later bytes are
    /// ignored until the next listen.
    pub fn fire_deadline(&mut self) -> AssemblerEvent {
        self.abort();
        AssemblerEvent::Error(ModbusError::frame("Frame timeout"))
    }

    /// Cancel the active attempt without emitting a completion
    ///
    /// Used when the attempt is abandoned: the request could not be sent,
    /// the caller gave up waiting, or the link is going down.
    pub fn abort(&mut self) {
        self.listening = false;
        self.deadline = None;
        self.buffer.clear();
    }

    fn complete(&mut self) -> AssemblerEvent {
        self.listening = false;
        self.deadline = None;
        let frame = self.buffer.split();
        match decode_frame(&frame) {
            Ok(payload) => AssemblerEvent::Message(payload),
            // Any malformed completion is reported as a checksum failure;
            // the distinction is not observable on a half-duplex bus
            Err(_) => AssemblerEvent::Error(ModbusError::frame("Invalid checksum")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Read holding registers response: slave 0x11, FC03, 1 register = 0x000A
    const RESP_PAYLOAD: [u8; 5] = [0x11, 0x03, 0x02, 0x00, 0x0A];
    const RESP_FRAME: &[u8] = b":110302000AE0\r\n";

    // Exception response: slave 0x11, FC01 rejected with code 2
    const EXC_FRAME: &[u8] = b":1181026C\r\n";

    // ========================================================================
    // LRC Tests
    // ========================================================================

    #[test]
    fn test_lrc_known_vectors() {
        // Read request: slave 1, FC03, address 0, quantity 2
        assert_eq!(calculate_lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]), 0xFA);
        assert_eq!(calculate_lrc(&RESP_PAYLOAD), 0xE0);
        assert_eq!(calculate_lrc(&[0x11, 0x81, 0x02]), 0x6C);
    }

    #[test]
    fn test_lrc_wrapping_sum() {
        // Sum wraps at 8 bits before negation
        assert_eq!(calculate_lrc(&[0xFF, 0x01]), 0x00);
        assert_eq!(calculate_lrc(&[]), 0x00);
    }

    // ========================================================================
    // Encode / Decode Tests
    // ========================================================================

    #[test]
    fn test_encode_read_request() {
        let frame = encode_frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(frame, b":010300000002FA\r\n");
        assert_eq!(frame.len(), encoded_frame_len(6));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        assert!(encode_frame(&[0u8; MAX_PAYLOAD_SIZE + 1]).is_err());
    }

    #[test]
    fn test_short_payload_round_trip() {
        // Frames shorter than an exception response still decode; the
        // 11-character minimum belongs to the assembler's speculative
        // completion, not the codec
        let frame = encode_frame(&[0x05]).unwrap();
        assert_eq!(frame, b":05FB\r\n");
        assert_eq!(decode_frame(&frame).unwrap(), vec![0x05]);

        let empty = encode_frame(&[]).unwrap();
        assert_eq!(empty, b":00\r\n");
        assert_eq!(decode_frame(&empty).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_response_frame() {
        let payload = decode_frame(RESP_FRAME).unwrap();
        assert_eq!(payload, RESP_PAYLOAD);
    }

    #[test]
    fn test_decode_accepts_lowercase_hex() {
        let payload = decode_frame(b":110302000ae0\r\n").unwrap();
        assert_eq!(payload, RESP_PAYLOAD);
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let err = decode_frame(b":\n").unwrap_err();
        assert!(err.to_string().contains("too short"));

        // Delimiters alone carry no checksum to validate
        let err = decode_frame(b":\r\n").unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_decode_rejects_bad_start() {
        let mut frame = RESP_FRAME.to_vec();
        frame[0] = b';';
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_end() {
        let mut frame = RESP_FRAME.to_vec();
        frame[13] = b'X';
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_odd_interior() {
        // Drop one hex char so the interior length is odd
        let mut frame = RESP_FRAME.to_vec();
        frame.remove(5);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut frame = RESP_FRAME.to_vec();
        frame[4] = b'9'; // corrupt a data nibble
        let err = decode_frame(&frame).unwrap_err();
        assert!(err.to_string().contains("Invalid checksum"));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let payload = vec![0x11, 0x10, 0x00, 0x01, 0x00, 0x02];
        let frame = encode_frame(&payload).unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), payload);
    }

    // ========================================================================
    // Assembler Tests
    // ========================================================================

    fn armed_assembler(expected_len: usize) -> FrameAssembler {
        let mut assembler = FrameAssembler::new(Duration::from_millis(500));
        assembler.listen(expected_len);
        assembler
    }

    #[test]
    fn test_assembler_completes_full_frame() {
        let mut assembler = armed_assembler(RESP_FRAME.len());
        match assembler.push(RESP_FRAME) {
            Some(AssemblerEvent::Message(payload)) => assert_eq!(payload, RESP_PAYLOAD),
            other => panic!("Expected decoded message, got {:?}", other),
        }
        assert!(!assembler.is_listening());
        assert!(assembler.deadline().is_none());
    }

    #[test]
    fn test_assembler_byte_by_byte() {
        let mut assembler = armed_assembler(RESP_FRAME.len());
        for &byte in &RESP_FRAME[..RESP_FRAME.len() - 1] {
            assert!(assembler.push(&[byte]).is_none());
        }
        let event = assembler.push(&[RESP_FRAME[RESP_FRAME.len() - 1]]);
        assert!(matches!(event, Some(AssemblerEvent::Message(_))));
    }

    #[test]
    fn test_assembler_drops_bytes_when_idle() {
        let mut assembler = FrameAssembler::new(Duration::from_millis(500));
        assert!(assembler.push(RESP_FRAME).is_none());
        assert!(!assembler.is_listening());
    }

    #[test]
    fn test_assembler_exception_frame_completes_early() {
        // Armed for a full-length response but the slave rejects with an
        // 11-character exception frame
        let mut assembler = armed_assembler(RESP_FRAME.len());
        match assembler.push(EXC_FRAME) {
            Some(AssemblerEvent::Message(payload)) => {
                assert_eq!(payload, vec![0x11, 0x81, 0x02]);
            },
            other => panic!("Expected exception payload, got {:?}", other),
        }
    }

    #[test]
    fn test_assembler_keeps_listening_past_invalid_11_bytes() {
        // The first 11 bytes of a longer frame do not decode; the attempt
        // must continue to the expected length
        let mut assembler = armed_assembler(RESP_FRAME.len());
        assert!(assembler.push(&RESP_FRAME[..11]).is_none());
        assert!(assembler.is_listening());
        match assembler.push(&RESP_FRAME[11..]) {
            Some(AssemblerEvent::Message(payload)) => assert_eq!(payload, RESP_PAYLOAD),
            other => panic!("Expected decoded message, got {:?}", other),
        }
    }

    #[test]
    fn test_assembler_reports_corrupted_frame() {
        let mut corrupted = RESP_FRAME.to_vec();
        corrupted[4] = b'9';
        let mut assembler = armed_assembler(corrupted.len());
        match assembler.push(&corrupted) {
            Some(AssemblerEvent::Error(err)) => {
                assert!(err.to_string().contains("Invalid checksum"));
            },
            other => panic!("Expected checksum error, got {:?}", other),
        }
        assert!(!assembler.is_listening());
    }

    #[test]
    fn test_assembler_truncates_to_expected_length() {
        // An expected length shorter than the real frame cuts off the end
        // delimiters, so the attempt ends in a decode failure
        let mut assembler = armed_assembler(13);
        match assembler.push(RESP_FRAME) {
            Some(AssemblerEvent::Error(err)) => {
                assert!(err.to_string().contains("Invalid checksum"));
            },
            other => panic!("Expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn test_assembler_listen_resets_partial_state() {
        let mut assembler = armed_assembler(RESP_FRAME.len());
        assert!(assembler.push(b":11FF0").is_none());

        // Re-arming discards the partial buffer entirely
        assembler.listen(RESP_FRAME.len());
        match assembler.push(RESP_FRAME) {
            Some(AssemblerEvent::Message(payload)) => assert_eq!(payload, RESP_PAYLOAD),
            other => panic!("Expected decoded message, got {:?}", other),
        }
    }

    #[test]
    fn test_assembler_fired_deadline_ends_attempt() {
        let mut assembler = armed_assembler(RESP_FRAME.len());
        assert!(assembler.push(&RESP_FRAME[..4]).is_none());

        let event = assembler.fire_deadline();
        match event {
            AssemblerEvent::Error(err) => assert!(err.to_string().contains("Frame timeout")),
            other => panic!("Expected frame timeout, got {:?}", other),
        }
        assert!(!assembler.is_listening());
        assert!(assembler.deadline().is_none());

        // Late bytes after the deadline must not produce a second completion
        assert!(assembler.push(RESP_FRAME).is_none());
    }

    #[test]
    fn test_assembler_set_idle_timeout_applies_to_next_listen() {
        let mut assembler = FrameAssembler::new(Duration::from_millis(500));
        assembler.set_idle_timeout(Duration::from_millis(100));
        assert_eq!(assembler.idle_timeout(), Duration::from_millis(100));

        assembler.listen(11);
        assert!(assembler.deadline().is_some());
    }

    #[test]
    fn test_assembler_zero_idle_timeout_arms_no_deadline() {
        let mut assembler = FrameAssembler::new(Duration::ZERO);
        assembler.listen(RESP_FRAME.len());
        assert!(assembler.is_listening());
        assert!(assembler.deadline().is_none());

        // The attempt still completes normally when bytes arrive
        match assembler.push(RESP_FRAME) {
            Some(AssemblerEvent::Message(payload)) => assert_eq!(payload, RESP_PAYLOAD),
            other => panic!("Expected decoded message, got {:?}", other),
        }
    }
}
