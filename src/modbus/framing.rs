//! RTU response framing for the serial side of the link.
//!
//! Bytes from the line are accumulated until a complete response frame is
//! present, which is then reduced to the payload the scheduler consumes
//! (device address, function code, byte count and CRC stripped).

use log::{debug, warn};
use std::time::{Duration, Instant};

use super::crc::frame_crc_ok;
use super::protocol::FunctionCode;
use crate::utils::error::ModbusError;

/// Partial frames idle for longer than this are discarded.
pub const INTER_FRAME_GAP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResponseFrame {
    /// Register data of a read, or echoed address/count of a write.
    Payload(Vec<u8>),
    /// Exception response (`fc | 0x80`).
    Exception { function: u8, code: u8 },
}

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    Incomplete,
    Complete { len: usize, frame: ResponseFrame },
    Garbage,
}

pub struct ResponseAssembler {
    slave: u8,
    buffer: Vec<u8>,
    last_byte_at: Option<Instant>,
}

impl ResponseAssembler {
    pub fn new(slave: u8) -> Self {
        Self {
            slave,
            buffer: Vec::with_capacity(64),
            last_byte_at: None,
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds freshly received bytes and returns the payload of every complete
    /// frame addressed to our slave. Exception responses come back as
    /// `ModbusError::DeviceException`.
    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Vec<Result<Vec<u8>, ModbusError>> {
        if let Some(last) = self.last_byte_at {
            if !self.buffer.is_empty() && now.duration_since(last) > INTER_FRAME_GAP {
                debug!("Dropping {} stale bytes: {}", self.buffer.len(), hex::encode(&self.buffer));
                self.buffer.clear();
            }
        }
        if !bytes.is_empty() {
            self.last_byte_at = Some(now);
        }
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            match scan(&self.buffer) {
                Scan::Incomplete => break,
                Scan::Garbage => {
                    self.buffer.remove(0);
                }
                Scan::Complete { len, frame } => {
                    if !frame_crc_ok(&self.buffer[..len]) {
                        // Misaligned on a noise byte; resync one byte further on.
                        warn!("CRC mismatch on response frame: {}", hex::encode(&self.buffer[..len]));
                        frames.push(Err(ModbusError::CrcError));
                        self.buffer.remove(0);
                        continue;
                    }
                    let raw: Vec<u8> = self.buffer.drain(..len).collect();
                    if raw[0] != self.slave {
                        debug!("Ignoring frame for address {}: {}", raw[0], hex::encode(&raw));
                        continue;
                    }
                    frames.push(match frame {
                        ResponseFrame::Payload(payload) => Ok(payload),
                        ResponseFrame::Exception { function, code } => {
                            Err(ModbusError::DeviceException { function, code })
                        }
                    });
                }
            }
        }
        frames
    }
}

fn scan(buf: &[u8]) -> Scan {
    if buf.len() < 2 {
        return Scan::Incomplete;
    }
    let function = buf[1];

    if function & 0x80 != 0 {
        // addr, fc, code, crc(2)
        if buf.len() < 5 {
            return Scan::Incomplete;
        }
        return Scan::Complete {
            len: 5,
            frame: ResponseFrame::Exception {
                function: function & 0x7F,
                code: buf[2],
            },
        };
    }

    match FunctionCode::from_code(function) {
        Some(FunctionCode::ReadHoldingRegisters) | Some(FunctionCode::ReadInputRegisters) => {
            if buf.len() < 3 {
                return Scan::Incomplete;
            }
            let byte_count = buf[2] as usize;
            let len = 3 + byte_count + 2;
            if buf.len() < len {
                return Scan::Incomplete;
            }
            Scan::Complete {
                len,
                frame: ResponseFrame::Payload(buf[3..3 + byte_count].to_vec()),
            }
        }
        Some(FunctionCode::WriteMultipleRegisters) => {
            // addr, fc, addrHi, addrLo, countHi, countLo, crc(2)
            if buf.len() < 8 {
                return Scan::Incomplete;
            }
            Scan::Complete {
                len: 8,
                frame: ResponseFrame::Payload(buf[2..6].to_vec()),
            }
        }
        None => Scan::Garbage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::crc::append_crc;

    fn framed(bytes: &[u8]) -> Vec<u8> {
        let mut frame = bytes.to_vec();
        append_crc(&mut frame);
        frame
    }

    #[test]
    fn test_read_response_payload_is_stripped() {
        let mut assembler = ResponseAssembler::new(30);
        let raw = framed(&[30, 0x03, 0x04, 0x00, 0x64, 0xFF, 0x38]);
        let frames = assembler.push(&raw, Instant::now());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().ok(), Some(&vec![0x00, 0x64, 0xFF, 0x38]));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut assembler = ResponseAssembler::new(30);
        let raw = framed(&[30, 0x04, 0x02, 0x01, 0x02]);
        let now = Instant::now();
        assert!(assembler.push(&raw[..3], now).is_empty());
        let frames = assembler.push(&raw[3..], now + Duration::from_millis(5));
        assert_eq!(frames.len(), 1);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_write_response_payload() {
        let mut assembler = ResponseAssembler::new(30);
        let raw = framed(&[30, 0x10, 0x03, 0xEC, 0x00, 0x01]);
        let frames = assembler.push(&raw, Instant::now());
        assert_eq!(frames[0].as_ref().ok(), Some(&vec![0x03, 0xEC, 0x00, 0x01]));
    }

    #[test]
    fn test_exception_response() {
        let mut assembler = ResponseAssembler::new(30);
        let raw = framed(&[30, 0x83, 0x02]);
        let frames = assembler.push(&raw, Instant::now());
        assert!(matches!(
            frames[0],
            Err(ModbusError::DeviceException { function: 0x03, code: 0x02 })
        ));
    }

    #[test]
    fn test_bad_crc_reported() {
        let mut assembler = ResponseAssembler::new(30);
        let mut raw = framed(&[30, 0x03, 0x02, 0x00, 0x01]);
        raw[4] = 0x02;
        let frames = assembler.push(&raw, Instant::now());
        assert!(matches!(frames[0], Err(ModbusError::CrcError)));
    }

    #[test]
    fn test_other_slave_ignored() {
        let mut assembler = ResponseAssembler::new(30);
        let raw = framed(&[31, 0x03, 0x02, 0x00, 0x01]);
        assert!(assembler.push(&raw, Instant::now()).is_empty());
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_stale_partial_frame_discarded() {
        let mut assembler = ResponseAssembler::new(30);
        let now = Instant::now();
        assembler.push(&[30, 0x03, 0x04, 0x00], now);
        let raw = framed(&[30, 0x03, 0x02, 0x00, 0x07]);
        let frames = assembler.push(&raw, now + Duration::from_millis(200));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().ok(), Some(&vec![0x00, 0x07]));
    }

    #[test]
    fn test_leading_garbage_skipped() {
        let mut assembler = ResponseAssembler::new(30);
        let mut raw = vec![0x00, 0x55];
        raw.extend(framed(&[30, 0x04, 0x02, 0x00, 0x09]));
        let frames = assembler.push(&raw, Instant::now());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
    }

    #[test]
    fn test_resync_after_noise_byte_before_response() {
        // Slave 16 doubles as the write function code, so the noise byte
        // makes the buffer look like a write acknowledgement at first.
        let mut assembler = ResponseAssembler::new(16);
        let mut raw = vec![0x00];
        raw.extend(framed(&[16, 0x03, 0x04, 0x00, 0x64, 0xFF, 0x38]));
        let frames = assembler.push(&raw, Instant::now());
        assert!(matches!(frames[0], Err(ModbusError::CrcError)));
        assert_eq!(
            frames.last().and_then(|f| f.as_ref().ok()),
            Some(&vec![0x00, 0x64, 0xFF, 0x38])
        );
        assert_eq!(assembler.pending(), 0);
    }
}
