//! Wire framing for XBee API mode 1 and 2.
//!
//! A frame is `0x7E`, a big-endian length, the frame data and a checksum.
//! In API mode 2 every byte after the start delimiter that collides with a
//! control character is escaped as `0x7D, byte ^ 0x20`.

use crate::utils::error::{Result, SensorNetError};

pub const START_DELIMITER: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
const XON: u8 = 0x11;
const XOFF: u8 = 0x13;
const ESCAPE_MASK: u8 = 0x20;

fn needs_escape(byte: u8) -> bool {
    matches!(byte, START_DELIMITER | ESCAPE | XON | XOFF)
}

pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// Encodes frame data into a complete frame ready for the serial line.
pub fn encode(data: &[u8], escaped: bool) -> Result<Vec<u8>> {
    let len = u16::try_from(data.len()).map_err(|_| SensorNetError::FrameError {
        message: format!("frame data too long ({} bytes)", data.len()),
    })?;

    let mut body = Vec::with_capacity(data.len() + 3);
    body.extend_from_slice(&len.to_be_bytes());
    body.extend_from_slice(data);
    body.push(checksum(data));

    let mut out = Vec::with_capacity(body.len() * 2 + 1);
    out.push(START_DELIMITER);
    for byte in body {
        if escaped && needs_escape(byte) {
            out.push(ESCAPE);
            out.push(byte ^ ESCAPE_MASK);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Incremental decoder fed with whatever the transport hands us.
#[derive(Debug)]
pub struct FrameDecoder {
    escaped: bool,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(escaped: bool) -> Self {
        Self {
            escaped,
            buffer: Vec::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete frame's data, or `None` when more input is needed.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        match self.buffer.iter().position(|b| *b == START_DELIMITER) {
            Some(0) => {}
            Some(pos) => {
                tracing::debug!("Discarding {} bytes before start delimiter", pos);
                self.buffer.drain(..pos);
            }
            None => {
                self.buffer.clear();
                return None;
            }
        }

        let (body, consumed) = match self.unescape_frame() {
            Ok(Some(found)) => found,
            Ok(None) => return None,
            Err(e) => {
                // Drop the delimiter so the next call resynchronises.
                self.buffer.drain(..1);
                return Some(Err(e));
            }
        };
        self.buffer.drain(..consumed);

        let data = &body[2..body.len() - 1];
        let expected = body[body.len() - 1];
        if checksum(data) != expected {
            return Some(Err(SensorNetError::FrameError {
                message: format!(
                    "checksum mismatch (got {:#04x}, expected {:#04x})",
                    expected,
                    checksum(data)
                ),
            }));
        }
        Some(Ok(data.to_vec()))
    }

    /// Unescapes length, data and checksum of the frame at the head of the buffer.
    /// Returns the unescaped body and how many raw bytes it spans.
    fn unescape_frame(&self) -> Result<Option<(Vec<u8>, usize)>> {
        let mut body = Vec::new();
        let mut expected_len: Option<usize> = None;
        let mut i = 1;

        while i < self.buffer.len() {
            let mut byte = self.buffer[i];
            if byte == START_DELIMITER && self.escaped {
                return Err(SensorNetError::FrameError {
                    message: "unexpected start delimiter inside frame".to_string(),
                });
            }
            if self.escaped && byte == ESCAPE {
                if i + 1 >= self.buffer.len() {
                    return Ok(None);
                }
                i += 1;
                byte = self.buffer[i] ^ ESCAPE_MASK;
            }
            body.push(byte);
            i += 1;

            if body.len() == 2 {
                expected_len = Some(u16::from_be_bytes([body[0], body[1]]) as usize);
            }
            if let Some(len) = expected_len {
                if body.len() == len + 3 {
                    return Ok(Some((body, i)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_matches_datasheet_example() {
        // AT command "NJ" with frame id 0x52
        let data = [0x08, 0x52, 0x4E, 0x4A];
        assert_eq!(checksum(&data), 0x0D);
    }

    #[test]
    fn test_encode_unescaped() {
        let frame = encode(&[0x08, 0x52, 0x4E, 0x4A], false).unwrap();
        assert_eq!(frame, vec![0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]);
    }

    #[test]
    fn test_encode_escapes_control_bytes() {
        let frame = encode(&[0x7E, 0x11], true).unwrap();
        // length 0x0002, checksum 0xFF - 0x8F = 0x70
        assert_eq!(frame, vec![0x7E, 0x00, 0x02, 0x7D, 0x5E, 0x7D, 0x31, 0x70]);
    }

    #[test]
    fn test_decoder_handles_split_input_and_noise() {
        let frame = encode(&[0x90, 0x13, 0x7D, 0x01], true).unwrap();
        let mut decoder = FrameDecoder::new(true);
        decoder.push(&[0x00, 0xFF]);
        let (head, tail) = frame.split_at(4);
        decoder.push(head);
        assert!(decoder.next_frame().is_none());
        decoder.push(tail);
        let data = decoder.next_frame().unwrap().unwrap();
        assert_eq!(data, vec![0x90, 0x13, 0x7D, 0x01]);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decoder_reports_bad_checksum_then_recovers() {
        let mut bad = encode(&[0x8A, 0x00], false).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        let good = encode(&[0x8A, 0x06], false).unwrap();

        let mut decoder = FrameDecoder::new(false);
        decoder.push(&bad);
        decoder.push(&good);
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(SensorNetError::FrameError { .. }))
        ));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x8A, 0x06]);
    }

    #[test]
    fn test_decoder_yields_consecutive_frames() {
        let mut decoder = FrameDecoder::new(true);
        decoder.push(&encode(&[0x8A, 0x00], true).unwrap());
        decoder.push(&encode(&[0x8A, 0x02], true).unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x8A, 0x00]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x8A, 0x02]);
        assert!(decoder.next_frame().is_none());
    }
}
