//! Framing for serial CAN adapters that wrap each frame as `AA type id.. data.. 55`.
//!
//! The type byte carries the payload length in its low nibble, `0x10` for remote frames and
//! `0x20` for 29 bit identifiers. Standard identifiers take 2 bytes, extended ones 4, both little
//! endian.

use super::Framer;

/// A CAN frame received over a serial CAN adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanMessage {
    /// 11 or 29 bit identifier
    pub id: u32,
    /// Data bytes, up to 8
    pub payload: Vec<u8>,
    /// Remote transmission request
    pub is_remote: bool,
}

/// CAN frame state machine
#[derive(Debug, Clone, Default)]
pub enum CanFramer {
    /// Waiting for `0xAA`
    #[default]
    Start,
    /// Next byte is the type byte
    Type,
    /// Collecting identifier bytes
    Id {
        /// Frame built so far
        frame: CanMessage,
        /// Payload length from the type byte
        length: usize,
        /// Identifier bytes still to read
        remaining: u8,
        /// Identifier bytes read so far
        index: u8,
    },
    /// Collecting payload bytes
    Data {
        /// Frame built so far
        frame: CanMessage,
        /// Payload length from the type byte
        length: usize,
    },
    /// Waiting for the `0x55` terminator
    End(CanMessage),
}

impl CanFramer {
    fn after_id(frame: CanMessage, length: usize) -> Self {
        if length == 0 {
            Self::End(frame)
        } else {
            Self::Data { frame, length }
        }
    }
}

impl Framer for CanFramer {
    type Frame = CanMessage;

    fn step(self, byte: u8) -> (Self, Option<CanMessage>) {
        let next = match self {
            Self::Start if byte == 0xAA => Self::Type,
            Self::Start => Self::Start,
            Self::Type => {
                let length = ((byte & 0x0F) as usize).min(8);
                let frame = CanMessage {
                    id: 0,
                    payload: Vec::with_capacity(length),
                    is_remote: byte & 0x10 != 0,
                };
                let id_bytes = if byte & 0x20 != 0 { 4 } else { 2 };
                Self::Id {
                    frame,
                    length,
                    remaining: id_bytes,
                    index: 0,
                }
            }
            Self::Id {
                mut frame,
                length,
                remaining,
                index,
            } => {
                // Standard identifiers only use the low 3 bits of their second byte
                let value = if remaining == 1 && index == 1 { byte & 0x07 } else { byte };
                frame.id |= (value as u32) << (8 * index);
                if remaining == 1 {
                    Self::after_id(frame, length)
                } else {
                    Self::Id {
                        frame,
                        length,
                        remaining: remaining - 1,
                        index: index + 1,
                    }
                }
            }
            Self::Data { mut frame, length } => {
                frame.payload.push(byte);
                if frame.payload.len() == length {
                    Self::End(frame)
                } else {
                    Self::Data { frame, length }
                }
            }
            Self::End(frame) => {
                return if byte == 0x55 {
                    (Self::Start, Some(frame))
                } else {
                    (Self::Start, None)
                };
            }
        };
        (next, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::frames;

    fn decode(raw: &[u8]) -> Vec<CanMessage> {
        frames::<CanFramer, _>(raw.iter().copied()).collect()
    }

    #[test]
    fn standard_frames() {
        let full = decode(&[
            0xAA, 0xC8, 0x23, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x55,
        ]);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].id, 0x123);
        assert_eq!(full[0].payload, vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);

        let short = decode(&[0xAA, 0xC2, 0x23, 0x01, 0x11, 0x22, 0x55]);
        assert_eq!(short[0].id, 0x123);
        assert_eq!(short[0].payload, vec![0x11, 0x22]);
        assert!(!short[0].is_remote);
    }

    #[test]
    fn extended_frames() {
        let full = decode(&[
            0xAA, 0xE8, 0x67, 0x45, 0x23, 0x01, 1, 2, 3, 4, 5, 6, 7, 8, 0x55,
        ]);
        assert_eq!(full[0].id, 0x1234567);
        let short = decode(&[0xAA, 0xE2, 0x21, 0x30, 0x03, 0x01, 0x11, 0x22, 0x55]);
        assert_eq!(short[0].id, 0x1033021);
        assert_eq!(short[0].payload, vec![0x11, 0x22]);
    }

    #[test]
    fn bad_terminator_drops_frame() {
        let frames = decode(&[
            0xAA, 0xC1, 0x23, 0x01, 0x11, 0x54, 0xAA, 0xD0, 0x00, 0x07, 0x55,
        ]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 0x700);
        assert!(frames[0].is_remote);
        assert!(frames[0].payload.is_empty());
    }
}
