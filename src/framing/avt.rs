//! AVT packet framing.
//!
//! Every packet from an AVT adapter starts with a header byte. `0x11 len` and `0x12 len_hi len_lo`
//! carry explicit lengths, otherwise the high nibble is the packet type and the low nibble the
//! length. Bus frames carry a status byte ahead of the payload, which is checked and dropped.

use super::Framer;
use crate::utility::to_hex;

/// A packet decoded from an AVT adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvtFrame {
    /// Bus frame or adapter reply, header and status removed
    Packet(Vec<u8>),
    /// The adapter rejected a command. Holds the start of the rejected command
    Rejected(Vec<u8>),
}

/// AVT packet state machine
#[derive(Debug, Clone, Default)]
pub enum AvtFramer {
    /// Waiting for a header byte
    #[default]
    Start,
    /// Seen `0x11`, next byte is the length
    ShortLength,
    /// Seen `0x12`, next byte is the high length byte
    LongLengthHigh,
    /// Next byte is the low length byte
    LongLengthLow(usize),
    /// Next byte is the status byte, then this many payload bytes
    Status(usize),
    /// Collecting payload
    Payload {
        /// Bytes still to read
        remaining: usize,
        /// Bytes read so far
        data: Vec<u8>,
    },
    /// Collecting the echo of a rejected command
    Rejected {
        /// Bytes still to read
        remaining: usize,
        /// Bytes read so far
        data: Vec<u8>,
    },
}

impl AvtFramer {
    /// State after the length is known. `with_status` packets spend one length byte on status
    fn begin(length: usize, with_status: bool) -> (Self, Option<AvtFrame>) {
        if with_status {
            return match length {
                0 => {
                    log::debug!("Not reading 0 byte packet");
                    (Self::Start, None)
                }
                len => (Self::Status(len - 1), None),
            };
        }
        Self::payload(length)
    }

    fn payload(length: usize) -> (Self, Option<AvtFrame>) {
        if length == 0 {
            log::debug!("Not reading 0 byte packet");
            return (Self::Start, None);
        }
        (
            Self::Payload {
                remaining: length,
                data: Vec::with_capacity(length),
            },
            None,
        )
    }

    fn header(byte: u8) -> (Self, Option<AvtFrame>) {
        let length = (byte & 0x0F) as usize;
        match byte {
            0x11 => (Self::ShortLength, None),
            0x12 => (Self::LongLengthHigh, None),
            _ => match byte >> 4 {
                // Bus frames, 0xF on the 838 and 0x0 on the 842/852
                0xF | 0x0 => Self::begin(length, true),
                // Filter, init, version and speed change replies
                0x2 | 0x6 | 0x9 | 0xC => Self::begin(length, false),
                0x3 => match length {
                    0 => (Self::Start, Some(AvtFrame::Rejected(Vec::new()))),
                    _ => (
                        Self::Rejected {
                            remaining: length,
                            data: Vec::with_capacity(length),
                        },
                        None,
                    ),
                },
                // High speed notification, the length includes the header
                0x8 => Self::begin(length.saturating_sub(1), false),
                kind => {
                    log::warn!("Unhandled AVT packet type {kind:X}");
                    (Self::Start, None)
                }
            },
        }
    }
}

impl Framer for AvtFramer {
    type Frame = AvtFrame;

    fn step(self, byte: u8) -> (Self, Option<AvtFrame>) {
        match self {
            Self::Start => Self::header(byte),
            Self::ShortLength => Self::begin(byte as usize, true),
            Self::LongLengthHigh => (Self::LongLengthLow((byte as usize) << 8), None),
            Self::LongLengthLow(high) => Self::begin(high | byte as usize, true),
            Self::Status(length) => {
                if byte != 0 {
                    log::warn!("Bad AVT packet status: {byte:02X}");
                }
                Self::payload(length)
            }
            Self::Payload {
                remaining,
                mut data,
            } => {
                data.push(byte);
                if remaining == 1 {
                    (Self::Start, Some(AvtFrame::Packet(data)))
                } else {
                    (
                        Self::Payload {
                            remaining: remaining - 1,
                            data,
                        },
                        None,
                    )
                }
            }
            Self::Rejected {
                remaining,
                mut data,
            } => {
                data.push(byte);
                if remaining == 1 {
                    log::debug!(
                        "Invalid command. Packet that began with {} was rejected by the AVT",
                        to_hex(&data)
                    );
                    (Self::Start, Some(AvtFrame::Rejected(data)))
                } else {
                    (
                        Self::Rejected {
                            remaining: remaining - 1,
                            data,
                        },
                        None,
                    )
                }
            }
        }
    }
}

/// Prefixes a frame with the AVT length header for sending
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let length = payload.len();
    let mut out = Vec::with_capacity(length + 3);
    if length > 0xFF {
        out.extend_from_slice(&[0x12, (length >> 8) as u8, length as u8]);
    } else if length > 0x0F {
        out.extend_from_slice(&[0x11, length as u8]);
    } else {
        out.push(length as u8);
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{FrameReader, frames};

    #[test]
    fn long_bus_frame_drops_status() {
        let raw = [
            0x11, 0x0C, 0x00, 0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59,
            0xC3,
        ];
        let decoded: Vec<AvtFrame> = frames::<AvtFramer, _>(raw).collect();
        assert_eq!(
            decoded,
            vec![AvtFrame::Packet(vec![
                0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59
            ])]
        );
    }

    #[test]
    fn short_and_adapter_packets() {
        let mut reader = FrameReader::<AvtFramer>::new();
        // 852 reset reply, no status
        assert_eq!(reader.push_all(&[0x91, 0x27]), vec![AvtFrame::Packet(vec![0x27])]);
        // Short bus frame with status
        assert_eq!(
            reader.push_all(&[0x04, 0x00, 0x6C, 0xF0, 0x10]),
            vec![AvtFrame::Packet(vec![0x6C, 0xF0, 0x10])]
        );
        // Filter acknowledgement
        assert_eq!(
            reader.push_all(&[0x62, 0x5B, 0xF0]),
            vec![AvtFrame::Packet(vec![0x5B, 0xF0])]
        );
        // 4x notification, one byte shorter than the nibble says
        assert_eq!(
            reader.push_all(&[0x83, 0x00, 0x20]),
            vec![AvtFrame::Packet(vec![0x00, 0x20])]
        );
    }

    #[test]
    fn two_byte_length() {
        let mut raw = vec![0x12, 0x01, 0x01, 0x00];
        raw.extend(std::iter::repeat_n(0xAB, 0x100));
        let decoded: Vec<AvtFrame> = frames::<AvtFramer, _>(raw).collect();
        assert_eq!(decoded.len(), 1);
        assert!(matches!(&decoded[0], AvtFrame::Packet(data) if data.len() == 0x100));
    }

    #[test]
    fn rejected_and_unknown() {
        let mut reader = FrameReader::<AvtFramer>::new();
        assert_eq!(reader.push_all(&[0x31, 0xE1]), vec![AvtFrame::Rejected(vec![0xE1])]);
        // Unknown type resets, zero length status packet resets
        assert!(reader.push_all(&[0x45, 0x00]).is_empty());
        assert_eq!(reader.push_all(&[0x92, 0x04, 0x15]), vec![AvtFrame::Packet(vec![0x04, 0x15])]);
    }

    #[test]
    fn length_headers() {
        assert_eq!(
            encode(&[0x6C, 0x10, 0xF0, 0x3C, 0x01]),
            vec![0x05, 0x6C, 0x10, 0xF0, 0x3C, 0x01]
        );
        assert_eq!(&encode(&[0u8; 0x20])[..2], &[0x11, 0x20]);
        assert_eq!(&encode(&[0u8; 0x1010])[..3], &[0x12, 0x10, 0x10]);
    }
}
