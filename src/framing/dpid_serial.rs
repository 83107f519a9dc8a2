//! Framing for serial DPID loggers.
//!
//! Each frame is a `0xFF` marker, a 4 byte big endian message id, a `0xFE` marker and 8 payload
//! bytes.

use super::Framer;

/// Number of payload bytes in a frame
pub const PAYLOAD_LENGTH: usize = 8;

/// One frame from a serial DPID logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialLogFrame {
    /// Message id
    pub id: u32,
    /// Payload
    pub payload: [u8; PAYLOAD_LENGTH],
}

/// Serial DPID frame state machine
#[derive(Debug, Clone, Default)]
pub enum DpidSerialFramer {
    /// Waiting for `0xFF`
    #[default]
    Start,
    /// Collecting the id. Holds the id so far and how many bytes were read
    Id(u32, u8),
    /// Id complete, waiting for `0xFE`
    Separator(u32),
    /// Collecting payload. Holds the id, the payload and how many bytes were read
    Payload(u32, [u8; PAYLOAD_LENGTH], usize),
}

impl Framer for DpidSerialFramer {
    type Frame = SerialLogFrame;

    fn step(self, byte: u8) -> (Self, Option<SerialLogFrame>) {
        let next = match self {
            Self::Start if byte == 0xFF => Self::Id(0, 0),
            Self::Start => Self::Start,
            Self::Id(id, count) => {
                let id = (id << 8) | byte as u32;
                if count == 3 {
                    Self::Separator(id)
                } else {
                    Self::Id(id, count + 1)
                }
            }
            Self::Separator(id) if byte == 0xFE => Self::Payload(id, [0; PAYLOAD_LENGTH], 0),
            Self::Separator(_) => Self::Start,
            Self::Payload(id, mut payload, count) => {
                payload[count] = byte;
                if count + 1 == PAYLOAD_LENGTH {
                    return (Self::Start, Some(SerialLogFrame { id, payload }));
                }
                Self::Payload(id, payload, count + 1)
            }
        };
        (next, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{FrameReader, frames};

    #[test]
    fn frame_after_noise() {
        let raw = [
            0x12, 0x34, 0xFF, 0x00, 0x00, 0x01, 0x23, 0xFE, 1, 2, 3, 4, 5, 6, 7, 8,
        ];
        let decoded: Vec<SerialLogFrame> = frames::<DpidSerialFramer, _>(raw).collect();
        assert_eq!(
            decoded,
            vec![SerialLogFrame {
                id: 0x123,
                payload: [1, 2, 3, 4, 5, 6, 7, 8]
            }]
        );
    }

    #[test]
    fn missing_separator_aborts() {
        let mut reader = FrameReader::<DpidSerialFramer>::new();
        assert!(reader.push_all(&[0xFF, 0, 0, 0, 1, 0x00]).is_empty());
        // Back in the start state, so this is a whole new frame
        let frames = reader.push_all(&[0xFF, 0, 0, 0, 2, 0xFE, 9, 9, 9, 9, 9, 9, 9, 9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 2);
    }
}
