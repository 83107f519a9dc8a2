//! Block transfer wire format and the checksums that protect it.
//!
//! A block frame is laid out as
//! `[prio, dest, src, mode, copy_type, size_hi, size_lo, addr_hi, addr_mid, addr_lo,
//! payload.., sum_hi, sum_lo]`.
//! The sum is a 16 bit additive checksum (natural wraparound) starting at the copy type byte.
//!
//! Two checksum functions exist because two wire contexts sum slightly different ranges.
//! [legacy_block_checksum] stops at whichever comes first of the declared payload end and the
//! start of the trailing sum. [kernel_read_checksum] trusts the declared payload length. They
//! must stay separate.

use crc::{Algorithm, Crc};

use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    vpw::{device_id, mode, priority},
};

/// Bytes of header before the payload
pub const BLOCK_HEADER_LENGTH: usize = 10;
/// Header plus the trailing checksum
pub const BLOCK_OVERHEAD: usize = BLOCK_HEADER_LENGTH + 2;

/// What the PCM should do with a transferred block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockCopyType {
    /// Copy to RAM or flash
    Copy = 0x00,
    /// Execute after copying to RAM
    Execute = 0x80,
    /// Test a copy to flash without unlocking or writing
    TestWrite = 0x44,
}

const CRC_32_PCM: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0x0000_0000,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x89A1_897F,
    residue: 0x0000_0000,
};

const PCM_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_PCM);

/// CRC32 used by the kernel when asked for the CRC of a memory range
pub fn crc32(bytes: &[u8]) -> u32 {
    PCM_CRC.checksum(bytes)
}

/// Declared payload length (bytes 5 and 6) of a block frame, 0 if the frame is too short
pub fn payload_length(block: &[u8]) -> usize {
    if block.len() < 7 {
        return 0;
    }
    ((block[5] as usize) << 8) | block[6] as usize
}

/// Sum of bytes from offset 4 up to the declared payload end, never reading into the
/// trailing two checksum bytes
pub fn legacy_block_checksum(block: &[u8]) -> u16 {
    let end = (payload_length(block) + BLOCK_HEADER_LENGTH).min(block.len().saturating_sub(2));
    sum(block, 4, end)
}

/// Sum of bytes from offset 4 through the declared payload end (`payload_length + 10`).
/// Used to verify blocks read back from the kernel
pub fn kernel_read_checksum(block: &[u8]) -> u16 {
    let end = (payload_length(block) + BLOCK_HEADER_LENGTH).min(block.len());
    sum(block, 4, end)
}

fn sum(block: &[u8], start: usize, end: usize) -> u16 {
    if start >= end {
        return 0;
    }
    block[start..end]
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}

/// Writes the block checksum into the last two bytes.
///
/// The checksum is only written when the buffer is exactly `payload_length + 12` bytes long.
/// Any other length returns the block unchanged.
pub fn add_block_checksum(mut block: Vec<u8>) -> Vec<u8> {
    if block.len() < BLOCK_OVERHEAD || block.len() != payload_length(&block) + BLOCK_OVERHEAD {
        return block;
    }
    let len = block.len();
    let sum = sum(&block, 4, len - 2);
    block[len - 2] = (sum >> 8) as u8;
    block[len - 1] = sum as u8;
    block
}

/// Builds a block transfer frame carrying `payload[offset..offset + length]` for `address`.
///
/// If the slice runs past the end of `payload`, the missing bytes are sent as zeros
pub fn create_block_message(
    payload: &[u8],
    offset: usize,
    length: usize,
    address: u32,
    copy_type: BlockCopyType,
) -> Message {
    let mut buffer = Vec::with_capacity(length + BLOCK_OVERHEAD);
    buffer.extend_from_slice(&[
        priority::BLOCK,
        device_id::PCM,
        device_id::TOOL,
        mode::PCM_UPLOAD,
        copy_type as u8,
        (length >> 8) as u8,
        length as u8,
        (address >> 16) as u8,
        (address >> 8) as u8,
        address as u8,
    ]);
    let end = (offset + length).min(payload.len());
    if offset < end {
        buffer.extend_from_slice(&payload[offset..end]);
    }
    buffer.resize(length + BLOCK_OVERHEAD, 0);
    Message::new(add_block_checksum(buffer))
}

/// Parses a block read back from the kernel.
///
/// Template is `[6D F0 10 36]`. The address echoed in bytes 7..10 must match `address`.
/// Encoding byte 1 carries `length` raw bytes followed by the checksum; a checksum mismatch
/// returns the data with [ResponseStatus::Error]. Encoding byte 2 is a run of the single value
/// at byte 10.
pub fn parse_payload(message: &Message, length: usize, address: u32) -> Response<Vec<u8>> {
    let actual = message.bytes();
    let expected = [priority::BLOCK, device_id::TOOL, device_id::PCM, mode::PCM_UPLOAD];
    let status = crate::protocol::try_verify_initial_bytes(actual, &expected);
    if status != ResponseStatus::Success {
        return Response::failed(status);
    }
    if actual.len() < BLOCK_HEADER_LENGTH {
        return Response::failed(ResponseStatus::Truncated);
    }

    let raddr = ((actual[7] as u32) << 16) | ((actual[8] as u32) << 8) | actual[9] as u32;
    if raddr != address {
        log::debug!("Block read address mismatch, wanted {address:06X}, got {raddr:06X}");
        return Response::failed(ResponseStatus::UnexpectedResponse);
    }

    let rlen = payload_length(actual);
    match actual[4] {
        1 => {
            if rlen != length {
                return Response::failed(ResponseStatus::Truncated);
            }
            if actual.len() < rlen + BLOCK_OVERHEAD {
                return Response::failed(ResponseStatus::Truncated);
            }
            let data = actual[BLOCK_HEADER_LENGTH..BLOCK_HEADER_LENGTH + rlen].to_vec();
            let valid_sum = kernel_read_checksum(actual);
            let payload_sum =
                ((actual[rlen + BLOCK_HEADER_LENGTH] as u16) << 8) | actual[rlen + 11] as u16;
            if payload_sum != valid_sum {
                log::warn!(
                    "Block checksum mismatch, expected {valid_sum:04X}, got {payload_sum:04X}"
                );
                return Response::create(ResponseStatus::Error, data);
            }
            Response::create(ResponseStatus::Success, data)
        }
        2 => {
            if actual.len() < BLOCK_HEADER_LENGTH + 1 {
                return Response::failed(ResponseStatus::Truncated);
            }
            let data = vec![actual[BLOCK_HEADER_LENGTH]; length];
            if rlen != length {
                return Response::create(ResponseStatus::Truncated, data);
            }
            Response::create(ResponseStatus::Success, data)
        }
        other => {
            log::debug!("Unknown block encoding {other:02X}");
            Response::failed(ResponseStatus::UnexpectedResponse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_message_layout() {
        let payload = [0x11, 0x22, 0x33, 0x44];
        let m = create_block_message(&payload, 1, 2, 0xFF8000, BlockCopyType::Execute);
        assert_eq!(
            m.bytes(),
            &[0x6D, 0x10, 0xF0, 0x36, 0x80, 0x00, 0x02, 0xFF, 0x80, 0x00, 0x22, 0x33, 0x02, 0x56]
        );
    }

    #[test]
    fn checksum_round_trip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(600).collect();
        let m = create_block_message(&payload, 0, payload.len(), 0x001000, BlockCopyType::Copy);
        let bytes = m.bytes();
        let written = ((bytes[bytes.len() - 2] as u16) << 8) | bytes[bytes.len() - 1] as u16;
        assert_eq!(written, kernel_read_checksum(bytes));
        assert_eq!(written, legacy_block_checksum(bytes));

        let mut corrupted = bytes.to_vec();
        corrupted[20] ^= 0x01;
        assert_ne!(kernel_read_checksum(&corrupted), written);
    }

    #[test]
    fn add_checksum_requires_exact_length() {
        // Declares 2 payload bytes but carries 3
        let odd = vec![0x6D, 0x10, 0xF0, 0x36, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 1, 2, 3, 0, 0];
        assert_eq!(add_block_checksum(odd.clone()), odd);
        assert_eq!(add_block_checksum(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn checksum_variants_differ_on_short_frames() {
        // Declared length runs past the end of the buffer
        let block = [0x6D, 0xF0, 0x10, 0x36, 0x01, 0x00, 0x04, 0x00, 0x10, 0x00, 0x05, 0x06, 0x07];
        assert_eq!(legacy_block_checksum(&block), 0x01 + 0x04 + 0x10 + 0x05);
        assert_eq!(kernel_read_checksum(&block), 0x01 + 0x04 + 0x10 + 0x05 + 0x06 + 0x07);
    }

    fn read_reply(data: &[u8], address: u32) -> Vec<u8> {
        let mut v = vec![
            0x6D,
            0xF0,
            0x10,
            0x36,
            0x01,
            (data.len() >> 8) as u8,
            data.len() as u8,
            (address >> 16) as u8,
            (address >> 8) as u8,
            address as u8,
        ];
        v.extend_from_slice(data);
        v.extend_from_slice(&[0, 0]);
        let sum = kernel_read_checksum(&v);
        let len = v.len();
        v[len - 2] = (sum >> 8) as u8;
        v[len - 1] = sum as u8;
        v
    }

    #[test]
    fn parse_normal_payload() {
        let reply = Message::new(read_reply(&[1, 2, 3, 4], 0x002000));
        let r = parse_payload(&reply, 4, 0x002000);
        assert_eq!(r, Response::create(ResponseStatus::Success, vec![1, 2, 3, 4]));

        assert_eq!(parse_payload(&reply, 4, 0x002001).status(), ResponseStatus::UnexpectedResponse);
        assert_eq!(parse_payload(&reply, 8, 0x002000).status(), ResponseStatus::Truncated);
    }

    #[test]
    fn parse_payload_bad_checksum_keeps_data() {
        let mut bytes = read_reply(&[1, 2, 3, 4], 0x002000);
        let len = bytes.len();
        bytes[len - 1] ^= 0xFF;
        let r = parse_payload(&Message::new(bytes), 4, 0x002000);
        assert_eq!(r.status(), ResponseStatus::Error);
        assert_eq!(r.value(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn parse_rle_payload() {
        let bytes = vec![
            0x6D, 0xF0, 0x10, 0x36, 0x02, 0x00, 0x08, 0x00, 0x30, 0x00, 0xFF, 0x00, 0x00,
        ];
        let r = parse_payload(&Message::new(bytes.clone()), 8, 0x003000);
        assert_eq!(r, Response::create(ResponseStatus::Success, vec![0xFF; 8]));
        assert_eq!(
            parse_payload(&Message::new(bytes), 16, 0x003000).status(),
            ResponseStatus::Truncated
        );
    }

    #[test]
    fn parse_payload_templates() {
        let short = Message::new(vec![0x6D, 0xF0, 0x10]);
        assert_eq!(parse_payload(&short, 4, 0).status(), ResponseStatus::Truncated);
        let header_only = Message::new(vec![0x6D, 0xF0, 0x10, 0x36, 0x01, 0x00]);
        assert_eq!(parse_payload(&header_only, 4, 0).status(), ResponseStatus::Truncated);
        let wrong = Message::new(vec![0x6C, 0xF0, 0x10, 0x36, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(parse_payload(&wrong, 0, 0).status(), ResponseStatus::UnexpectedResponse);
    }

    #[test]
    fn crc_matches_reference() {
        assert_eq!(crc32(b"123456789"), 0x89A1_897F);
        assert_eq!(crc32(&[]), 0);
    }
}
