//! Upload permission, memory reads and flash write replies.
//!
//! Block frames themselves are built and parsed in [crate::block].

use super::do_simple_validation;
use crate::{
    message::Message,
    pcm_info::{HardwareType, PcmInfo},
    response::Response,
    vpw::{device_id, mode, priority, submode},
};

/// Asks permission to upload `size` bytes to the kernel base address of `info`.
///
/// P10 and P12 PCMs only accept the bare request without size or address
pub fn create_upload_request(info: &PcmInfo, size: usize) -> Message {
    let header = [
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::PCM_UPLOAD_REQUEST,
    ];
    match info.hardware_type {
        HardwareType::P10 | HardwareType::P12 => Message::new(header.to_vec()),
        _ => {
            let address = info.kernel_base_address;
            let mut bytes = header.to_vec();
            bytes.extend_from_slice(&[
                submode::NULL,
                (size >> 8) as u8,
                size as u8,
                (address >> 16) as u8,
                (address >> 8) as u8,
                address as u8,
            ]);
            Message::new(bytes)
        }
    }
}

/// Parses the reply to [create_upload_request]
pub fn parse_upload_permission(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::PCM_UPLOAD_REQUEST, &[])
}

/// Parses the reply to a block upload
pub fn parse_upload_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::BLOCK, mode::PCM_UPLOAD, &[])
}

/// Asks the kernel to send `length` bytes starting at `start_address`.
///
/// Addresses above 24 bits use the 32 bit read mode
pub fn create_read_request(start_address: u32, length: usize) -> Message {
    let mut bytes = vec![priority::BLOCK, device_id::PCM, device_id::TOOL];
    if start_address > 0xFF_FFFF {
        bytes.extend_from_slice(&[mode::READ_MEMORY_32, 0x01, (length >> 8) as u8, length as u8]);
        bytes.extend_from_slice(&start_address.to_be_bytes());
    } else {
        bytes.extend_from_slice(&[
            mode::READ_MEMORY,
            0x01,
            (length >> 8) as u8,
            length as u8,
            (start_address >> 16) as u8,
            (start_address >> 8) as u8,
            start_address as u8,
        ]);
    }
    Message::new(bytes)
}

/// Parses the acknowledgement sent before the block of a read
pub fn parse_read_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::READ_MEMORY, &[])
}

/// Parses the reply to a flash chunk write
pub fn parse_chunk_write_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::PCM_UPLOAD, &[0x00, 0x73])
}

/// Parses the reply to a flash lock request
pub fn parse_flash_lock_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::PCM_UPLOAD, &[0xE0, 0x80])
}

/// Parses the kernel's reply to a reset request
pub fn parse_write_kernel_reset_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::PCM_UPLOAD, &[0xE0, 0xAA])
}

/// Parses the message a flash kernel sends when it starts
pub fn parse_flash_kernel_success_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::PCM_UPLOAD, &[0xE0, 0x60])
}

/// Parses the reply to a full flash read start request
pub fn parse_start_full_flash_response(message: &Message) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::READ_BLOCK, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseStatus;

    #[test]
    fn upload_request_by_hardware() {
        let p01 = PcmInfo::new(12593358);
        assert_eq!(
            create_upload_request(&p01, 0x1000).bytes(),
            &[0x6C, 0x10, 0xF0, 0x34, 0x00, 0x10, 0x00, 0xFF, 0x80, 0x00]
        );
        let mut p12 = PcmInfo::new(12593358);
        p12.hardware_type = HardwareType::P12;
        assert_eq!(create_upload_request(&p12, 0x1000).bytes(), &[0x6C, 0x10, 0xF0, 0x34]);
    }

    #[test]
    fn read_request_address_width() {
        assert_eq!(
            create_read_request(0x012345, 0x0400).bytes(),
            &[0x6D, 0x10, 0xF0, 0x35, 0x01, 0x04, 0x00, 0x01, 0x23, 0x45]
        );
        assert_eq!(
            create_read_request(0x01000000, 0x0010).bytes(),
            &[0x6D, 0x10, 0xF0, 0x37, 0x01, 0x00, 0x10, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn simple_replies() {
        let permission = Message::new(vec![0x6C, 0xF0, 0x10, 0x74, 0x00]);
        assert!(parse_upload_permission(&permission).is_success());
        let refused = Message::new(vec![0x6C, 0xF0, 0x10, 0x7F, 0x34, 0x00]);
        assert_eq!(parse_upload_permission(&refused).status(), ResponseStatus::Refused);

        let upload = Message::new(vec![0x6D, 0xF0, 0x10, 0x76]);
        assert!(parse_upload_response(&upload).is_success());

        let chunk = Message::new(vec![0x6C, 0xF0, 0x10, 0x76, 0x00, 0x73]);
        assert!(parse_chunk_write_response(&chunk).is_success());
        let bad_chunk = Message::new(vec![0x6C, 0xF0, 0x10, 0x76, 0x00, 0x74]);
        assert_eq!(
            parse_chunk_write_response(&bad_chunk).status(),
            ResponseStatus::UnexpectedResponse
        );
        let lock = Message::new(vec![0x6C, 0xF0, 0x10, 0x76, 0xE0, 0x80]);
        assert!(parse_flash_lock_response(&lock).is_success());
        assert!(!parse_write_kernel_reset_response(&lock).is_success());
    }
}
