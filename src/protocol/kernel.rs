//! Requests understood by the kernel once it is running in PCM RAM

use super::{be_u32, parse_byte, parse_u32, try_verify_initial_bytes};
use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    vpw::{device_id, mode, priority},
};

/// Kernel query sub modes (mode 0x3D)
pub mod kernel_submode {
    /// Kernel version
    pub const VERSION: u8 = 0x00;
    /// Flash chip ID
    pub const FLASH_CHIP_ID: u8 = 0x01;
    /// CRC of a memory range
    pub const CRC: u8 = 0x02;
    /// Operating system ID, read by the kernel
    pub const OPERATING_SYSTEM_ID: u8 = 0x03;
    /// Erase a flash block
    pub const ERASE_BLOCK: u8 = 0x05;
    /// Kernel debug information
    pub const DEBUG: u8 = 0xFF;
}

fn kernel_query(submode: u8) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::KERNEL,
        submode,
    ])
}

fn split_u24(value: u32) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// Asks the kernel for its version
pub fn create_kernel_version_query() -> Message {
    kernel_query(kernel_submode::VERSION)
}

/// Parses the kernel version reply
pub fn parse_kernel_version(message: &Message) -> Response<u32> {
    parse_u32(message, mode::KERNEL, kernel_submode::VERSION)
}

/// Asks the kernel for the ID of the flash chip
pub fn create_flash_memory_type_query() -> Message {
    kernel_query(kernel_submode::FLASH_CHIP_ID)
}

/// Parses the flash chip ID reply. The upper 16 bits are the manufacturer
pub fn parse_flash_memory_type(message: &Message) -> Response<u32> {
    parse_u32(message, mode::KERNEL, kernel_submode::FLASH_CHIP_ID)
}

/// Asks the kernel for the operating system ID stored in flash
pub fn create_operating_system_id_kernel_request() -> Message {
    kernel_query(kernel_submode::OPERATING_SYSTEM_ID)
}

/// Parses the reply to [create_operating_system_id_kernel_request]
pub fn parse_operating_system_id_kernel_response(message: &Message) -> Response<u32> {
    parse_u32(message, mode::KERNEL, kernel_submode::OPERATING_SYSTEM_ID)
}

/// Asks the kernel for the CRC of `size` bytes starting at `address`
pub fn create_crc_query(address: u32, size: u32) -> Message {
    let mut bytes = vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::KERNEL,
        kernel_submode::CRC,
    ];
    bytes.extend_from_slice(&split_u24(size));
    bytes.extend_from_slice(&split_u24(address));
    Message::new(bytes)
}

/// Parses a CRC reply.
///
/// The reply echoes the size and address that were requested. If either differs, the reply
/// belongs to another request and is [ResponseStatus::UnexpectedResponse].
pub fn parse_crc(message: &Message, address: u32, size: u32) -> Response<u32> {
    let actual = message.bytes();
    let mut expected = vec![
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::KERNEL + mode::RESPONSE,
        kernel_submode::CRC,
    ];
    expected.extend_from_slice(&split_u24(size));
    expected.extend_from_slice(&split_u24(address));

    let status = try_verify_initial_bytes(actual, &expected);
    if status != ResponseStatus::Success {
        let refused = [
            priority::PHYSICAL0,
            device_id::TOOL,
            device_id::PCM,
            mode::NEGATIVE,
            mode::KERNEL,
            kernel_submode::CRC,
        ];
        if try_verify_initial_bytes(actual, &refused) == ResponseStatus::Success {
            return Response::failed(ResponseStatus::Refused);
        }
        return Response::failed(status);
    }
    if actual.len() < 15 {
        return Response::failed(ResponseStatus::Truncated);
    }
    Response::create(ResponseStatus::Success, be_u32(&actual[11..15]))
}

/// Asks the kernel to erase the flash block containing `base_address`
pub fn create_flash_erase_block_request(base_address: u32) -> Message {
    let mut bytes = vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::KERNEL,
        kernel_submode::ERASE_BLOCK,
    ];
    bytes.extend_from_slice(&split_u24(base_address));
    Message::new(bytes)
}

/// Parses the erase reply. The value is the flash status byte, 0 means success
pub fn parse_flash_erase_block(message: &Message) -> Response<u8> {
    parse_byte(message, mode::KERNEL, kernel_submode::ERASE_BLOCK)
}

/// Asks the kernel for debug information
pub fn create_debug_query() -> Message {
    kernel_query(kernel_submode::DEBUG)
}

/// Tells the kernel to exit and reboot the PCM
pub fn create_exit_kernel() -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::EXIT_KERNEL,
    ])
}
