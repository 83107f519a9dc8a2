//! Block reads and writes of PCM identity properties (VIN, serial, IDs)

use super::{be_u32, try_verify_initial_bytes};
use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    utility::get_printable,
    vpw::{block_id, device_id, mode, priority},
};

/// Value carried by failed string property reads
pub const UNKNOWN: &str = "Unknown";

/// Builds a block read request `[6C 10 F0 3C block]`
pub fn create_read_block_request(block: u8) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::READ_BLOCK,
        block,
    ])
}

/// First VIN block request
pub fn create_vin_request1() -> Message {
    create_read_block_request(block_id::VIN1)
}

/// Second VIN block request
pub fn create_vin_request2() -> Message {
    create_read_block_request(block_id::VIN2)
}

/// Third VIN block request
pub fn create_vin_request3() -> Message {
    create_read_block_request(block_id::VIN3)
}

/// First serial number block request
pub fn create_serial_request1() -> Message {
    create_read_block_request(block_id::SERIAL1)
}

/// Second serial number block request
pub fn create_serial_request2() -> Message {
    create_read_block_request(block_id::SERIAL2)
}

/// Third serial number block request
pub fn create_serial_request3() -> Message {
    create_read_block_request(block_id::SERIAL3)
}

/// Broadcast code request
pub fn create_bcc_request() -> Message {
    create_read_block_request(block_id::BCC)
}

/// Manufacturers enable counter request
pub fn create_mec_request() -> Message {
    create_read_block_request(block_id::MEC)
}

/// Operating system ID request
pub fn create_operating_system_id_read_request() -> Message {
    create_read_block_request(block_id::OPERATING_SYSTEM_ID)
}

/// Calibration ID request
pub fn create_calibration_id_read_request() -> Message {
    create_read_block_request(block_id::CALIBRATION_ID)
}

/// Hardware ID request
pub fn create_hardware_id_read_request() -> Message {
    create_read_block_request(block_id::HARDWARE_ID)
}

fn block_reply(block: u8) -> [u8; 5] {
    [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::READ_BLOCK + mode::RESPONSE,
        block,
    ]
}

/// Parses a 32 bit value from any block read reply `[6C F0 10 7C block b0 b1 b2 b3]`
pub fn parse_u32_from_block_read(message: &Message) -> Response<u32> {
    let actual = message.bytes();
    let expected = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::READ_BLOCK + mode::RESPONSE,
    ];
    let status = try_verify_initial_bytes(actual, &expected);
    if status != ResponseStatus::Success {
        let refused = [
            priority::PHYSICAL0,
            device_id::TOOL,
            device_id::PCM,
            mode::NEGATIVE,
            mode::READ_BLOCK,
        ];
        if try_verify_initial_bytes(actual, &refused) == ResponseStatus::Success {
            return Response::failed(ResponseStatus::Refused);
        }
        return Response::failed(status);
    }
    if actual.len() < 9 {
        return Response::failed(ResponseStatus::Truncated);
    }
    Response::create(ResponseStatus::Success, be_u32(&actual[5..9]))
}

/// Checks `message` against the reply template for `block` and that it carries `length` bytes
/// from offset `start`
fn verify_block(message: &Message, block: u8, start: usize, length: usize) -> ResponseStatus {
    let status = try_verify_initial_bytes(message.bytes(), &block_reply(block));
    if status != ResponseStatus::Success {
        return status;
    }
    if message.len() < start + length {
        return ResponseStatus::Truncated;
    }
    ResponseStatus::Success
}

/// Joins the three VIN block replies into the 17 character VIN.
///
/// The first block carries a leading pad byte, so it contributes 5 characters from offset 6
pub fn parse_vin_responses(r1: &Message, r2: &Message, r3: &Message) -> Response<String> {
    for (msg, block, start, len) in [
        (r1, block_id::VIN1, 6, 5),
        (r2, block_id::VIN2, 5, 6),
        (r3, block_id::VIN3, 5, 6),
    ] {
        let status = verify_block(msg, block, start, len);
        if status != ResponseStatus::Success {
            return Response::create(status, UNKNOWN.into());
        }
    }
    let mut vin = Vec::with_capacity(17);
    vin.extend_from_slice(&r1.bytes()[6..11]);
    vin.extend_from_slice(&r2.bytes()[5..11]);
    vin.extend_from_slice(&r3.bytes()[5..11]);
    Response::create(ResponseStatus::Success, String::from_utf8_lossy(&vin).into_owned())
}

/// Joins the three serial number replies, 4 bytes each, dropping non printable bytes
pub fn parse_serial_responses(r1: &Message, r2: &Message, r3: &Message) -> Response<String> {
    let mut serial = Vec::with_capacity(12);
    for (msg, block) in [
        (r1, block_id::SERIAL1),
        (r2, block_id::SERIAL2),
        (r3, block_id::SERIAL3),
    ] {
        let status = verify_block(msg, block, 5, 4);
        if status != ResponseStatus::Success {
            return Response::create(status, UNKNOWN.into());
        }
        serial.extend_from_slice(&msg.bytes()[5..9]);
    }
    let printable = get_printable(&serial);
    Response::create(ResponseStatus::Success, String::from_utf8_lossy(&printable).into_owned())
}

/// Parses the broadcast code, 4 printable characters
pub fn parse_bcc_response(message: &Message) -> Response<String> {
    let status = verify_block(message, block_id::BCC, 5, 4);
    if status != ResponseStatus::Success {
        return Response::create(status, UNKNOWN.into());
    }
    let printable = get_printable(&message.bytes()[5..9]);
    Response::create(ResponseStatus::Success, String::from_utf8_lossy(&printable).into_owned())
}

/// Parses the manufacturers enable counter, formatted as a decimal number
pub fn parse_mec_response(message: &Message) -> Response<String> {
    let status = verify_block(message, block_id::MEC, 5, 1);
    if status != ResponseStatus::Success {
        return Response::create(status, UNKNOWN.into());
    }
    Response::create(ResponseStatus::Success, message[5].to_string())
}

/// Builds a 6 byte block write `[6C 10 F0 3B block d0..d5]`
pub fn create_block_write_request(block: u8, data: &[u8; 6]) -> Message {
    let mut bytes = vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::WRITE_BLOCK,
        block,
    ];
    bytes.extend_from_slice(data);
    Message::new(bytes)
}

/// Parses the reply to [create_block_write_request], `[6C F0 10 7B block]`
pub fn parse_block_write_response(message: &Message, block: u8) -> Response<bool> {
    let actual = message.bytes();
    let ok = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::WRITE_BLOCK + mode::RESPONSE,
        block,
    ];
    match try_verify_initial_bytes(actual, &ok) {
        ResponseStatus::Success => Response::create(ResponseStatus::Success, true),
        status => {
            let refused = [
                priority::PHYSICAL0,
                device_id::TOOL,
                device_id::PCM,
                mode::NEGATIVE,
                mode::WRITE_BLOCK,
            ];
            if try_verify_initial_bytes(actual, &refused) == ResponseStatus::Success {
                Response::create(ResponseStatus::Refused, false)
            } else {
                Response::create(status, false)
            }
        }
    }
}

/// Splits a 17 character VIN into the three 6 byte blocks written to the PCM.
/// The first block is padded with a leading zero
pub fn split_vin(vin: &[u8; 17]) -> [[u8; 6]; 3] {
    let mut blocks = [[0u8; 6]; 3];
    blocks[0][1..].copy_from_slice(&vin[0..5]);
    blocks[1].copy_from_slice(&vin[5..11]);
    blocks[2].copy_from_slice(&vin[11..17]);
    blocks
}
