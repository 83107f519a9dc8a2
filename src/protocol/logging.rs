//! Dynamic PID (DPID) configuration, DPID row requests, and single PID/RAM reads

use strum_macros::{Display, EnumIter};

use super::{do_simple_validation, try_verify_initial_bytes};
use crate::{
    VpwError, VpwResult,
    message::Message,
    response::{Response, ResponseStatus},
    utility::to_hex,
    vpw::{device_id, mode, priority, submode},
};

/// How a DPID slot refers to its source data
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DefineBy {
    /// Byte offset into a standard data block
    Offset = 0,
    /// PID number
    Pid = 1,
    /// RAM address
    Address = 2,
    /// Manufacturer specific, not supported by PCMs
    Proprietary = 3,
}

/// Kind of DPID data request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum DpidRequestType {
    /// One row, then stop
    SingleRow = submode::SINGLE_ROW,
    /// Continuous stream, slow rate
    Stream1 = submode::STREAM1,
    /// Continuous stream, fast rate
    Stream2 = submode::STREAM2,
}

/// One DPID payload received from the PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogData {
    /// DPID the payload belongs to
    pub dpid: u8,
    /// 6 bytes of parameter data
    pub payload: Vec<u8>,
}

impl std::fmt::Display for RawLogData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&to_hex(&self.payload))
    }
}

/// Assigns one slot of a DPID.
///
/// `offset` is the 1 based byte position within the DPID's 6 byte payload and `size` is the
/// number of bytes. `id` is interpreted according to `define_by`.
pub fn configure_dynamic_data(
    dpid: u8,
    define_by: DefineBy,
    offset: u8,
    size: u8,
    id: u32,
) -> VpwResult<Message> {
    let combined = ((define_by as u8) << 6) | ((offset & 0x07) << 3) | (size & 0x07);
    let (b1, b2, b3) = match define_by {
        DefineBy::Offset => (id as u8, 0xFF, 0xFF),
        DefineBy::Pid => ((id >> 8) as u8, id as u8, 0xFF),
        DefineBy::Address => ((id >> 16) as u8, (id >> 8) as u8, id as u8),
        DefineBy::Proprietary => {
            return Err(VpwError::UnsupportedFormat(format!(
                "Unsupported DefineBy value: {define_by}"
            )));
        }
    };
    Ok(Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::CONFIGURE_DYNAMIC_DATA,
        dpid,
        combined,
        b1,
        b2,
        b3,
        0xFF,
    ]))
}

/// Parses the acknowledgement of [configure_dynamic_data], `[6C F0 10 6C dpid]`
pub fn parse_configure_dynamic_data_response(message: &Message, dpid: u8) -> Response<bool> {
    do_simple_validation(message, priority::PHYSICAL0, mode::CONFIGURE_DYNAMIC_DATA, &[dpid])
}

/// Requests DPID data. Fewer than 4 DPIDs are padded with 0xFF for single rows and 0x00 for
/// streams
pub fn request_dpids(dpids: &[u8], request_type: DpidRequestType) -> Message {
    let mut bytes = vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::SEND_DYNAMIC_DATA,
        request_type as u8,
    ];
    bytes.extend_from_slice(dpids);
    if dpids.len() < 4 {
        let padding = match request_type {
            DpidRequestType::SingleRow => 0xFF,
            _ => 0x00,
        };
        bytes.resize(5 + 4, padding);
    }
    Message::new(bytes)
}

/// Extracts a DPID payload from a `[6C F0 10 6A dpid d0..d5]` frame.
///
/// Returns `None` for anything else, which during logging is usually other bus traffic
pub fn try_parse_raw_log_data(message: &Message) -> Option<RawLogData> {
    let expected = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::SEND_DYNAMIC_DATA + mode::RESPONSE,
    ];
    if try_verify_initial_bytes(message.bytes(), &expected) != ResponseStatus::Success {
        return None;
    }
    if message.len() < 11 {
        return None;
    }
    Some(RawLogData {
        dpid: message[4],
        payload: message.bytes()[5..11].to_vec(),
    })
}

/// Reads one PID using physical addressing
pub fn create_pid_request(pid: u32) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::GET_PID,
        (pid >> 8) as u8,
        pid as u8,
        0x01,
    ])
}

/// Parses a PID reply. Only 1 and 2 byte PIDs are supported
pub fn parse_pid_response(message: &Message) -> VpwResult<Response<u32>> {
    let expected = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::GET_PID + mode::RESPONSE,
    ];
    let status = try_verify_initial_bytes(message.bytes(), &expected);
    if status != ResponseStatus::Success {
        return Ok(Response::failed(status));
    }
    match message.len() {
        7 => Ok(Response::create(ResponseStatus::Success, message[6] as u32)),
        8 => Ok(Response::create(
            ResponseStatus::Success,
            ((message[6] as u32) << 8) | message[7] as u32,
        )),
        len => Err(VpwError::UnsupportedFormat(format!(
            "Only 1 and 2 byte PIDs are supported, reply was {len} bytes"
        ))),
    }
}

/// Reads 4 bytes of RAM
pub fn create_ram_request(address: u32) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::GET_RAM,
        (address >> 16) as u8,
        (address >> 8) as u8,
        address as u8,
        0x01,
    ])
}

/// Value reported for a RAM read of an illegal address
pub const ILLEGAL_ADDRESS_VALUE: u32 = 0xEEEE_EEEE;

/// Parses a RAM read reply. The value is little-endian in bytes 6..10.
///
/// A refusal carrying the illegal address code is reported as success with
/// [ILLEGAL_ADDRESS_VALUE] so a log row can still be produced
pub fn parse_ram_response(message: &Message) -> VpwResult<Response<u32>> {
    if message.get(3) == Some(mode::NEGATIVE) && message.get(4) == Some(mode::GET_RAM) {
        if message.get(9) == Some(0x31) {
            return Ok(Response::create(ResponseStatus::Success, ILLEGAL_ADDRESS_VALUE));
        }
        return Ok(Response::failed(ResponseStatus::Error));
    }

    let expected = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::GET_RAM + mode::RESPONSE,
    ];
    let status = try_verify_initial_bytes(message.bytes(), &expected);
    if status != ResponseStatus::Success {
        return Ok(Response::failed(status));
    }
    if message.len() != 10 {
        return Err(VpwError::UnsupportedFormat(format!(
            "Unexpected RAM read reply length {}",
            message.len()
        )));
    }
    let mut value = [0u8; 4];
    value.copy_from_slice(&message.bytes()[6..10]);
    Ok(Response::create(ResponseStatus::Success, u32::from_le_bytes(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_layouts() {
        let pid = configure_dynamic_data(0xFE, DefineBy::Pid, 1, 2, 0x000C).unwrap();
        assert_eq!(pid.bytes(), &[0x6C, 0x10, 0xF0, 0x2C, 0xFE, 0x4A, 0x00, 0x0C, 0xFF, 0xFF]);
        let ram = configure_dynamic_data(0xFD, DefineBy::Address, 3, 1, 0xFF8123).unwrap();
        assert_eq!(ram.bytes(), &[0x6C, 0x10, 0xF0, 0x2C, 0xFD, 0x99, 0xFF, 0x81, 0x23, 0xFF]);
        let offset = configure_dynamic_data(0xFC, DefineBy::Offset, 1, 1, 0x05).unwrap();
        assert_eq!(offset.bytes(), &[0x6C, 0x10, 0xF0, 0x2C, 0xFC, 0x09, 0x05, 0xFF, 0xFF, 0xFF]);
        assert!(configure_dynamic_data(0xFE, DefineBy::Proprietary, 1, 1, 0).is_err());
    }

    #[test]
    fn configure_acknowledgement() {
        let ok = Message::new(vec![0x6C, 0xF0, 0x10, 0x6C, 0xFE]);
        assert!(parse_configure_dynamic_data_response(&ok, 0xFE).is_success());
        assert_eq!(
            parse_configure_dynamic_data_response(&ok, 0xFD).status(),
            ResponseStatus::UnexpectedResponse
        );
        let refused = Message::new(vec![0x6C, 0xF0, 0x10, 0x7F, 0x2C, 0xFE]);
        assert_eq!(
            parse_configure_dynamic_data_response(&refused, 0xFE).status(),
            ResponseStatus::Refused
        );
    }

    #[test]
    fn dpid_request_padding() {
        assert_eq!(
            request_dpids(&[0xFE, 0xFD], DpidRequestType::SingleRow).bytes(),
            &[0x6C, 0x10, 0xF0, 0x2A, 0x01, 0xFE, 0xFD, 0xFF, 0xFF]
        );
        assert_eq!(
            request_dpids(&[0xFE], DpidRequestType::Stream1).bytes(),
            &[0x6C, 0x10, 0xF0, 0x2A, 0x14, 0xFE, 0x00, 0x00, 0x00]
        );
        assert_eq!(request_dpids(&[1, 2, 3, 4], DpidRequestType::Stream2).len(), 9);
    }

    #[test]
    fn raw_log_data() {
        let frame = Message::new(vec![0x6C, 0xF0, 0x10, 0x6A, 0xFE, 1, 2, 3, 4, 5, 6]);
        let data = try_parse_raw_log_data(&frame).unwrap();
        assert_eq!(data.dpid, 0xFE);
        assert_eq!(data.payload, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(data.to_string(), "01 02 03 04 05 06");

        let short = Message::new(vec![0x6C, 0xF0, 0x10, 0x6A, 0xFE, 1, 2]);
        assert!(try_parse_raw_log_data(&short).is_none());
        let other = Message::new(vec![0x8C, 0xF0, 0x10, 0x6A, 0xFE, 1, 2, 3, 4, 5, 6]);
        assert!(try_parse_raw_log_data(&other).is_none());
    }

    #[test]
    fn pid_replies() {
        assert_eq!(create_pid_request(0x1234).bytes(), &[0x6C, 0x10, 0xF0, 0x22, 0x12, 0x34, 0x01]);
        let one = Message::new(vec![0x6C, 0xF0, 0x10, 0x62, 0x00, 0x05, 0x7B]);
        assert_eq!(parse_pid_response(&one).unwrap().into_value(), 0x7B);
        let two = Message::new(vec![0x6C, 0xF0, 0x10, 0x62, 0x00, 0x0C, 0x1F, 0x40]);
        assert_eq!(parse_pid_response(&two).unwrap().into_value(), 0x1F40);
        let four = Message::new(vec![0x6C, 0xF0, 0x10, 0x62, 0x00, 0x0C, 1, 2, 3, 4]);
        assert!(parse_pid_response(&four).is_err());
        let wrong = Message::new(vec![0x6C, 0xF0, 0x10, 0x63]);
        assert_eq!(
            parse_pid_response(&wrong).unwrap().status(),
            ResponseStatus::UnexpectedResponse
        );
    }

    #[test]
    fn ram_replies() {
        assert_eq!(
            create_ram_request(0xFF8123).bytes(),
            &[0x6C, 0x10, 0xF0, 0x23, 0xFF, 0x81, 0x23, 0x01]
        );
        let ok = Message::new(vec![0x6C, 0xF0, 0x10, 0x63, 0x81, 0x23, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(parse_ram_response(&ok).unwrap().into_value(), 0x04030201);
        let illegal =
            Message::new(vec![0x6C, 0xF0, 0x10, 0x7F, 0x23, 0xFF, 0x81, 0x23, 0x01, 0x31]);
        assert_eq!(
            parse_ram_response(&illegal).unwrap(),
            Response::create(ResponseStatus::Success, ILLEGAL_ADDRESS_VALUE)
        );
        let refused =
            Message::new(vec![0x6C, 0xF0, 0x10, 0x7F, 0x23, 0xFF, 0x81, 0x23, 0x01, 0x12]);
        assert_eq!(parse_ram_response(&refused).unwrap().status(), ResponseStatus::Error);
    }
}
