//! Request builders and response parsers for the GM VPW protocol.
//!
//! Every outbound operation is a pure function that returns a [Message]. Every inbound operation
//! is a pure function from a [Message] to a [Response], following the same steps:
//! 1. Compare a prefix of the reply against the expected template with [try_verify_initial_bytes].
//!    A short reply is [ResponseStatus::Truncated], a mismatch is
//!    [ResponseStatus::UnexpectedResponse].
//! 2. If the success template does not match, compare against the refusal template
//!    (`0x7F` followed by the original mode). A match is [ResponseStatus::Refused].
//! 3. On success, extract big-endian fields at fixed offsets.
//!
//! Submodules group the operations by purpose, and are all re-exported here.

use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    vpw::{device_id, mode, priority},
};

pub mod kernel;
pub mod logging;
pub mod misc;
pub mod properties;
pub mod read_write;
pub mod security;
pub mod speed;

pub use kernel::*;
pub use logging::*;
pub use misc::*;
pub use properties::*;
pub use read_write::*;
pub use security::*;
pub use speed::*;

/// Compares the start of `actual` against `expected`.
///
/// Returns [ResponseStatus::Truncated] iff `actual` is shorter than `expected`,
/// [ResponseStatus::UnexpectedResponse] iff any prefix byte differs, otherwise
/// [ResponseStatus::Success]
pub fn try_verify_initial_bytes(actual: &[u8], expected: &[u8]) -> ResponseStatus {
    if actual.len() < expected.len() {
        return ResponseStatus::Truncated;
    }
    if actual[..expected.len()] != *expected {
        return ResponseStatus::UnexpectedResponse;
    }
    ResponseStatus::Success
}

/// Generic accept/reject check used by most kernel and transfer replies.
///
/// Success template is `[priority, Tool, Pcm, mode + 0x40]` followed by `data`.
/// Failure template is `[priority, Tool, Pcm, 0x7F, mode]`.
///
/// * Success header with matching data: [ResponseStatus::Success]
/// * Success header, reply too short for `data`: [ResponseStatus::Truncated]
/// * Success header, a data byte differs: [ResponseStatus::UnexpectedResponse]
/// * Failure header, whatever follows: [ResponseStatus::Refused]
/// * Anything else: [ResponseStatus::UnexpectedResponse]
pub fn do_simple_validation(message: &Message, prio: u8, mode: u8, data: &[u8]) -> Response<bool> {
    let actual = message.bytes();
    let success = [prio, device_id::TOOL, device_id::PCM, mode.wrapping_add(mode::RESPONSE)];
    if try_verify_initial_bytes(actual, &success) == ResponseStatus::Success {
        if actual.len() < success.len() + data.len() {
            return Response::create(ResponseStatus::Truncated, false);
        }
        for (idx, expected) in data.iter().enumerate() {
            if actual[success.len() + idx] != *expected {
                return Response::create(ResponseStatus::UnexpectedResponse, false);
            }
        }
        return Response::create(ResponseStatus::Success, true);
    }

    let failure = [prio, device_id::TOOL, device_id::PCM, mode::NEGATIVE, mode];
    if try_verify_initial_bytes(actual, &failure) == ResponseStatus::Success {
        return Response::create(ResponseStatus::Refused, false);
    }

    Response::create(ResponseStatus::UnexpectedResponse, false)
}

/// Checks the success and refusal templates shared by single value replies.
/// Returns `None` when the success template matched
fn check_value_reply(actual: &[u8], mode: u8, submode: u8) -> Option<ResponseStatus> {
    let success = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode | mode::RESPONSE,
        submode,
    ];
    let refused = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::NEGATIVE,
        mode,
        submode,
    ];
    match try_verify_initial_bytes(actual, &success) {
        ResponseStatus::Success => None,
        status => {
            if try_verify_initial_bytes(actual, &refused) == ResponseStatus::Success {
                Some(ResponseStatus::Refused)
            } else {
                Some(status)
            }
        }
    }
}

/// Parses a reply carrying one byte after `[6C F0 10 mode|40 submode]`
pub fn parse_byte(message: &Message, mode: u8, submode: u8) -> Response<u8> {
    let actual = message.bytes();
    if let Some(status) = check_value_reply(actual, mode, submode) {
        return Response::failed(status);
    }
    if actual.len() < 6 {
        return Response::failed(ResponseStatus::Truncated);
    }
    Response::create(ResponseStatus::Success, actual[5])
}

/// Parses a reply carrying a big-endian 32 bit value after `[6C F0 10 mode|40 submode]`
pub fn parse_u32(message: &Message, mode: u8, submode: u8) -> Response<u32> {
    let actual = message.bytes();
    if let Some(status) = check_value_reply(actual, mode, submode) {
        return Response::failed(status);
    }
    if actual.len() < 9 {
        return Response::failed(ResponseStatus::Truncated);
    }
    Response::create(ResponseStatus::Success, be_u32(&actual[5..9]))
}

/// Builds a big-endian integer by shift-and-or accumulation
pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bytes: &[u8]) -> Message {
        Message::new(bytes)
    }

    #[test]
    fn verify_initial_bytes() {
        let expected = [0x6C, 0xF0, 0x10, 0x7C];
        assert_eq!(try_verify_initial_bytes(&[0x6C, 0xF0], &expected), ResponseStatus::Truncated);
        assert_eq!(
            try_verify_initial_bytes(&[0x6C, 0xF0, 0x10, 0x7D], &expected),
            ResponseStatus::UnexpectedResponse
        );
        assert_eq!(
            try_verify_initial_bytes(&[0x6C, 0xF0, 0x10, 0x7C, 0x01], &expected),
            ResponseStatus::Success
        );
        // Short and mismatched is still truncated
        assert_eq!(try_verify_initial_bytes(&[0x00], &expected), ResponseStatus::Truncated);
    }

    #[test]
    fn simple_validation_success_and_data() {
        let ok = msg(&[0x6C, 0xF0, 0x10, 0x73, 0x00]);
        assert_eq!(do_simple_validation(&ok, 0x6C, 0x33, &[]).status(), ResponseStatus::Success);
        assert_eq!(
            do_simple_validation(&ok, 0x6C, 0x33, &[0x00]).status(),
            ResponseStatus::Success
        );
        assert_eq!(
            do_simple_validation(&ok, 0x6C, 0x33, &[0x01]).status(),
            ResponseStatus::UnexpectedResponse
        );
        assert_eq!(
            do_simple_validation(&ok, 0x6C, 0x33, &[0x00, 0x01]).status(),
            ResponseStatus::Truncated
        );
    }

    #[test]
    fn simple_validation_refused_ignores_trailing_bytes() {
        let refused = msg(&[0x6C, 0xF0, 0x10, 0x7F, 0x34, 0x12, 0x99]);
        assert_eq!(
            do_simple_validation(&refused, 0x6C, 0x34, &[0x00]).status(),
            ResponseStatus::Refused
        );
        let other = msg(&[0x6C, 0xF0, 0x10, 0x7F, 0x35]);
        assert_eq!(
            do_simple_validation(&other, 0x6C, 0x34, &[]).status(),
            ResponseStatus::UnexpectedResponse
        );
        let short = msg(&[0x6C, 0xF0]);
        assert_eq!(
            do_simple_validation(&short, 0x6C, 0x34, &[]).status(),
            ResponseStatus::UnexpectedResponse
        );
    }

    #[test]
    fn value_parsers() {
        let r = parse_u32(
            &msg(&[0x6C, 0xF0, 0x10, 0x7D, 0x00, 0x00, 0x00, 0x01, 0x02]),
            0x3D,
            0x00,
        );
        assert_eq!(r, Response::create(ResponseStatus::Success, 0x0102));
        let r = parse_u32(&msg(&[0x6C, 0xF0, 0x10, 0x7D, 0x00, 0x00]), 0x3D, 0x00);
        assert_eq!(r.status(), ResponseStatus::Truncated);
        let r = parse_u32(&msg(&[0x6C, 0xF0, 0x10, 0x7F, 0x3D, 0x00]), 0x3D, 0x00);
        assert_eq!(r.status(), ResponseStatus::Refused);
        let r = parse_byte(&msg(&[0x6C, 0xF0, 0x10, 0x7D, 0x05, 0xAA]), 0x3D, 0x05);
        assert_eq!(r, Response::create(ResponseStatus::Success, 0xAA));
        let r = parse_byte(&msg(&[0x6C, 0xF0, 0x10, 0x7D, 0x04, 0xAA]), 0x3D, 0x05);
        assert_eq!(r.status(), ResponseStatus::UnexpectedResponse);
    }
}
