//! Seed/key security unlock handshake

use super::try_verify_initial_bytes;
use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    vpw::{device_id, mode, priority, submode},
};

/// Reply code in byte 5 of the unlock response
mod unlock_code {
    pub const DENIED: u8 = 0x33;
    pub const ALLOWED: u8 = 0x34;
    pub const INVALID: u8 = 0x35;
    pub const TOO_MANY: u8 = 0x36;
    pub const DELAY: u8 = 0x37;
}

/// Requests a seed from the PCM
pub fn create_seed_request() -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::SEED,
        submode::GET_SEED,
    ])
}

/// Parses the seed reply.
///
/// A PCM that is already unlocked answers `[6C 70 10 67 01 37]`, which yields a seed of 0.
/// Otherwise the seed is the big-endian value in bytes 5 and 6 of `[6C F0 10 67 01 hi lo]`.
/// The seed is passed to the key algorithm exactly as read, it is not byte swapped.
pub fn parse_seed(message: &Message) -> Response<u16> {
    let actual = message.bytes();
    let unlocked = [
        priority::PHYSICAL0,
        0x70,
        device_id::PCM,
        mode::SEED + mode::RESPONSE,
        submode::GET_SEED,
        unlock_code::DELAY,
    ];
    if try_verify_initial_bytes(actual, &unlocked) == ResponseStatus::Success {
        return Response::create(ResponseStatus::Success, 0);
    }

    let seed = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::SEED + mode::RESPONSE,
        submode::GET_SEED,
    ];
    if try_verify_initial_bytes(actual, &seed) != ResponseStatus::Success || actual.len() < 7 {
        return Response::failed(ResponseStatus::Error);
    }
    Response::create(ResponseStatus::Success, u16::from_be_bytes([actual[5], actual[6]]))
}

/// True if the seed reply says the PCM is already unlocked
pub fn is_unlocked(message: &Message) -> bool {
    let unlocked = [
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::SEED + mode::RESPONSE,
        submode::GET_SEED,
        unlock_code::DELAY,
    ];
    try_verify_initial_bytes(message.bytes(), &unlocked) == ResponseStatus::Success
}

/// Sends the computed key, high byte first
pub fn create_unlock_request(key: u16) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::SEED,
        submode::SEND_KEY,
        (key >> 8) as u8,
        key as u8,
    ])
}

/// Classifies the reply to an unlock request.
///
/// The reply must be exactly 6 bytes. Returns the classification together with a human
/// readable message for every non success outcome.
pub fn parse_unlock_response(message: &Message) -> (Response<bool>, Option<String>) {
    if message.len() != 6 {
        return (
            Response::create(ResponseStatus::UnexpectedResponse, false),
            Some(format!(
                "Unlock response was {} bytes long, expected 6.",
                message.len()
            )),
        );
    }
    match message[5] {
        unlock_code::ALLOWED => (Response::create(ResponseStatus::Success, true), None),
        unlock_code::DENIED => (
            Response::create(ResponseStatus::Error, false),
            Some("The PCM refused to unlock".into()),
        ),
        unlock_code::INVALID => (
            Response::create(ResponseStatus::Error, false),
            Some("The PCM didn't accept the unlock key value".into()),
        ),
        unlock_code::TOO_MANY => (
            Response::create(ResponseStatus::Error, false),
            Some("The PCM has received too many unlock attempts".into()),
        ),
        unlock_code::DELAY => (
            Response::create(ResponseStatus::Timeout, false),
            Some("The PCM is enforcing a delay before the next unlock attempt".into()),
        ),
        code => (
            Response::create(ResponseStatus::UnexpectedResponse, false),
            Some(format!("Unknown unlock code 0x{code:02X}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_request_layout() {
        assert_eq!(create_seed_request().bytes(), &[0x6C, 0x10, 0xF0, 0x27, 0x01]);
        assert_eq!(
            create_unlock_request(0x1234).bytes(),
            &[0x6C, 0x10, 0xF0, 0x27, 0x02, 0x12, 0x34]
        );
    }

    #[test]
    fn seed_is_big_endian() {
        let reply = Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12, 0x34]);
        assert_eq!(parse_seed(&reply), Response::create(ResponseStatus::Success, 0x1234));
    }

    #[test]
    fn seed_already_unlocked() {
        let reply = Message::new(vec![0x6C, 0x70, 0x10, 0x67, 0x01, 0x37]);
        assert_eq!(parse_seed(&reply), Response::create(ResponseStatus::Success, 0));
        assert!(is_unlocked(&Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x01, 0x37])));
        assert!(!is_unlocked(&Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12, 0x34])));
    }

    #[test]
    fn seed_garbage_is_error() {
        let reply = Message::new(vec![0x6C, 0xF0, 0x10, 0x7F, 0x27]);
        assert_eq!(parse_seed(&reply).status(), ResponseStatus::Error);
        let short = Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x01, 0x12]);
        assert_eq!(parse_seed(&short).status(), ResponseStatus::Error);
    }

    fn unlock_reply(code: u8) -> Message {
        Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x02, code])
    }

    #[test]
    fn unlock_classification() {
        let (r, msg) = parse_unlock_response(&unlock_reply(0x34));
        assert_eq!(r, Response::create(ResponseStatus::Success, true));
        assert!(msg.is_none());

        for code in [0x33, 0x35, 0x36] {
            let (r, msg) = parse_unlock_response(&unlock_reply(code));
            assert_eq!(r.status(), ResponseStatus::Error);
            assert!(msg.is_some());
        }

        let (r, msg) = parse_unlock_response(&unlock_reply(0x37));
        assert_eq!(r.status(), ResponseStatus::Timeout);
        assert!(msg.unwrap().contains("delay"));

        let (r, msg) = parse_unlock_response(&unlock_reply(0x99));
        assert_eq!(r.status(), ResponseStatus::UnexpectedResponse);
        assert_eq!(msg.unwrap(), "Unknown unlock code 0x99");
    }

    #[test]
    fn unlock_wrong_length() {
        let (r, _) = parse_unlock_response(&Message::new(vec![0x6C, 0xF0, 0x10, 0x67, 0x02]));
        assert_eq!(r.status(), ResponseStatus::UnexpectedResponse);
    }
}
