//! 4x (41.6kbps) high speed negotiation

use crate::{
    message::Message,
    response::{Response, ResponseStatus},
    vpw::{device_id, mode, priority},
};

/// One module's reply to a high speed permission request.
///
/// Several modules may answer a broadcast permission request, so this carries the replying
/// module's ID instead of being a [Response]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HighSpeedPermissionResult {
    /// The message was a permission reply at all
    pub is_valid: bool,
    /// Module that replied
    pub device_id: u8,
    /// Module agreed to switch to 4x
    pub permission_granted: bool,
}

/// Asks `device_id` (or [device_id::BROADCAST]) whether it can switch to 4x
pub fn create_high_speed_permission_request(device_id: u8) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id,
        device_id::TOOL,
        mode::HIGH_SPEED_PREPARE,
    ])
}

/// Tells `device_id` (or [device_id::BROADCAST]) to switch to 4x
pub fn create_begin_high_speed(device_id: u8) -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id,
        device_id::TOOL,
        mode::HIGH_SPEED,
    ])
}

/// Parses one module's reply to [create_high_speed_permission_request]
pub fn parse_high_speed_permission_response(message: &Message) -> HighSpeedPermissionResult {
    let actual = message.bytes();
    if actual.len() < 4 || actual[0] != priority::PHYSICAL0 || actual[1] != device_id::TOOL {
        return HighSpeedPermissionResult::default();
    }
    let module_id = actual[2];
    match actual[3] {
        m if m == mode::HIGH_SPEED_PREPARE.wrapping_add(mode::RESPONSE) => {
            HighSpeedPermissionResult {
                is_valid: true,
                device_id: module_id,
                permission_granted: true,
            }
        }
        mode::REJECTED | mode::NEGATIVE => HighSpeedPermissionResult {
            is_valid: true,
            device_id: module_id,
            permission_granted: false,
        },
        _ => HighSpeedPermissionResult::default(),
    }
}

/// Detects a module refusing the switch to high speed after it was commanded
pub fn parse_high_speed_refusal(message: &Message) -> Response<bool> {
    let actual = message.bytes();
    if actual.len() < 5 || actual[0] != priority::PHYSICAL0 || actual[1] != device_id::TOOL {
        return Response::create(ResponseStatus::UnexpectedResponse, false);
    }
    if matches!(actual[3], mode::REJECTED | mode::NEGATIVE) && actual[4] == mode::HIGH_SPEED {
        return Response::create(ResponseStatus::Success, true);
    }
    Response::create(ResponseStatus::UnexpectedResponse, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests() {
        assert_eq!(
            create_high_speed_permission_request(device_id::BROADCAST).bytes(),
            &[0x6C, 0xFE, 0xF0, 0xA0]
        );
        assert_eq!(create_begin_high_speed(0x10).bytes(), &[0x6C, 0x10, 0xF0, 0xA1]);
    }

    #[test]
    fn permission_replies() {
        let granted =
            parse_high_speed_permission_response(&Message::new(vec![0x6C, 0xF0, 0x10, 0xE0]));
        assert_eq!(
            granted,
            HighSpeedPermissionResult {
                is_valid: true,
                device_id: 0x10,
                permission_granted: true
            }
        );
        let denied = parse_high_speed_permission_response(&Message::new(vec![
            0x6C, 0xF0, 0x40, 0x7F, 0xA0,
        ]));
        assert!(denied.is_valid);
        assert_eq!(denied.device_id, 0x40);
        assert!(!denied.permission_granted);

        let chatter =
            parse_high_speed_permission_response(&Message::new(vec![0x48, 0x6B, 0x10, 0x41]));
        assert!(!chatter.is_valid);
        let short = parse_high_speed_permission_response(&Message::new(vec![0x6C, 0xF0]));
        assert!(!short.is_valid);
    }

    #[test]
    fn refusal() {
        let refusal = Message::new(vec![0x6C, 0xF0, 0xFE, 0x7F, 0xA1]);
        assert_eq!(
            parse_high_speed_refusal(&refusal),
            Response::create(ResponseStatus::Success, true)
        );
        let other = Message::new(vec![0x6C, 0xF0, 0xFE, 0x7F, 0xA0]);
        assert_eq!(parse_high_speed_refusal(&other).status(), ResponseStatus::UnexpectedResponse);
    }
}
