//! Bus housekeeping requests and the instrument cluster text display

use super::do_simple_validation;
use crate::{
    VpwError, VpwResult,
    message::Message,
    response::Response,
    vpw::{device_id, mode, priority, submode},
};

/// Tells every module a tool is still connected
pub fn create_test_device_present_notification() -> Message {
    Message::new(vec![
        priority::PHYSICAL0_HIGH,
        device_id::BROADCAST,
        device_id::TOOL,
        mode::TEST_DEVICE_PRESENT,
    ])
}

/// Clears diagnostic trouble codes
pub fn create_clear_diagnostic_trouble_codes_request() -> Message {
    Message::new(vec![
        priority::FUNCTIONAL0,
        priority::FUNCTIONAL2,
        device_id::TOOL,
        mode::CLEAR_DIAGNOSTIC_TROUBLE_CODES,
    ])
}

/// Expected PCM reply to [create_clear_diagnostic_trouble_codes_request]
pub fn create_clear_diagnostic_trouble_codes_ok() -> Message {
    Message::new(vec![
        priority::FUNCTIONAL0_LOW,
        0x6B,
        device_id::PCM,
        mode::CLEAR_DIAGNOSTIC_TROUBLE_CODES + mode::RESPONSE,
    ])
}

/// Clears diagnostic information on every module
pub fn create_clear_diagnostic_information_request() -> Message {
    Message::new(vec![
        priority::PHYSICAL0_HIGH,
        device_id::BROADCAST,
        device_id::TOOL,
        mode::CLEAR_DIAGNOSTIC_INFORMATION,
    ])
}

/// Asks every module to stop normal bus chatter
pub fn create_disable_normal_message_transmission() -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::BROADCAST,
        device_id::TOOL,
        mode::SILENCE_BUS,
        submode::NULL,
    ])
}

/// Expected PCM reply to [create_disable_normal_message_transmission]
pub fn create_disable_normal_message_transmission_ok() -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::TOOL,
        device_id::PCM,
        mode::SILENCE_BUS + mode::RESPONSE,
        submode::NULL,
    ])
}

/// Asks a PCM whether it is sitting in the boot block recovery loop
pub fn create_recovery_query() -> Message {
    Message::new(vec![
        priority::PHYSICAL0,
        device_id::PCM,
        device_id::TOOL,
        mode::RECOVERY,
    ])
}

/// Parses the broadcast sent by a PCM in recovery mode. Two forms exist in the wild
pub fn parse_recovery_mode_broadcast(message: &Message) -> Response<bool> {
    let rc = do_simple_validation(message, priority::PHYSICAL0, mode::RECOVERY, &[0x01]);
    if *rc.value() {
        return rc;
    }
    do_simple_validation(message, priority::PHYSICAL0, 0xA2, &[0x00])
}

/// Builds the messages that put text on the instrument cluster display.
///
/// Consecutive text messages must alternate a toggle bit, so the builder keeps that state
#[derive(Debug, Default)]
pub struct DisplayRequestBuilder {
    odd: bool,
}

impl DisplayRequestBuilder {
    /// Creates a builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the display. Resets the toggle
    pub fn begin(&mut self) -> Message {
        self.odd = true;
        Message::new(vec![0x8A, 0xEA, 0x10, 0xB1, 0x01, 0x10, 0x11, 0x14, 0x02, 0x00])
    }

    /// Shows 4 or 5 characters of ASCII text
    pub fn text(&mut self, text: &str) -> VpwResult<Message> {
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(VpwError::ParameterInvalid(
                "Text must be 4 or 5 ASCII characters.".into(),
            ));
        }
        let alternate = if self.odd { 0xB2 } else { 0x32 };
        self.odd = !self.odd;

        let mut bytes = vec![0x8A, 0xEB, 0x10, alternate, 0x01, 0x11];
        bytes.extend_from_slice(text.as_bytes());
        if text.len() == 4 {
            bytes.push(0x04);
        }
        Ok(Message::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseStatus;

    #[test]
    fn housekeeping_layouts() {
        assert_eq!(create_test_device_present_notification().bytes(), &[0x8C, 0xFE, 0xF0, 0x3F]);
        assert_eq!(
            create_clear_diagnostic_trouble_codes_request().bytes(),
            &[0x68, 0x6A, 0xF0, 0x04]
        );
        assert_eq!(
            create_clear_diagnostic_information_request().bytes(),
            &[0x8C, 0xFE, 0xF0, 0x14]
        );
        assert_eq!(
            create_disable_normal_message_transmission().bytes(),
            &[0x6C, 0xFE, 0xF0, 0x28, 0x00]
        );
        assert_eq!(
            create_disable_normal_message_transmission_ok().bytes(),
            &[0x6C, 0xF0, 0x10, 0x68, 0x00]
        );
    }

    #[test]
    fn recovery_broadcasts() {
        let a = Message::new(vec![0x6C, 0xF0, 0x10, 0xA2, 0x01]);
        assert_eq!(parse_recovery_mode_broadcast(&a).status(), ResponseStatus::Success);
        let b = Message::new(vec![0x6C, 0xF0, 0x10, 0xE2, 0x00]);
        assert_eq!(parse_recovery_mode_broadcast(&b).status(), ResponseStatus::Success);
        let neither = Message::new(vec![0x6C, 0xF0, 0x10, 0x7C, 0x01]);
        assert!(!parse_recovery_mode_broadcast(&neither).value());
    }

    #[test]
    fn display_toggles() {
        let mut builder = DisplayRequestBuilder::new();
        assert_eq!(builder.begin()[3], 0xB1);
        let first = builder.text("ABCD").unwrap();
        assert_eq!(
            first.bytes(),
            &[0x8A, 0xEB, 0x10, 0xB2, 0x01, 0x11, b'A', b'B', b'C', b'D', 0x04]
        );
        let second = builder.text("HELLO").unwrap();
        assert_eq!(second[3], 0x32);
        assert_eq!(second.len(), 11);
        assert!(builder.text("TOO LONG").is_err());
        assert!(builder.text("abc").is_err());
    }
}
