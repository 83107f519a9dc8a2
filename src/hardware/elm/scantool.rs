//! OBDLink ScanTool adapters (STN chipset), which send whole frames with `STPX`

use super::{ElmLink, payload_hex, process_response};
use crate::{
    channel::{ByteChannel, ChannelResult},
    hardware::DeviceState,
    message::Message,
    utility::to_hex_compact,
};

/// Name of the adapter family
pub const DEVICE_TYPE: &str = "ObdLink SX";

/// Largest frame the STN firmware sends reliably, plus block overhead
pub const MAX_SEND_SIZE: usize = 192 + 12;

/// Reliability drops at 508 bytes and above
pub const MAX_RECEIVE_SIZE: usize = 512 + 12;

/// ScanTool specific state
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanTool;

impl ScanTool {
    /// Identifies a ScanTool with `ST I`
    pub fn detect<C: ByteChannel>(link: &mut ElmLink<C>) -> ChannelResult<Option<Self>> {
        let id = link.send_request("ST I")?;
        if id.is_empty() || id == "?" {
            log::debug!("This is not a ScanTool device");
            return Ok(None);
        }
        log::info!("ScanTool device ID: {id}");
        Ok(Some(Self))
    }

    /// Sends a frame as `STPX H:<header>, R:1, D:<data>`
    pub fn send_message<C: ByteChannel>(
        &mut self,
        link: &mut ElmLink<C>,
        state: &mut DeviceState,
        message: &Message,
    ) -> ChannelResult<bool> {
        let request = stpx_command(message);
        let mut reply = link.send_request(&request)?;
        if reply.is_empty() {
            reply = link.read_line()?;
        }
        Ok(process_response(&reply, "message content", false, state))
    }
}

/// Builds the `STPX` command for a frame, expecting one reply
pub fn stpx_command(message: &Message) -> String {
    let header = to_hex_compact(message.bytes().get(..3).unwrap_or_default());
    format!("STPX H:{header}, R:1, D:{}", payload_hex(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        Device, DeviceConfig,
        elm::{ElmDevice, ElmVariant, tests::scripted_base},
    };

    #[test]
    fn stpx_layout() {
        let msg = Message::new(vec![0x6C, 0x10, 0xF0, 0x3C, 0x01]);
        assert_eq!(stpx_command(&msg), "STPX H:6C10F0, R:1, D:3C01");
    }

    #[test]
    fn detects_scantool() {
        let mut channel = scripted_base();
        channel.add_response(b"AT #1 \r", b"?\r\r>");
        channel.add_response(b"ST I \r", b"STN1130 v4.2.0\r\r>");
        channel.add_response(
            b"STPX H:6C10F0, R:1, D:3C01 \r",
            b"6CF0107C01003147315959C3\r\r>",
        );

        let mut device = ElmDevice::new(channel, "sim", DeviceConfig::default());
        assert!(device.initialize());
        assert!(matches!(device.variant(), Some(ElmVariant::ScanTool(_))));
        assert_eq!(device.device_type(), DEVICE_TYPE);
        assert_eq!(device.max_receive_size(), MAX_RECEIVE_SIZE);
        assert!(!device.supports_4x());

        let reply = device
            .send_request(&Message::new(vec![0x6C, 0x10, 0xF0, 0x3C, 0x01]))
            .into_value()
            .unwrap();
        assert_eq!(reply[3], 0x7C);
        assert_eq!(reply.len(), 11);
    }
}
