//! AVT 838/842/852 serial adapters

use std::time::{Duration, Instant};

use strum_macros::Display;

use super::{Device, DeviceCapabilities, DeviceConfig, DeviceState, TimeoutScenario};
use crate::{
    channel::{ByteChannel, ChannelResult, SerialConfig},
    framing::{
        FrameReader,
        avt::{AvtFrame, AvtFramer, encode},
    },
    message::Message,
    utility::compare_arrays_part,
    vpw::{VpwSpeed, device_id},
};

const RESET: [u8; 2] = [0xF1, 0xA5];
const ENTER_VPW_MODE: [u8; 2] = [0xE1, 0x33];
const REQUEST_FIRMWARE: [u8; 1] = [0xB0];
const DISABLE_TX_ACK: [u8; 3] = [0x52, 0x40, 0x00];
const FILTER_DEST: [u8; 3] = [0x52, 0x5B, device_id::TOOL];
const SPEED_1X: [u8; 2] = [0xC1, 0x00];
const SPEED_4X: [u8; 2] = [0xC1, 0x01];

const VPW_MODE_OK: [u8; 1] = [0x07];
const FIRMWARE: [u8; 1] = [0x04];
const FILTER_DEST_OK: [u8; 2] = [0x5B, device_id::TOOL];
const DISABLE_TX_ACK_OK: [u8; 2] = [0x40, 0x00];

/// Default serial speed of the 838 and 842. The USB 852 ignores it
pub const AVT_BAUD_RATE: u32 = 57600;

/// How long to wait for a specific adapter reply during setup
const FIND_RESPONSE_TIMEOUT: Duration = Duration::from_millis(3000);

/// How long a single packet may take to arrive once it has started
const PACKET_TIMEOUT: Duration = Duration::from_millis(2000);

/// AVT hardware model, detected from the reset reply
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum AvtModel {
    /// AVT 838
    #[strum(serialize = "AVT 838")]
    Avt838,
    /// AVT 842
    #[strum(serialize = "AVT 842")]
    Avt842,
    /// AVT 852
    #[strum(serialize = "AVT 852")]
    Avt852,
}

impl AvtModel {
    fn from_reset_reply(byte: u8) -> Option<Self> {
        match byte {
            0x27 => Some(Self::Avt852),
            0x12 => Some(Self::Avt842),
            0x07 => Some(Self::Avt838),
            _ => None,
        }
    }
}

/// An AVT adapter on a serial channel
#[derive(Debug)]
pub struct AvtDevice<C: ByteChannel> {
    channel: C,
    port_name: String,
    reader: FrameReader<AvtFramer>,
    state: DeviceState,
    model: Option<AvtModel>,
}

impl<C: ByteChannel> AvtDevice<C> {
    /// Creates a device that will open `port_name` on `channel` when initialized
    pub fn new(channel: C, port_name: impl Into<String>, config: DeviceConfig) -> Self {
        let mut state = DeviceState::new(config);
        // 4096 byte payloads plus the 10 byte block header and 2 byte checksum
        state.max_send_size = 4096 + 12;
        state.max_receive_size = 4096 + 12;
        state.capabilities = DeviceCapabilities::SUPPORTS_4X
            | DeviceCapabilities::SINGLE_DPID_LOGGING
            | DeviceCapabilities::STREAM_LOGGING;
        Self {
            channel,
            port_name: port_name.into(),
            reader: FrameReader::new(),
            state,
            model: None,
        }
    }

    /// Model detected during [Device::initialize]
    pub fn model(&self) -> Option<AvtModel> {
        self.model
    }

    /// Reads one packet. `None` if the channel goes quiet or a packet stalls
    fn read_packet(&mut self) -> ChannelResult<Option<AvtFrame>> {
        let deadline = Instant::now() + PACKET_TIMEOUT;
        while Instant::now() < deadline {
            match self.channel.read_byte()? {
                Some(byte) => {
                    if let Some(frame) = self.reader.push(byte) {
                        return Ok(Some(frame));
                    }
                }
                None => {
                    self.reader.reset();
                    return Ok(None);
                }
            }
        }
        self.reader.reset();
        Ok(None)
    }

    /// Reads packets until one starts with `expected`, for up to 3 seconds
    fn find_response(&mut self, expected: &[u8]) -> ChannelResult<Option<Vec<u8>>> {
        let start = Instant::now();
        while start.elapsed() < FIND_RESPONSE_TIMEOUT {
            if let Some(AvtFrame::Packet(data)) = self.read_packet()? {
                if compare_arrays_part(&data, expected) {
                    return Ok(Some(data));
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(None)
    }

    fn send_and_find(
        &mut self,
        command: &[u8],
        expected: &[u8],
        what: &str,
    ) -> ChannelResult<bool> {
        self.channel.write_bytes(command)?;
        match self.find_response(expected)? {
            Some(_) => {
                log::debug!("{what} OK");
                Ok(true)
            }
            None => {
                log::error!("AVT: {what} failed");
                Ok(false)
            }
        }
    }

    fn change_speed(&mut self, speed: VpwSpeed) -> ChannelResult<()> {
        match speed {
            VpwSpeed::Standard => {
                log::debug!("AVT setting VPW 1X");
                self.channel.write_bytes(&SPEED_1X)?;
            }
            VpwSpeed::FourX => {
                // The adapter reports the PCM's switch to high speed first
                self.read_packet()?;
                log::debug!("AVT setting VPW 4X");
                self.channel.write_bytes(&SPEED_4X)?;
            }
        }
        // C1 00 or C1 01 confirms the switch
        self.read_packet()?;
        Ok(())
    }

    fn try_initialize(&mut self) -> ChannelResult<bool> {
        let mut config = SerialConfig::new(self.port_name.clone(), AVT_BAUD_RATE);
        config.timeout_ms = 1000;
        self.channel.open(&config)?;
        self.channel.discard_buffers()?;

        log::debug!("Sending 'reset' message");
        self.channel.write_bytes(&RESET)?;
        let model = match self.read_packet()? {
            Some(AvtFrame::Packet(data)) => {
                match data.first().copied().and_then(AvtModel::from_reset_reply) {
                    Some(model) => model,
                    None => {
                        log::error!("Unknown and unsupported AVT device detected");
                        return Ok(false);
                    }
                }
            }
            _ => {
                log::error!("AVT device not found or failed reset");
                return Ok(false);
            }
        };
        log::info!("{model} reset OK");
        self.model = Some(model);
        if model == AvtModel::Avt838 {
            self.state.max_send_size = 2048 + 12;
            self.state.max_receive_size = 2048 + 12;
            // The 852 volunteers its firmware version, the 838 has to be asked
            self.channel.write_bytes(&REQUEST_FIRMWARE)?;
        }

        match self.find_response(&FIRMWARE)? {
            Some(data) => {
                let firmware = data.get(1).copied().unwrap_or_default();
                log::info!("AVT firmware {}.{}", firmware >> 4, firmware & 0x0F);
            }
            None => {
                log::error!("AVT firmware not found or failed reset");
                return Ok(false);
            }
        }

        // The 838 starts in VPW mode
        if model != AvtModel::Avt838
            && !self.send_and_find(&ENTER_VPW_MODE, &VPW_MODE_OK, "Set VPW mode")?
        {
            return Ok(false);
        }
        if !self.send_and_find(&DISABLE_TX_ACK, &DISABLE_TX_ACK_OK, "Disable transmit acks")? {
            return Ok(false);
        }
        self.send_and_find(&FILTER_DEST, &FILTER_DEST_OK, "Configure tool filter")
    }
}

impl<C: ByteChannel> Device for AvtDevice<C> {
    fn initialize(&mut self) -> bool {
        log::debug!("Initializing AVT device on {}", self.port_name);
        match self.try_initialize() {
            Ok(ok) => ok,
            Err(e) => {
                log::error!("Unable to initialize AVT device: {e}");
                false
            }
        }
    }

    fn send_message(&mut self, message: &Message) -> bool {
        log::debug!("TX: {message}");
        match self.channel.write_bytes(&encode(message.bytes())) {
            Ok(()) => true,
            Err(e) => {
                log::error!("AVT send failed: {e}");
                false
            }
        }
    }

    fn receive(&mut self) {
        match self.read_packet() {
            Ok(Some(AvtFrame::Packet(data))) => self.state.enqueue(Message::new(data)),
            Ok(Some(AvtFrame::Rejected(_))) | Ok(None) => log::debug!("AVT: no message waiting"),
            Err(e) => log::warn!("AVT receive failed: {e}"),
        }
    }

    fn clear_message_buffer(&mut self) {
        if let Err(e) = self.channel.discard_buffers() {
            log::warn!("AVT discard failed: {e}");
        }
        self.reader.reset();
        std::thread::sleep(Duration::from_millis(50));
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario {
        // The adapter has no timeout setting, reads use the channel timeout
        std::mem::replace(&mut self.state.scenario, scenario)
    }

    fn set_vpw_speed_internal(&mut self, speed: VpwSpeed) -> bool {
        match self.change_speed(speed) {
            Ok(()) => true,
            Err(e) => {
                log::error!("AVT speed change failed: {e}");
                false
            }
        }
    }

    fn state(&self) -> &DeviceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulation::SimulationChannel;

    fn scripted_852() -> SimulationChannel {
        let mut channel = SimulationChannel::new();
        // Reset reply followed by the unsolicited firmware version
        channel.add_response(&RESET, &[0x91, 0x27, 0x92, 0x04, 0x15]);
        channel.add_response(&ENTER_VPW_MODE, &[0x91, 0x07]);
        channel.add_response(&DISABLE_TX_ACK, &[0x62, 0x40, 0x00]);
        channel.add_response(&FILTER_DEST, &[0x62, 0x5B, 0xF0]);
        channel
    }

    #[test]
    fn initialize_852() {
        let channel = scripted_852();
        let mut device = AvtDevice::new(channel.clone(), "sim", DeviceConfig::default());
        assert!(device.initialize());
        assert_eq!(device.model(), Some(AvtModel::Avt852));
        assert_eq!(device.max_receive_size(), 4096 + 12);
        assert!(device.supports_4x());
        assert_eq!(channel.written()[0], RESET.to_vec());
    }

    #[test]
    fn unknown_model_fails() {
        let mut channel = SimulationChannel::new();
        channel.add_response(&RESET, &[0x91, 0x55]);
        let mut device = AvtDevice::new(channel, "sim", DeviceConfig::default());
        assert!(!device.initialize());
        assert_eq!(device.model(), None);
    }

    #[test]
    fn send_prefixes_length() {
        let mut channel = scripted_852();
        let mut device = AvtDevice::new(channel.clone(), "sim", DeviceConfig::default());
        assert!(device.initialize());
        assert!(device.send_message(&Message::new(vec![0x6C, 0x10, 0xF0, 0x3C, 0x01])));
        assert_eq!(
            channel.written().last().unwrap(),
            &vec![0x05, 0x6C, 0x10, 0xF0, 0x3C, 0x01]
        );

        channel.push_rx(&[
            0x11, 0x0C, 0x00, 0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59,
            0xC3,
        ]);
        let reply = device.receive_message().unwrap();
        assert_eq!(
            reply.bytes(),
            &[0x6C, 0xF0, 0x10, 0x7C, 0x01, 0x00, 0x31, 0x47, 0x31, 0x59, 0x59]
        );
        assert!(device.receive_message().is_none());
    }
}
