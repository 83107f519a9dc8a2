//! ELM327 derived adapters.
//!
//! These adapters are driven with AT commands and exchange frames as ASCII hex terminated by a
//! `>` prompt. Initialization is shared, then the adapter is identified as either an AllPro or
//! an OBDLink ScanTool, which differ in how they send frames and how timeouts are chosen.

pub mod allpro;
pub mod scantool;

use allpro::AllPro;
use scantool::ScanTool;

use super::{Device, DeviceCapabilities, DeviceConfig, DeviceState, TimeoutScenario};
use crate::{
    channel::{ByteChannel, ChannelResult, SerialConfig},
    framing::{FrameReader, elm::ElmFramer},
    message::Message,
    utility::{parse_hex, to_hex},
    vpw::{VpwSpeed, device_id},
};

/// Serial speed of ELM based adapters
pub const ELM_BAUD_RATE: u32 = 115200;

/// Priority, destination, source and mode
const VPW_HEADER_LEN: usize = 4;

/// ELM clone firmware that can't handle VPW block transfers
const UNSUPPORTED_ELM_ID: &str = "ELM327 v1.5";

/// AT command text link to an ELM adapter
#[derive(Debug)]
pub struct ElmLink<C: ByteChannel> {
    channel: C,
    reader: FrameReader<ElmFramer>,
}

impl<C: ByteChannel> ElmLink<C> {
    fn new(channel: C) -> Self {
        Self {
            channel,
            reader: FrameReader::new(),
        }
    }

    /// Reads up to the next prompt. An empty string means the channel timed out
    pub fn read_line(&mut self) -> ChannelResult<String> {
        loop {
            match self.channel.read_byte()? {
                Some(byte) => {
                    if let Some(line) = self.reader.push(byte) {
                        return Ok(line);
                    }
                }
                None => {
                    self.reader.reset();
                    return Ok(String::new());
                }
            }
        }
    }

    /// Sends a command line and returns the adapter's reply
    pub fn send_request(&mut self, request: &str) -> ChannelResult<String> {
        log::debug!("TX: {request}");
        self.channel.write_bytes(format!("{request} \r").as_bytes())?;
        self.read_line()
    }

    /// Sends a command and checks the reply is exactly `expected`
    pub fn send_and_verify(&mut self, request: &str, expected: &str) -> ChannelResult<bool> {
        let actual = self.send_request(request)?;
        if actual == expected {
            log::debug!("{actual}");
            return Ok(true);
        }
        log::debug!("Did not receive expected response. {actual} does not equal {expected}");
        Ok(false)
    }
}

fn is_hex_segment(segment: &str) -> bool {
    segment.bytes().any(|b| b.is_ascii_hexdigit())
        && segment.bytes().all(|b| b.is_ascii_hexdigit() || b == b' ')
}

/// Interprets an adapter reply, queueing any frames it contains.
///
/// Each hex word is one frame with the adapter's checksum byte on the end, which is dropped.
/// Returns false for replies that are neither frames nor an acknowledgement
pub fn process_response(
    raw: &str,
    context: &str,
    allow_empty: bool,
    state: &mut DeviceState,
) -> bool {
    if raw.trim().is_empty() {
        log::debug!(
            "Empty response to {context}. {}",
            if allow_empty { "That's OK" } else { "That's not OK." }
        );
        return allow_empty;
    }
    // NO DATA means the send worked but nothing replied straight away
    if raw == "OK" || raw == "NO DATA" {
        return true;
    }

    for segment in raw.split('<') {
        if is_hex_segment(segment) {
            for word in segment.split_whitespace() {
                let Some(mut bytes) = parse_hex(word) else {
                    log::warn!("Unparseable hex in response to {context}: {word}");
                    continue;
                };
                bytes.pop();
                if bytes.len() < VPW_HEADER_LEN {
                    log::warn!("Response to {context} too short for a VPW frame: {word}");
                    continue;
                }
                state.enqueue(Message::new(bytes));
            }
            return true;
        }
        if segment.ends_with("OK") {
            log::warn!("Response not valid, but ends with OK: {segment}");
            return true;
        }
        log::warn!("Unexpected response to {context}: {segment}");
    }
    false
}

/// The adapter family detected during initialization
#[derive(Debug, Clone)]
pub enum ElmVariant {
    /// AllPro adapters
    AllPro(AllPro),
    /// OBDLink ScanTool adapters
    ScanTool(ScanTool),
}

impl ElmVariant {
    fn name(&self) -> &'static str {
        match self {
            Self::AllPro(_) => allpro::DEVICE_TYPE,
            Self::ScanTool(_) => scantool::DEVICE_TYPE,
        }
    }
}

/// An ELM327 derived adapter on a serial channel
#[derive(Debug)]
pub struct ElmDevice<C: ByteChannel> {
    link: ElmLink<C>,
    port_name: String,
    state: DeviceState,
    variant: Option<ElmVariant>,
}

impl<C: ByteChannel> ElmDevice<C> {
    /// Creates a device that will open `port_name` on `channel` when initialized
    pub fn new(channel: C, port_name: impl Into<String>, config: DeviceConfig) -> Self {
        let mut state = DeviceState::new(config);
        // Only used until the adapter family is known
        state.max_send_size = 200;
        state.max_receive_size = 200;
        Self {
            link: ElmLink::new(channel),
            port_name: port_name.into(),
            state,
            variant: None,
        }
    }

    /// Adapter family detected during [Device::initialize]
    pub fn variant(&self) -> Option<&ElmVariant> {
        self.variant.as_ref()
    }

    /// Name of the adapter family
    pub fn device_type(&self) -> &'static str {
        self.variant.as_ref().map_or("ObdLink or AllPro", ElmVariant::name)
    }

    fn shared_initialization(&mut self) -> ChannelResult<bool> {
        // A bare line first so a partial command in the adapter doesn't break AT Z
        self.link.send_request("")?;
        log::debug!("{}", self.link.send_request("AT Z")?);
        log::debug!("{}", self.link.send_request("AT E0")?);
        log::debug!("{}", self.link.send_request("AT S0")?);
        log::info!("Voltage: {}", self.link.send_request("AT RV")?);

        let elm_id = self.link.send_request("AT I")?;
        if elm_id != "?" {
            log::info!("Elm ID: {elm_id}");
            if elm_id.contains(UNSUPPORTED_ELM_ID) {
                log::error!("This OBD2 interface is not supported");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn try_initialize(&mut self) -> ChannelResult<bool> {
        let mut config = SerialConfig::new(self.port_name.clone(), ELM_BAUD_RATE);
        config.timeout_ms = 1200;
        self.link.channel.open(&config)?;
        self.link.channel.discard_buffers()?;

        if !self.shared_initialization()? {
            return Ok(false);
        }

        let variant = if let Some(allpro) = AllPro::detect(&mut self.link)? {
            ElmVariant::AllPro(allpro)
        } else if let Some(scantool) = ScanTool::detect(&mut self.link)? {
            ElmVariant::ScanTool(scantool)
        } else {
            log::error!("Unable to identify the ELM adapter");
            return Ok(false);
        };

        let tool_filter = format!("AT SR {:02X}", device_id::TOOL);
        let commands = [
            // Allow long packets
            ("AT AL", "OK"),
            // Protocol 2 is VPW
            ("AT SP2", "OK"),
            ("AT DP", "SAE J1850 VPW"),
            ("AT AR", "OK"),
            // No adaptive timing
            ("AT AT0", "OK"),
            (tool_filter.as_str(), "OK"),
            ("AT H1", "OK"),
            // Adjusted later by set_timeout
            ("AT ST 20", "OK"),
        ];
        for (request, expected) in commands {
            if !self.link.send_and_verify(request, expected)? {
                return Ok(false);
            }
        }

        let (send, receive, capabilities) = match &variant {
            ElmVariant::AllPro(_) => (
                allpro::MAX_SEND_SIZE,
                allpro::MAX_RECEIVE_SIZE,
                DeviceCapabilities::SUPPORTS_4X,
            ),
            ElmVariant::ScanTool(_) => (
                scantool::MAX_SEND_SIZE,
                scantool::MAX_RECEIVE_SIZE,
                DeviceCapabilities::empty(),
            ),
        };
        self.state.max_send_size = send;
        self.state.max_receive_size = receive;
        self.state.capabilities = capabilities;
        log::info!("{} initialized", variant.name());
        self.variant = Some(variant);
        Ok(true)
    }

    fn try_set_timeout(&mut self, milliseconds: u32) -> ChannelResult<()> {
        // The port must wait well beyond the adapter, or replies show up as STOPPED or NO DATA
        self.link.channel.set_timeout(milliseconds + 1000)?;
        let parameter = (milliseconds / 4).min(0xFF);
        let reply = self.link.send_request(&format!("AT ST {parameter:02X}"))?;
        process_response(&reply, "set timeout", false, &mut self.state);
        Ok(())
    }

    fn send_inner(&mut self, message: &Message) -> ChannelResult<bool> {
        match &mut self.variant {
            Some(ElmVariant::AllPro(allpro)) => {
                allpro.send_message(&mut self.link, &mut self.state, message)
            }
            Some(ElmVariant::ScanTool(scantool)) => {
                scantool.send_message(&mut self.link, &mut self.state, message)
            }
            None => {
                log::error!("ELM device used before initialization");
                Ok(false)
            }
        }
    }
}

impl<C: ByteChannel> Device for ElmDevice<C> {
    fn initialize(&mut self) -> bool {
        log::debug!("ElmDevice initialization starting");
        match self.try_initialize() {
            Ok(ok) => ok,
            Err(e) => {
                log::error!("Unable to initialize ELM device: {e}");
                false
            }
        }
    }

    fn send_message(&mut self, message: &Message) -> bool {
        log::debug!("TX: {message}");
        self.send_inner(message).unwrap_or_else(|e| {
            log::error!("ELM send failed: {e}");
            false
        })
    }

    fn receive(&mut self) {
        match self.link.read_line() {
            Ok(line) => {
                process_response(&line, "receive", false, &mut self.state);
            }
            Err(e) => log::debug!("Timeout during receive: {e}"),
        }
    }

    fn clear_message_buffer(&mut self) {
        self.link.reader.reset();
        if let Err(e) = self.link.channel.discard_buffers() {
            log::warn!("ELM discard failed: {e}");
        }
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario {
        if self.state.scenario == scenario {
            return scenario;
        }
        let milliseconds = match &self.variant {
            Some(ElmVariant::AllPro(_)) => allpro::timeout_ms(scenario, self.state.speed),
            _ => self.state.vpw_timeout_ms(scenario),
        };
        log::debug!("Setting timeout for {scenario}, {milliseconds} ms");
        if let Err(e) = self.try_set_timeout(milliseconds) {
            log::warn!("Unable to set ELM timeout: {e}");
        }
        std::mem::replace(&mut self.state.scenario, scenario)
    }

    fn set_vpw_speed_internal(&mut self, speed: VpwSpeed) -> bool {
        let command = match speed {
            VpwSpeed::Standard => "AT VPW1",
            VpwSpeed::FourX => "AT VPW4",
        };
        log::debug!("ELM setting {speed}");
        self.link.send_and_verify(command, "OK").unwrap_or_else(|e| {
            log::error!("ELM speed change failed: {e}");
            false
        })
    }

    fn state(&self) -> &DeviceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }
}

/// Formats the bytes after the 3 byte header as compact hex
fn payload_hex(message: &Message) -> String {
    to_hex(message.bytes().get(3..).unwrap_or_default()).replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulation::SimulationChannel;

    /// Scripts the replies every ELM adapter gives during initialization
    pub(crate) fn scripted_base() -> SimulationChannel {
        let mut channel = SimulationChannel::new();
        for (request, reply) in [
            (" \r", "?\r\r>"),
            ("AT Z \r", "\r\rELM327 v1.4b\r\r>"),
            ("AT E0 \r", "OK\r\r>"),
            ("AT S0 \r", "OK\r\r>"),
            ("AT RV \r", "12.6V\r\r>"),
            ("AT I \r", "ELM327 v1.4b\r\r>"),
            ("AT AL \r", "OK\r\r>"),
            ("AT SP2 \r", "OK\r\r>"),
            ("AT DP \r", "SAE J1850 VPW\r\r>"),
            ("AT AR \r", "OK\r\r>"),
            ("AT AT0 \r", "OK\r\r>"),
            ("AT SR F0 \r", "OK\r\r>"),
            ("AT H1 \r", "OK\r\r>"),
            ("AT ST 20 \r", "OK\r\r>"),
        ] {
            channel.add_response(request.as_bytes(), reply.as_bytes());
        }
        channel
    }

    #[test]
    fn response_processing() {
        let mut state = DeviceState::new(DeviceConfig::default());
        assert!(process_response("OK", "test", false, &mut state));
        assert!(process_response("NO DATA", "test", false, &mut state));
        assert!(!process_response("", "test", false, &mut state));
        assert!(process_response("", "test", true, &mut state));
        assert!(!process_response("BUS ERROR", "test", false, &mut state));
        assert_eq!(state.queue_len(), 0);

        assert!(process_response("6CF0107C01AA 6CF0107C02BB", "test", false, &mut state));
        assert_eq!(state.queue_len(), 2);
    }

    #[test]
    fn short_words_are_not_queued() {
        let mut state = DeviceState::new(DeviceConfig::default());
        assert!(process_response("6C 10", "test", false, &mut state));
        assert_eq!(state.queue_len(), 0);
        // Header plus checksum, but no mode byte
        assert!(process_response("6CF010AA 6CF0107C01AA", "test", false, &mut state));
        assert_eq!(state.queue_len(), 1);
    }

    #[test]
    fn rejects_v15_clones() {
        let mut channel = scripted_base();
        channel.add_response(b"AT I \r", b"ELM327 v1.5\r\r>");
        let mut device = ElmDevice::new(channel, "sim", DeviceConfig::default());
        assert!(!device.initialize());
    }

    #[test]
    fn unidentified_adapter_fails() {
        let mut channel = scripted_base();
        channel.add_response(b"AT #1 \r", b"?\r\r>");
        channel.add_response(b"ST I \r", b"?\r\r>");
        let mut device = ElmDevice::new(channel, "sim", DeviceConfig::default());
        assert!(!device.initialize());
        assert_eq!(device.device_type(), "ObdLink or AllPro");
    }

    #[test]
    fn payload_is_compact_hex() {
        let msg = Message::new(vec![0x6C, 0x10, 0xF0, 0x3C, 0x01]);
        assert_eq!(payload_hex(&msg), "3C01");
    }
}
