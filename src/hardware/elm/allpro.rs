//! AllPro adapters. These set the frame header with `AT SH` and send the rest as hex, and can
//! run the bus at 4x

use super::{ElmLink, payload_hex, process_response};
use crate::{
    channel::{ByteChannel, ChannelResult},
    hardware::{DeviceState, MAXIMUM_TIMEOUT_MS, TimeoutScenario},
    message::Message,
    utility::to_hex,
    vpw::VpwSpeed,
};

/// Name of the adapter family
pub const DEVICE_TYPE: &str = "AllPro";

/// 1KiB payloads plus block overhead
pub const MAX_SEND_SIZE: usize = 1024 + 12;

/// 1KiB payloads plus block overhead
pub const MAX_RECEIVE_SIZE: usize = 1024 + 12;

/// AllPro specific state
#[derive(Debug, Clone, Default)]
pub struct AllPro {
    current_header: Option<String>,
}

impl AllPro {
    /// Identifies an AllPro with `AT #1`
    pub fn detect<C: ByteChannel>(link: &mut ElmLink<C>) -> ChannelResult<Option<Self>> {
        let id = link.send_request("AT #1")?;
        if id.is_empty() || id == "?" {
            log::debug!("This is not an AllPro device");
            return Ok(None);
        }
        log::info!("All Pro ID: {id}");
        log::info!("All Pro self test result: {}", link.send_request("AT #3")?);
        log::info!("All Pro firmware: {}", link.send_request("AT @1")?);
        // The adapter was reset, so no header is set
        Ok(Some(Self::default()))
    }

    /// Sends a frame, first setting the header if it differs from the last one sent
    pub fn send_message<C: ByteChannel>(
        &mut self,
        link: &mut ElmLink<C>,
        state: &mut DeviceState,
        message: &Message,
    ) -> ChannelResult<bool> {
        let header = to_hex(message.bytes().get(..3).unwrap_or_default());
        if self.current_header.as_deref() != Some(header.as_str()) {
            let request = format!("AT SH {header}");
            let mut reply = link.send_request(&request)?;
            log::debug!("Set header response: {reply}");
            if reply == "STOPPED" {
                reply = link.send_request(&request)?;
                log::debug!("Set header response: {reply}");
            }
            if !process_response(&reply, "set-header command", false, state) {
                return Ok(false);
            }
            self.current_header = Some(header);
        }

        let reply = link.send_request(&payload_hex(message))?;
        Ok(process_response(&reply, "message content", false, state))
    }
}

/// Adapter timeout for each scenario. These were tuned on hardware rather than derived from
/// frame sizes
pub fn timeout_ms(scenario: TimeoutScenario, speed: VpwSpeed) -> u32 {
    use TimeoutScenario::*;
    match (speed, scenario) {
        (_, Maximum) => MAXIMUM_TIMEOUT_MS,
        (_, Minimum) => 0,
        (_, ReadCrc) => 100,
        (_, EraseMemoryBlock) => 7000,
        (VpwSpeed::Standard, ReadProperty) => 25,
        (VpwSpeed::Standard, ReadMemoryBlock) => 300,
        (VpwSpeed::Standard, WriteMemoryBlock) => 250,
        (VpwSpeed::Standard, SendKernel) => 50,
        (VpwSpeed::Standard, DataLogging1) => 25,
        (VpwSpeed::Standard, DataLogging2) => 40,
        (VpwSpeed::Standard, DataLogging3) => 60,
        (VpwSpeed::Standard, DataLogging4) => 75,
        (VpwSpeed::Standard, DataLoggingStreaming) => 0,
        (VpwSpeed::FourX, ReadProperty) => 12,
        (VpwSpeed::FourX, ReadMemoryBlock) => 50,
        (VpwSpeed::FourX, WriteMemoryBlock) => 170,
        (VpwSpeed::FourX, SendKernel) => 10,
        (VpwSpeed::FourX, DataLogging1) => 7,
        (VpwSpeed::FourX, DataLogging2) => 10,
        (VpwSpeed::FourX, DataLogging3) => 15,
        (VpwSpeed::FourX, DataLogging4) => 25,
        (VpwSpeed::FourX, DataLoggingStreaming) => 15,
    }
}
