//! The passthru API (Also known as SAE J2534) is an adapter protocol used by many vehicle
//! interface vendors.
//!
//! This device connects the adapter's J1850VPW channel, at 10.4kbps or 41.6kbps, and filters
//! it down to frames the PCM sends to the tool.
//!
//! Finding which libraries are installed is left to the caller, [PassthruDevice::new] takes the
//! path of the vendor library directly.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use j2534_rust::{FilterType, IoctlID, PASSTHRU_MSG, PassthruError, Protocol};

use super::{
    Device, DeviceCapabilities, DeviceConfig, DeviceState, HardwareError, HardwareResult,
    TimeoutScenario,
};
use crate::{message::Message, vpw::VpwSpeed};

mod lib_funcs;
pub use lib_funcs::{DrvVersion, PassthruDrv};

/// Frame is an echo of something this adapter transmitted
const TX_MSG_TYPE: u32 = 0x0000_0001;
/// First part of a frame still being received
const START_OF_MESSAGE: u32 = 0x0000_0002;
/// Transmit confirmation
const TX_INDICATION: u32 = 0x0000_0008;

/// Only pass `6C F0 10`, and `6D F0 10` block replies, through to the receive queue
const FILTER_MASK: [u8; 3] = [0xFE, 0xFF, 0xFF];
const FILTER_PATTERN: [u8; 3] = [0x6C, 0xF0, 0x10];

const READ_TIMEOUT_MS: u32 = 2000;
const WRITE_TIMEOUT_MS: u32 = 2000;

/// A J2534 adapter connected to the VPW bus
#[derive(Debug)]
pub struct PassthruDevice {
    lib_path: PathBuf,
    drv: Option<PassthruDrv>,
    device_idx: Option<u32>,
    channel_idx: Option<u32>,
    state: DeviceState,
}

impl PassthruDevice {
    /// Creates a device that will load the vendor library at `lib_path` when initialized
    pub fn new(lib_path: impl AsRef<Path>, config: DeviceConfig) -> Self {
        let mut state = DeviceState::new(config);
        // The J2534 standard allows 4KB, but not every adapter manages it
        state.max_send_size = 2048 + 12;
        state.max_receive_size = 2048 + 12;
        state.capabilities = DeviceCapabilities::SUPPORTS_4X
            | DeviceCapabilities::SINGLE_DPID_LOGGING
            | DeviceCapabilities::STREAM_LOGGING;
        Self {
            lib_path: lib_path.as_ref().to_path_buf(),
            drv: None,
            device_idx: None,
            channel_idx: None,
            state,
        }
    }

    /// Versions reported by the library and adapter
    pub fn version(&self) -> HardwareResult<DrvVersion> {
        self.safe_passthru_op(|idx, drv| drv.get_version(idx))
    }

    /// Runs `f` against the open device, asking the library for detail if it returns ERR_FAILED
    fn safe_passthru_op<X, T: FnOnce(u32, &PassthruDrv) -> lib_funcs::PassthruResult<X>>(
        &self,
        f: T,
    ) -> HardwareResult<X> {
        let (Some(drv), Some(idx)) = (self.drv.as_ref(), self.device_idx) else {
            return Err(HardwareError::DeviceNotOpen);
        };
        f(idx, drv).map_err(|e| {
            if e == PassthruError::ERR_FAILED {
                if let Ok(reason) = drv.get_last_error() {
                    return HardwareError::APIError {
                        code: e as u32,
                        desc: reason,
                    };
                }
            }
            e.into()
        })
    }

    fn channel(&self) -> HardwareResult<u32> {
        self.channel_idx.ok_or(HardwareError::DeviceNotOpen)
    }

    fn connect_vpw(&mut self, speed: VpwSpeed) -> HardwareResult<()> {
        let channel = self.safe_passthru_op(|idx, drv| {
            drv.connect(idx, Protocol::J1850VPW, 0, speed.baud_rate())
        })?;
        self.channel_idx = Some(channel);
        log::debug!("Protocol set");

        let mask = vpw_msg(&FILTER_MASK);
        let pattern = vpw_msg(&FILTER_PATTERN);
        self.safe_passthru_op(|_, drv| {
            drv.start_msg_filter(channel, FilterType::PASS_FILTER, &mask, &pattern)
        })?;
        Ok(())
    }

    fn disconnect_vpw(&mut self) -> HardwareResult<()> {
        if let Some(channel) = self.channel_idx.take() {
            self.safe_passthru_op(|_, drv| drv.disconnect(channel))?;
        }
        Ok(())
    }

    fn try_initialize(&mut self) -> HardwareResult<()> {
        // Start again from nothing if this device was already initialized
        self.close();
        let drv = PassthruDrv::load_lib(&self.lib_path)?;
        log::info!("Loaded {}", self.lib_path.display());
        let idx = drv.open()?;
        self.drv = Some(drv);
        self.device_idx = Some(idx);
        log::info!("Connected to the device");

        if let Ok(version) = self.version() {
            log::debug!(
                "Firmware {}, library {}, API {}",
                version.fw_version,
                version.dll_version,
                version.api_version
            );
        }
        match self.read_voltage() {
            Some(volts) => log::info!("Battery Voltage is: {volts:.2}"),
            None => log::debug!("Unable to read battery voltage"),
        }
        self.connect_vpw(self.state.speed)
    }

    /// Reads the next frame that is not an echo of our own transmission
    fn read_frame(&mut self) -> HardwareResult<Option<PASSTHRU_MSG>> {
        let channel = self.channel()?;
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(READ_TIMEOUT_MS as u64) {
            let msgs =
                self.safe_passthru_op(|_, drv| drv.read_messages(channel, 1, READ_TIMEOUT_MS))?;
            let Some(msg) = msgs.into_iter().next() else {
                return Ok(None);
            };
            if msg.rx_status == TX_INDICATION | TX_MSG_TYPE || msg.rx_status == START_OF_MESSAGE {
                continue;
            }
            return Ok(Some(msg));
        }
        Ok(None)
    }

    fn close(&mut self) {
        if let Err(e) = self.disconnect_vpw() {
            log::debug!("Disconnect failed: {e}");
        }
        if let (Some(drv), Some(idx)) = (self.drv.as_ref(), self.device_idx.take()) {
            // If this fails the device is already closed
            let _ = drv.close(idx);
        }
        self.drv = None;
    }
}

/// Builds a J1850VPW message holding `data`
fn vpw_msg(data: &[u8]) -> PASSTHRU_MSG {
    let mut msg = PASSTHRU_MSG::default();
    msg.protocol_id = Protocol::J1850VPW as u32;
    msg.data_size = data.len() as u32;
    msg.data[..data.len()].copy_from_slice(data);
    msg
}

impl Drop for PassthruDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl Device for PassthruDevice {
    fn initialize(&mut self) -> bool {
        log::info!("Initializing J2534 device");
        match self.try_initialize() {
            Ok(()) => {
                log::debug!("Device initialization complete");
                true
            }
            Err(e) => {
                log::error!("Unable to initialize J2534 device: {e}");
                false
            }
        }
    }

    fn send_message(&mut self, message: &Message) -> bool {
        log::debug!("TX: {message}");
        if message.len() > self.state.max_send_size {
            log::error!("Frame of {} bytes is too long for this adapter", message.len());
            return false;
        }
        let res = self.channel().and_then(|channel| {
            let mut msgs = [vpw_msg(message.bytes())];
            self.safe_passthru_op(|_, drv| drv.write_messages(channel, &mut msgs, WRITE_TIMEOUT_MS))
        });
        match res {
            Ok(_) => true,
            Err(e) => {
                log::error!("J2534 send failed: {e}");
                false
            }
        }
    }

    fn receive(&mut self) {
        match self.read_frame() {
            Ok(Some(msg)) => {
                let len = (msg.data_size as usize).min(msg.data.len());
                let message = Message::with_metadata(msg.data[..len].to_vec(), Instant::now(), 0);
                self.state.enqueue(message);
            }
            Ok(None) => log::debug!("J2534: no message waiting"),
            Err(e) => log::debug!("ReadMsgs error: {e}"),
        }
    }

    fn clear_message_buffer(&mut self) {
        let Ok(channel) = self.channel() else {
            return;
        };
        for ioctl in [IoctlID::CLEAR_RX_BUFFER, IoctlID::CLEAR_TX_BUFFER] {
            if let Err(e) = self.safe_passthru_op(|_, drv| {
                drv.ioctl(channel, ioctl, std::ptr::null_mut(), std::ptr::null_mut())
            }) {
                log::warn!("J2534 buffer clear failed: {e}");
            }
        }
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario {
        // Reads use a fixed timeout on this adapter
        std::mem::replace(&mut self.state.scenario, scenario)
    }

    fn set_vpw_speed_internal(&mut self, speed: VpwSpeed) -> bool {
        log::debug!("J2534 setting VPW {speed}");
        let res = self.disconnect_vpw().and_then(|_| self.connect_vpw(speed));
        match res {
            Ok(()) => true,
            Err(e) => {
                log::error!("J2534 speed change failed: {e}");
                false
            }
        }
    }

    fn read_voltage(&mut self) -> Option<f32> {
        let mut output: u32 = 0;
        self.safe_passthru_op(|idx, drv| {
            drv.ioctl(
                idx,
                IoctlID::READ_VBATT,
                std::ptr::null_mut(),
                (&mut output) as *mut _ as *mut c_void,
            )
        })
        .ok()
        .map(|_| output as f32 / 1000.0)
    }

    fn state(&self) -> &DeviceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }
}

impl From<PassthruError> for HardwareError {
    fn from(err: PassthruError) -> Self {
        HardwareError::APIError {
            code: err as u32,
            desc: err.to_string(),
        }
    }
}
