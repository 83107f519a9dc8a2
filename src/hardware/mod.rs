//! The hardware module contains the adapters that can put VPW frames on the bus.
//!
//! Every adapter implements [Device]. Adapters differ only in how they frame bytes to and from
//! their transport, so orchestration code in [crate::vehicle] is written once against the trait.
//!
//! Currently, the following adapters are defined:
//! * [avt::AvtDevice] - AVT 838/842/852 serial adapters
//! * [elm::ElmDevice] - ELM327 derived adapters (OBDLink ScanTool, AllPro)
//! * [passthru::PassthruDevice] - SAE J2534 adapters (requires the `passthru` feature)
//! * [mock::MockDevice] - A simulated PCM for testing

pub mod avt;
pub mod elm;
pub mod mock;
#[cfg(feature = "passthru")]
pub mod passthru;
pub mod simulation;

use std::collections::VecDeque;

use bitflags::bitflags;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    channel::ChannelError,
    message::Message,
    response::{Response, ResponseStatus},
    vpw::VpwSpeed,
};

/// Hardware API result
pub type HardwareResult<T> = Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
/// Represents error that can be returned by a device
pub enum HardwareError {
    /// Low level driver error
    #[error("Hardware API Error. Code {code}, Description: {desc}")]
    APIError {
        /// API Error code
        code: u32,
        /// API Error description
        desc: String,
    },
    /// The adapter answered initialisation with something unexpected
    #[error("Device not recognised: {0}")]
    DeviceNotRecognised(String),
    /// Hardware not found
    #[error("Device not found")]
    DeviceNotFound,
    /// Function called on device that has not been opened
    #[error("Hardware device not open")]
    DeviceNotOpen,
    /// Error with the byte channel beneath the device
    #[error("Channel error")]
    Channel(
        #[from]
        #[source]
        ChannelError,
    ),
    /// Lib loading error
    #[cfg(feature = "passthru")]
    #[error("LibLoading error")]
    LibLoadError(
        #[from]
        #[source]
        libloading::Error,
    ),
}

/// Situations that need a different receive timeout.
///
/// Passed to [Device::set_timeout] before each kind of exchange
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Default)]
pub enum TimeoutScenario {
    /// Don't wait for replies
    #[default]
    Minimum,
    /// Reading a small property such as the VIN or OSID
    ReadProperty,
    /// Waiting for the kernel to compute a CRC
    ReadCrc,
    /// Reading a block of memory from the kernel
    ReadMemoryBlock,
    /// Waiting for a flash block erase
    EraseMemoryBlock,
    /// Waiting for a flash block write
    WriteMemoryBlock,
    /// Uploading a kernel
    SendKernel,
    /// Single row logging with 1 DPID
    DataLogging1,
    /// Single row logging with 2 DPIDs
    DataLogging2,
    /// Single row logging with 3 DPIDs
    DataLogging3,
    /// Single row logging with 4 DPIDs
    DataLogging4,
    /// Streamed logging
    DataLoggingStreaming,
    /// Longest timeout the adapters can represent
    Maximum,
}

impl TimeoutScenario {
    /// Single row logging scenario for `dpid_count` DPIDs
    pub fn for_dpid_count(dpid_count: usize) -> Self {
        match dpid_count {
            0 | 1 => Self::DataLogging1,
            2 => Self::DataLogging2,
            3 => Self::DataLogging3,
            _ => Self::DataLogging4,
        }
    }
}

/// Milliseconds the bus needs to carry the reply expected in `scenario`, plus 10%.
///
/// Derived from the size of the expected reply at 9 bits per byte. [TimeoutScenario::Maximum]
/// and the flash erase/write scenarios use the longest representable timeout.
pub fn vpw_timeout_ms(
    scenario: TimeoutScenario,
    speed: VpwSpeed,
    max_send_size: usize,
    max_receive_size: usize,
) -> u32 {
    let packet_size = match scenario {
        TimeoutScenario::Minimum => return 0,
        TimeoutScenario::Maximum
        | TimeoutScenario::EraseMemoryBlock
        | TimeoutScenario::WriteMemoryBlock => return MAXIMUM_TIMEOUT_MS,
        TimeoutScenario::ReadProperty => 50.0,
        // Only 15 bytes, but some adapters need far longer at 4x
        TimeoutScenario::ReadCrc => 1000.0,
        // 20 bytes for the 'read request accepted' message before the payload
        TimeoutScenario::ReadMemoryBlock => (20 + max_receive_size) as f64 * 2.5,
        TimeoutScenario::SendKernel => (max_send_size + 20) as f64,
        TimeoutScenario::DataLogging1 => 30.0,
        TimeoutScenario::DataLogging2 => 47.0,
        TimeoutScenario::DataLogging3 => 70.0,
        TimeoutScenario::DataLogging4 => 90.0,
        TimeoutScenario::DataLoggingStreaming => 0.0,
    };
    let bits_per_ms = match speed {
        VpwSpeed::Standard => 10.4,
        VpwSpeed::FourX => 41.6,
    };
    ((packet_size * 9.0 / bits_per_ms) * 1.1) as u32
}

/// Longest timeout an ELM style `AT ST` command can express
pub const MAXIMUM_TIMEOUT_MS: u32 = 0xFF * 4;

bitflags! {
    /// Optional features of an adapter
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DeviceCapabilities: u32 {
        /// Can switch the bus to 4x
        const SUPPORTS_4X = 0b0000_0001;
        /// Can log with single row DPID requests
        const SINGLE_DPID_LOGGING = 0b0000_0010;
        /// Can log with streamed DPID requests
        const STREAM_LOGGING = 0b0000_0100;
    }
}

/// Settings the caller chooses for a device
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Allow switching to 4x for reads and writes
    pub enable_4x: bool,
}

/// State shared by every device implementation
#[derive(Debug, Clone)]
pub struct DeviceState {
    queue: VecDeque<Message>,
    /// Largest frame the adapter can send
    pub max_send_size: usize,
    /// Largest frame the adapter can receive
    pub max_receive_size: usize,
    /// Current bus speed
    pub speed: VpwSpeed,
    /// Current timeout scenario
    pub scenario: TimeoutScenario,
    /// What the adapter can do
    pub capabilities: DeviceCapabilities,
    /// Caller allows 4x
    pub enable_4x: bool,
}

impl DeviceState {
    /// Creates state with the default 100 byte frame sizes at 1x
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            max_send_size: 100,
            max_receive_size: 100,
            speed: VpwSpeed::Standard,
            scenario: TimeoutScenario::Minimum,
            capabilities: DeviceCapabilities::empty(),
            enable_4x: config.enable_4x,
        }
    }

    /// Adds a received message to the queue
    pub fn enqueue(&mut self, message: Message) {
        log::debug!("RX: {message}");
        self.queue.push_back(message);
    }

    /// Number of queued messages
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Timeout for `scenario` at the current speed and frame sizes
    pub fn vpw_timeout_ms(&self, scenario: TimeoutScenario) -> u32 {
        vpw_timeout_ms(scenario, self.speed, self.max_send_size, self.max_receive_size)
    }
}

/// An adapter that can send and receive VPW frames
pub trait Device: Send {
    /// Opens and configures the adapter. Returns false on any failure, after logging why
    fn initialize(&mut self) -> bool;

    /// Sends one frame. Does not wait for a reply
    fn send_message(&mut self, message: &Message) -> bool;

    /// Reads whatever frames the adapter has and adds them to the queue with
    /// [DeviceState::enqueue]. Waits up to the current timeout for at least one
    fn receive(&mut self);

    /// Drops anything buffered by the adapter or its transport
    fn clear_message_buffer(&mut self);

    /// Configures the adapter's receive timeout. Returns the previous scenario
    fn set_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario;

    /// Switches the adapter between 1x and 4x
    fn set_vpw_speed_internal(&mut self, speed: VpwSpeed) -> bool;

    /// Shared device state
    fn state(&self) -> &DeviceState;

    /// Shared device state
    fn state_mut(&mut self) -> &mut DeviceState;

    /// Tries to read battery voltage from Pin 16 of an OBD port (+12V).
    /// Should the adapter not support this feature, [std::option::Option::None] is returned
    fn read_voltage(&mut self) -> Option<f32> {
        None
    }

    /// Returns the next received frame, reading from the adapter if the queue is empty
    fn receive_message(&mut self) -> Option<Message> {
        if self.state().queue.is_empty() {
            self.receive();
        }
        self.state_mut().queue.pop_front()
    }

    /// Sends a frame and waits for the next received frame
    fn send_request(&mut self, message: &Message) -> Response<Option<Message>> {
        if !self.send_message(message) {
            return Response::create(ResponseStatus::Error, None);
        }
        match self.receive_message() {
            Some(reply) => Response::create(ResponseStatus::Success, Some(reply)),
            None => Response::create(ResponseStatus::Timeout, None),
        }
    }

    /// Clears received frames, both queued and buffered
    fn clear_message_queue(&mut self) {
        self.state_mut().queue.clear();
        self.clear_message_buffer();
    }

    /// Changes bus speed. 4x is refused unless enabled in [DeviceConfig]
    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> bool {
        if self.state().speed == speed {
            return true;
        }
        if speed == VpwSpeed::FourX && !self.state().enable_4x {
            return false;
        }
        if !self.set_vpw_speed_internal(speed) {
            return false;
        }
        self.state_mut().speed = speed;
        true
    }

    /// Current bus speed
    fn speed(&self) -> VpwSpeed {
        self.state().speed
    }

    /// Adapter can switch to 4x
    fn supports_4x(&self) -> bool {
        self.state().capabilities.contains(DeviceCapabilities::SUPPORTS_4X)
    }

    /// Largest frame the adapter can receive
    fn max_receive_size(&self) -> usize {
        self.state().max_receive_size
    }

    /// Largest block frame used for kernel uploads
    fn max_kernel_send_size(&self) -> usize {
        self.state().max_send_size
    }

    /// Largest block frame used for flash writes
    fn max_flash_write_send_size(&self) -> usize {
        self.state().max_send_size.min(1024 + 12)
    }
}
