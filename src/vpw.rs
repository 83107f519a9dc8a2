//! Fixed J1850 VPW header vocabularies.
//!
//! These are plain constants rather than enums because header fields are composed
//! arithmetically, for example `mode::SEED + mode::RESPONSE` is the mode byte of the reply
//! to a seed request.

use strum_macros::{Display, EnumIter, EnumString};

/// Device IDs found in the destination and source header bytes
pub mod device_id {
    /// Powertrain control module
    pub const PCM: u8 = 0x10;
    /// The diagnostic tool (this crate)
    pub const TOOL: u8 = 0xF0;
    /// Broadcast to every module on the bus
    pub const BROADCAST: u8 = 0xFE;
}

/// Priority / header type byte combinations
pub mod priority {
    /// Functional addressing, low priority
    pub const FUNCTIONAL0_LOW: u8 = 0x48;
    /// Functional addressing
    pub const FUNCTIONAL0: u8 = 0x68;
    /// Block transfer
    pub const BLOCK: u8 = 0x6D;
    /// Functional addressing, alternate
    pub const FUNCTIONAL2: u8 = 0x6A;
    /// Physical addressing
    pub const PHYSICAL0: u8 = 0x6C;
    /// Physical addressing, high priority
    pub const PHYSICAL0_HIGH: u8 = 0x8C;
}

/// Service mode bytes
pub mod mode {
    /// Added to a mode by the PCM when it replies
    pub const RESPONSE: u8 = 0x40;
    /// Rejection of a request
    pub const REJECTED: u8 = 0x75;
    /// Negative response marker, followed by the mode that failed
    pub const NEGATIVE: u8 = 0x7F;
    /// Clear diagnostic trouble codes
    pub const CLEAR_DIAGNOSTIC_TROUBLE_CODES: u8 = 0x04;
    /// Clear diagnostic information
    pub const CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
    /// Leave the kernel and reboot the PCM
    pub const EXIT_KERNEL: u8 = 0x20;
    /// Read a PID
    pub const GET_PID: u8 = 0x22;
    /// Read RAM
    pub const GET_RAM: u8 = 0x23;
    /// Security seed/key
    pub const SEED: u8 = 0x27;
    /// Disable normal message transmission
    pub const SILENCE_BUS: u8 = 0x28;
    /// Request dynamic data (DPIDs)
    pub const SEND_DYNAMIC_DATA: u8 = 0x2A;
    /// Define a dynamic PID
    pub const CONFIGURE_DYNAMIC_DATA: u8 = 0x2C;
    /// Request to upload data to the PCM
    pub const PCM_UPLOAD_REQUEST: u8 = 0x34;
    /// Read memory by address
    pub const READ_MEMORY: u8 = 0x35;
    /// Block transfer to the PCM
    pub const PCM_UPLOAD: u8 = 0x36;
    /// Read memory with a 32 bit address
    pub const READ_MEMORY_32: u8 = 0x37;
    /// Write a data block (VIN etc.)
    pub const WRITE_BLOCK: u8 = 0x3B;
    /// Read a data block (VIN, OSID etc.)
    pub const READ_BLOCK: u8 = 0x3C;
    /// Kernel specific queries
    pub const KERNEL: u8 = 0x3D;
    /// Tester present
    pub const TEST_DEVICE_PRESENT: u8 = 0x3F;
    /// Recovery mode query
    pub const RECOVERY: u8 = 0x62;
    /// Prepare for high speed (4x)
    pub const HIGH_SPEED_PREPARE: u8 = 0xA0;
    /// Switch to high speed (4x)
    pub const HIGH_SPEED: u8 = 0xA1;
}

/// Sub mode bytes
pub mod submode {
    /// No sub mode
    pub const NULL: u8 = 0x00;
    /// Request a seed
    pub const GET_SEED: u8 = 0x01;
    /// Send the key
    pub const SEND_KEY: u8 = 0x02;
    /// Single row of DPID data
    pub const SINGLE_ROW: u8 = 0x01;
    /// Stream DPID data, slow
    pub const STREAM1: u8 = 0x14;
    /// Stream DPID data, fast
    pub const STREAM2: u8 = 0x24;
}

/// Block IDs for mode 0x3C reads and mode 0x3B writes
pub mod block_id {
    /// 5 bytes of VIN
    pub const VIN1: u8 = 0x01;
    /// 6 bytes of VIN
    pub const VIN2: u8 = 0x02;
    /// 6 bytes of VIN
    pub const VIN3: u8 = 0x03;
    /// Hardware ID
    pub const HARDWARE_ID: u8 = 0x04;
    /// 4 bytes of serial number
    pub const SERIAL1: u8 = 0x05;
    /// 4 bytes of serial number
    pub const SERIAL2: u8 = 0x06;
    /// 4 bytes of serial number
    pub const SERIAL3: u8 = 0x07;
    /// Calibration ID
    pub const CALIBRATION_ID: u8 = 0x08;
    /// Operating system ID
    pub const OPERATING_SYSTEM_ID: u8 = 0x0A;
    /// Engine calibration ID
    pub const ENGINE_CAL_ID: u8 = 0x0B;
    /// Engine diagnostic calibration ID
    pub const ENGINE_DIAG_CAL_ID: u8 = 0x0C;
    /// Transmission calibration ID
    pub const TRANS_CAL_ID: u8 = 0x0D;
    /// Transmission diagnostic calibration ID
    pub const TRANS_DIAG_ID: u8 = 0x0E;
    /// Fuel calibration ID
    pub const FUEL_CAL_ID: u8 = 0x0F;
    /// System calibration ID
    pub const SYSTEM_CAL_ID: u8 = 0x10;
    /// Speedometer calibration ID
    pub const SPEED_CAL_ID: u8 = 0x11;
    /// Broadcast code
    pub const BCC: u8 = 0x14;
    /// Oil life remaining percent
    pub const OIL_LIFE_PERC: u8 = 0x6D;
    /// Manufacturers enable counter
    pub const MEC: u8 = 0xA0;
}

/// Bus speed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Default)]
pub enum VpwSpeed {
    /// 10.4 kbps
    #[default]
    Standard,
    /// 41.6 kbps
    FourX,
}

impl VpwSpeed {
    /// Bus bit rate in bits per second
    pub fn baud_rate(&self) -> u32 {
        match self {
            VpwSpeed::Standard => 10_400,
            VpwSpeed::FourX => 41_600,
        }
    }
}

/// Describes the class of module a device ID belongs to
pub fn device_category(id: u8) -> &'static str {
    match id {
        0x00..=0x0F => "powertrain controller",
        0x10..=0x17 => "engine controller",
        0x18..=0x1F => "transmission controller",
        0x20..=0x27 => "chassis controller",
        0x28..=0x2F => "brake controller",
        0x30..=0x37 => "steering controller",
        0x38..=0x3F => "suspension controller",
        0x40..=0x47 => "body controller",
        0x48..=0x5F => "restraint controller",
        0x60..=0x6F => "driver information display",
        0x70..=0x7F => "lighting controller",
        0x80..=0x8F => "entertainment system",
        0x90..=0x97 => "personal communications",
        0x98..=0x9F => "climate control (HVAC)",
        0xA0..=0xBF => "convenience (door/seats/window/etc)",
        0xC0..=0xC7 => "security module",
        0xC8..=0xCB => "EV energy transfer system",
        0xF0..=0xFD => "off board tool",
        0xFE => "broadcast message",
        _ => "unknown",
    }
}

/// Category of the module a message is addressed to
pub fn receiver_category(bytes: &[u8]) -> &'static str {
    if bytes.len() < 3 {
        return "invalid message";
    }
    device_category(bytes[1])
}

/// Category of the module that sent a message
pub fn sender_category(bytes: &[u8]) -> &'static str {
    if bytes.len() < 3 {
        return "invalid message";
    }
    device_category(bytes[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(device_category(device_id::PCM), "engine controller");
        assert_eq!(device_category(device_id::TOOL), "off board tool");
        assert_eq!(device_category(device_id::BROADCAST), "broadcast message");
        assert_eq!(device_category(0xE0), "unknown");
        assert_eq!(sender_category(&[0x6C, 0xF0, 0x10, 0x7C]), "engine controller");
        assert_eq!(receiver_category(&[0x6C]), "invalid message");
    }

    #[test]
    fn response_mode_is_compositional() {
        assert_eq!(mode::SEED + mode::RESPONSE, 0x67);
        assert_eq!(VpwSpeed::FourX.baud_rate(), 41_600);
    }
}
