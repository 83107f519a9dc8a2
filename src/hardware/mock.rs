//! A simulated PCM on a simulated bus, for exercising [crate::vehicle::Vehicle] without hardware.
//!
//! [MockPcm] answers requests the way a '0411 PCM does. It has a seed/key lock, identity blocks,
//! DPID logging and a flash image, and it runs a kernel once one has been uploaded and executed.
//! [MockDevice] is the adapter: frames it sends are handed to the PCM, and the PCM's replies
//! are what it receives.

use std::collections::{HashMap, VecDeque};

use crc::{CRC_8_SAE_J1850, Crc};

use super::{Device, DeviceCapabilities, DeviceConfig, DeviceState, TimeoutScenario};
use crate::{
    block::{self, BLOCK_HEADER_LENGTH, BLOCK_OVERHEAD, BlockCopyType},
    flash_chip::FlashChip,
    key_algorithm::{GmKeyAlgorithm, KeyAlgorithm},
    message::Message,
    pcm_info::PcmInfo,
    protocol::{DefineBy, create_clear_diagnostic_trouble_codes_ok, kernel_submode},
    vpw::{VpwSpeed, block_id, device_id, mode, priority, submode},
};

/// Name of the mock adapter
pub const DEVICE_TYPE: &str = "Mock";

/// Operating system the mock PCM reports
pub const DEFAULT_OSID: u32 = 12593358;
/// Seed the mock PCM hands out
pub const DEFAULT_SEED: u16 = 0x1234;
/// Intel 28F400B
pub const FLASH_CHIP_ID: u32 = 0x0089_4471;
/// Version the mock kernel reports
pub const KERNEL_VERSION: u32 = 0x0001_0002;

const J1850_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);

/// One slot of a configured DPID
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct DpidSlot {
    define_by: u8,
    /// 1 based byte position in the 6 byte row
    offset: u8,
    size: u8,
    id: u32,
}

/// The PCM end of the conversation
#[derive(Debug, Clone)]
pub struct MockPcm {
    vin: [u8; 17],
    serial: [u8; 12],
    bcc: [u8; 4],
    mec: u8,
    osid: u32,
    calibration_id: u32,
    hardware_id: u32,
    seed: u16,
    key_algorithm: GmKeyAlgorithm,
    unlocked: bool,
    flash: Vec<u8>,
    kernel: Vec<u8>,
    kernel_base: u32,
    kernel_running: bool,
    dpids: HashMap<u8, Vec<DpidSlot>>,
    pids: HashMap<u32, u32>,
    ram: HashMap<u32, u32>,
    streaming: Option<Vec<u8>>,
    recovery_mode: bool,
    refuse_high_speed: bool,
    speed: VpwSpeed,
}

impl Default for MockPcm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPcm {
    /// A locked '0411 PCM at 1x with a generated 512KiB flash image
    pub fn new() -> Self {
        let info = PcmInfo::new(DEFAULT_OSID);
        Self {
            vin: *b"1GCEC14X5RZ123456",
            serial: *b"123423453456",
            bcc: *b"4321",
            mec: 123,
            osid: DEFAULT_OSID,
            calibration_id: 12345,
            hardware_id: 23456,
            seed: DEFAULT_SEED,
            key_algorithm: info.key(),
            unlocked: false,
            flash: default_image(info.image_size as usize),
            kernel: Vec::new(),
            kernel_base: info.kernel_base_address,
            kernel_running: false,
            dpids: HashMap::new(),
            pids: HashMap::new(),
            ram: HashMap::new(),
            streaming: None,
            recovery_mode: false,
            refuse_high_speed: false,
            speed: VpwSpeed::Standard,
        }
    }

    /// Replaces the flash image
    pub fn with_flash(mut self, flash: Vec<u8>) -> Self {
        self.flash = flash;
        self
    }

    /// Sets the value reported for a PID, in DPID rows and single PID reads
    pub fn set_pid(&mut self, pid: u32, value: u32) {
        self.pids.insert(pid, value);
    }

    /// Sets the value reported for a RAM address
    pub fn set_ram(&mut self, address: u32, value: u32) {
        self.ram.insert(address, value);
    }

    /// Makes the PCM answer recovery queries
    pub fn set_recovery_mode(&mut self, recovery_mode: bool) {
        self.recovery_mode = recovery_mode;
    }

    /// Makes the PCM refuse to switch to 4x
    pub fn set_refuse_high_speed(&mut self, refuse: bool) {
        self.refuse_high_speed = refuse;
    }

    /// Locks or unlocks the PCM
    pub fn set_unlocked(&mut self, unlocked: bool) {
        self.unlocked = unlocked;
    }

    /// VIN as currently stored
    pub fn vin(&self) -> String {
        String::from_utf8_lossy(&self.vin).into_owned()
    }

    /// Security access granted
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// An uploaded kernel was executed and has not exited
    pub fn is_kernel_running(&self) -> bool {
        self.kernel_running
    }

    /// Bytes uploaded to RAM, starting at the kernel base address
    pub fn kernel(&self) -> &[u8] {
        &self.kernel
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Bus speed the PCM is listening at
    pub fn speed(&self) -> VpwSpeed {
        self.speed
    }

    /// Handles one frame from the bus and returns the frames sent in reply
    pub fn handle(&mut self, request: &Message) -> Vec<Message> {
        let bytes = request.bytes();
        if bytes.len() < 4 {
            return Vec::new();
        }
        match bytes[3] {
            mode::READ_BLOCK => self.read_block(bytes),
            mode::WRITE_BLOCK => self.write_block(bytes),
            mode::SEED => self.security(bytes),
            mode::SILENCE_BUS => vec![reply(&[mode::SILENCE_BUS + mode::RESPONSE, submode::NULL])],
            mode::HIGH_SPEED_PREPARE => {
                if self.refuse_high_speed {
                    vec![reply(&[mode::NEGATIVE, mode::HIGH_SPEED_PREPARE])]
                } else {
                    vec![reply(&[mode::HIGH_SPEED_PREPARE + mode::RESPONSE])]
                }
            }
            mode::HIGH_SPEED => {
                if !self.refuse_high_speed {
                    self.speed = VpwSpeed::FourX;
                }
                Vec::new()
            }
            mode::CONFIGURE_DYNAMIC_DATA => self.configure_dpid(bytes),
            mode::SEND_DYNAMIC_DATA => self.send_dpids(bytes),
            mode::GET_PID => self.read_pid(bytes),
            mode::GET_RAM => self.read_ram(bytes),
            mode::PCM_UPLOAD_REQUEST => self.upload_request(bytes),
            mode::PCM_UPLOAD => self.upload(bytes),
            mode::READ_MEMORY | mode::READ_MEMORY_32 => self.read_memory(bytes),
            mode::KERNEL => self.kernel_query(bytes),
            mode::EXIT_KERNEL => {
                // The PCM reboots, which also drops the bus back to 1x
                self.kernel_running = false;
                self.streaming = None;
                self.speed = VpwSpeed::Standard;
                Vec::new()
            }
            mode::RECOVERY if self.recovery_mode => {
                vec![reply(&[mode::RECOVERY + mode::RESPONSE, 0x01])]
            }
            mode::CLEAR_DIAGNOSTIC_TROUBLE_CODES => {
                vec![create_clear_diagnostic_trouble_codes_ok()]
            }
            _ => Vec::new(),
        }
    }

    /// Rows sent while a DPID stream is active
    pub fn next_stream_rows(&self) -> Vec<Message> {
        match &self.streaming {
            Some(dpids) => dpids.iter().map(|dpid| self.dpid_row(*dpid)).collect(),
            None => Vec::new(),
        }
    }

    fn read_block(&self, bytes: &[u8]) -> Vec<Message> {
        let Some(&block) = bytes.get(4) else {
            return Vec::new();
        };
        let data = match block {
            block_id::VIN1 => {
                let mut data = vec![0x00];
                data.extend_from_slice(&self.vin[..5]);
                data
            }
            block_id::VIN2 => self.vin[5..11].to_vec(),
            block_id::VIN3 => self.vin[11..].to_vec(),
            block_id::SERIAL1 | block_id::SERIAL2 | block_id::SERIAL3 => {
                let start = (block - block_id::SERIAL1) as usize * 4;
                self.serial[start..start + 4].to_vec()
            }
            block_id::BCC => self.bcc.to_vec(),
            block_id::MEC => vec![self.mec],
            block_id::OPERATING_SYSTEM_ID => self.osid.to_be_bytes().to_vec(),
            block_id::CALIBRATION_ID => self.calibration_id.to_be_bytes().to_vec(),
            block_id::HARDWARE_ID => self.hardware_id.to_be_bytes().to_vec(),
            _ => return vec![reply(&[mode::NEGATIVE, mode::READ_BLOCK, block])],
        };
        let mut body = vec![mode::READ_BLOCK + mode::RESPONSE, block];
        body.extend_from_slice(&data);
        vec![with_frame_crc(reply(&body))]
    }

    fn write_block(&mut self, bytes: &[u8]) -> Vec<Message> {
        let Some(&block) = bytes.get(4) else {
            return Vec::new();
        };
        let refused = reply(&[mode::NEGATIVE, mode::WRITE_BLOCK, block]);
        if !self.unlocked || bytes.len() < 11 {
            return vec![refused];
        }
        let data = &bytes[5..11];
        match block {
            block_id::VIN1 => self.vin[..5].copy_from_slice(&data[1..]),
            block_id::VIN2 => self.vin[5..11].copy_from_slice(data),
            block_id::VIN3 => self.vin[11..].copy_from_slice(data),
            _ => return vec![refused],
        }
        vec![reply(&[mode::WRITE_BLOCK + mode::RESPONSE, block])]
    }

    fn security(&mut self, bytes: &[u8]) -> Vec<Message> {
        match bytes.get(4) {
            Some(&submode::GET_SEED) if self.unlocked => {
                vec![reply(&[mode::SEED + mode::RESPONSE, submode::GET_SEED, 0x37])]
            }
            Some(&submode::GET_SEED) => {
                let [hi, lo] = self.seed.to_be_bytes();
                vec![reply(&[mode::SEED + mode::RESPONSE, submode::GET_SEED, hi, lo])]
            }
            Some(&submode::SEND_KEY) if bytes.len() >= 7 => {
                let key = u16::from_be_bytes([bytes[5], bytes[6]]);
                let code = if key == self.key_algorithm.get_key(self.seed) {
                    self.unlocked = true;
                    0x34
                } else {
                    0x35
                };
                vec![reply(&[mode::SEED + mode::RESPONSE, submode::SEND_KEY, code])]
            }
            _ => Vec::new(),
        }
    }

    fn configure_dpid(&mut self, bytes: &[u8]) -> Vec<Message> {
        if bytes.len() < 9 {
            return Vec::new();
        }
        let dpid = bytes[4];
        let combined = bytes[5];
        let slot = DpidSlot {
            define_by: combined >> 6,
            offset: (combined >> 3) & 0x07,
            size: combined & 0x07,
            id: match combined >> 6 {
                1 => ((bytes[6] as u32) << 8) | bytes[7] as u32,
                2 => ((bytes[6] as u32) << 16) | ((bytes[7] as u32) << 8) | bytes[8] as u32,
                _ => bytes[6] as u32,
            },
        };
        if slot.define_by == DefineBy::Proprietary as u8
            || slot.offset == 0
            || slot.size == 0
            || (slot.offset + slot.size - 1) > 6
        {
            return vec![reply(&[mode::NEGATIVE, mode::CONFIGURE_DYNAMIC_DATA, dpid])];
        }
        let slots = self.dpids.entry(dpid).or_default();
        slots.retain(|s| s.offset != slot.offset);
        slots.push(slot);
        vec![reply(&[mode::CONFIGURE_DYNAMIC_DATA + mode::RESPONSE, dpid])]
    }

    fn send_dpids(&mut self, bytes: &[u8]) -> Vec<Message> {
        let Some(&request_type) = bytes.get(4) else {
            return Vec::new();
        };
        let dpids: Vec<u8> = bytes[5..]
            .iter()
            .copied()
            .filter(|dpid| self.dpids.contains_key(dpid))
            .collect();
        if request_type == submode::NULL || dpids.is_empty() {
            self.streaming = None;
            if request_type == submode::NULL {
                return Vec::new();
            }
            return vec![reply(&[mode::NEGATIVE, mode::SEND_DYNAMIC_DATA, request_type])];
        }
        let rows = dpids.iter().map(|dpid| self.dpid_row(*dpid)).collect();
        self.streaming = (request_type != submode::SINGLE_ROW).then_some(dpids);
        rows
    }

    fn dpid_row(&self, dpid: u8) -> Message {
        let mut payload = [0u8; 6];
        for slot in self.dpids.get(&dpid).into_iter().flatten() {
            let value = match slot.define_by {
                1 => self.pids.get(&slot.id).copied().unwrap_or_default(),
                2 => self.ram.get(&slot.id).copied().unwrap_or_default(),
                _ => 0,
            };
            let size = (slot.size as usize).min(4);
            let start = slot.offset as usize - 1;
            payload[start..start + size].copy_from_slice(&value.to_be_bytes()[4 - size..]);
        }
        let mut body = vec![mode::SEND_DYNAMIC_DATA + mode::RESPONSE, dpid];
        body.extend_from_slice(&payload);
        reply(&body)
    }

    fn read_pid(&self, bytes: &[u8]) -> Vec<Message> {
        if bytes.len() < 6 {
            return Vec::new();
        }
        let pid = ((bytes[4] as u32) << 8) | bytes[5] as u32;
        let Some(value) = self.pids.get(&pid).copied() else {
            return vec![reply(&[mode::NEGATIVE, mode::GET_PID, bytes[4], bytes[5], 0x31])];
        };
        let mut body = vec![mode::GET_PID + mode::RESPONSE, bytes[4], bytes[5]];
        if value > 0xFF {
            body.extend_from_slice(&(value as u16).to_be_bytes());
        } else {
            body.push(value as u8);
        }
        vec![reply(&body)]
    }

    fn read_ram(&self, bytes: &[u8]) -> Vec<Message> {
        if bytes.len() < 7 {
            return Vec::new();
        }
        let address = block_address(&bytes[4..7]);
        match self.ram.get(&address) {
            Some(value) => {
                let mut body = vec![mode::GET_RAM + mode::RESPONSE, bytes[5], bytes[6]];
                body.extend_from_slice(&value.to_le_bytes());
                vec![reply(&body)]
            }
            None => vec![reply(&[
                mode::NEGATIVE,
                mode::GET_RAM,
                bytes[4],
                bytes[5],
                bytes[6],
                0x01,
                0x31,
            ])],
        }
    }

    fn upload_request(&mut self, bytes: &[u8]) -> Vec<Message> {
        if !self.unlocked {
            return vec![reply(&[mode::NEGATIVE, mode::PCM_UPLOAD_REQUEST])];
        }
        if bytes.len() >= 10 {
            self.kernel_base = block_address(&bytes[7..10]);
        }
        self.kernel.clear();
        vec![reply(&[mode::PCM_UPLOAD_REQUEST + mode::RESPONSE, submode::NULL])]
    }

    fn upload(&mut self, bytes: &[u8]) -> Vec<Message> {
        let length = block::payload_length(bytes);
        if bytes.len() < BLOCK_OVERHEAD || bytes.len() < length + BLOCK_OVERHEAD {
            return vec![block_refusal()];
        }
        let sum = u16::from_be_bytes([bytes[length + BLOCK_HEADER_LENGTH], bytes[length + 11]]);
        if sum != block::legacy_block_checksum(bytes) {
            log::debug!("Mock PCM: bad block checksum {sum:04X}");
            return vec![block_refusal()];
        }
        let copy_type = bytes[4];
        let address = block_address(&bytes[7..10]);
        let data = &bytes[BLOCK_HEADER_LENGTH..BLOCK_HEADER_LENGTH + length];

        if self.kernel_running {
            // A running kernel writes blocks to flash
            let start = address as usize;
            let Some(target) = self.flash.get_mut(start..start + length) else {
                return vec![reply(&[mode::NEGATIVE, mode::PCM_UPLOAD])];
            };
            if copy_type != BlockCopyType::TestWrite as u8 {
                target.copy_from_slice(data);
            }
            return vec![reply(&[mode::PCM_UPLOAD + mode::RESPONSE, 0x00, 0x73])];
        }

        if !self.unlocked {
            return vec![block_refusal()];
        }
        let Some(offset) = address.checked_sub(self.kernel_base) else {
            return vec![block_refusal()];
        };
        let offset = offset as usize;
        if self.kernel.len() < offset + length {
            self.kernel.resize(offset + length, 0);
        }
        self.kernel[offset..offset + length].copy_from_slice(data);
        if copy_type == BlockCopyType::Execute as u8 {
            log::debug!("Mock PCM: executing {} byte kernel", self.kernel.len());
            self.kernel_running = true;
        }
        vec![Message::new(vec![
            priority::BLOCK,
            device_id::TOOL,
            device_id::PCM,
            mode::PCM_UPLOAD + mode::RESPONSE,
        ])]
    }

    fn read_memory(&self, bytes: &[u8]) -> Vec<Message> {
        let refused = reply(&[mode::NEGATIVE, mode::READ_MEMORY]);
        let address_len = if bytes[3] == mode::READ_MEMORY_32 { 4 } else { 3 };
        if !self.kernel_running || bytes.len() < 7 + address_len {
            return vec![refused];
        }
        let length = ((bytes[5] as usize) << 8) | bytes[6] as usize;
        let address = block_address(&bytes[7..7 + address_len]);
        let start = address as usize;
        let Some(data) = self.flash.get(start..start + length) else {
            return vec![refused];
        };

        let mut frame = vec![
            priority::BLOCK,
            device_id::TOOL,
            device_id::PCM,
            mode::PCM_UPLOAD,
            0x01,
            (length >> 8) as u8,
            length as u8,
            (address >> 16) as u8,
            (address >> 8) as u8,
            address as u8,
        ];
        match data.first() {
            // A run of one value is sent compressed
            Some(first) if data.iter().all(|b| b == first) => {
                frame[4] = 0x02;
                frame.push(*first);
            }
            _ => {
                frame.extend_from_slice(data);
                let sum = block::kernel_read_checksum(&frame);
                frame.extend_from_slice(&sum.to_be_bytes());
            }
        }
        vec![reply(&[mode::READ_MEMORY + mode::RESPONSE]), Message::new(frame)]
    }

    fn kernel_query(&mut self, bytes: &[u8]) -> Vec<Message> {
        let Some(&sub) = bytes.get(4) else {
            return Vec::new();
        };
        let refused = reply(&[mode::NEGATIVE, mode::KERNEL, sub]);
        if !self.kernel_running {
            return vec![refused];
        }
        let mut body = vec![mode::KERNEL + mode::RESPONSE, sub];
        match sub {
            kernel_submode::VERSION => body.extend_from_slice(&KERNEL_VERSION.to_be_bytes()),
            kernel_submode::FLASH_CHIP_ID => body.extend_from_slice(&FLASH_CHIP_ID.to_be_bytes()),
            kernel_submode::OPERATING_SYSTEM_ID => body.extend_from_slice(&self.osid.to_be_bytes()),
            kernel_submode::CRC if bytes.len() >= 11 => {
                let size = block_address(&bytes[5..8]) as usize;
                let start = block_address(&bytes[8..11]) as usize;
                let Some(data) = self.flash.get(start..start + size) else {
                    return vec![refused];
                };
                body.extend_from_slice(&bytes[5..11]);
                body.extend_from_slice(&block::crc32(data).to_be_bytes());
            }
            kernel_submode::ERASE_BLOCK if bytes.len() >= 8 => {
                let address = block_address(&bytes[5..8]);
                let range = FlashChip::new(FLASH_CHIP_ID)
                    .ok()
                    .and_then(|chip| chip.range_containing(address).copied())
                    .filter(|range| range.address == address);
                match range {
                    Some(range) => {
                        let start = range.address as usize;
                        let end = (start + range.size as usize).min(self.flash.len());
                        if let Some(region) = self.flash.get_mut(start..end) {
                            region.fill(0xFF);
                        }
                        body.push(0x00);
                    }
                    // Flash status register, with the erase error bit set
                    None => body.push(0x20),
                }
            }
            _ => return vec![refused],
        }
        vec![reply(&body)]
    }
}

/// `[6C F0 10 body..]`
fn reply(body: &[u8]) -> Message {
    let mut bytes = vec![priority::PHYSICAL0, device_id::TOOL, device_id::PCM];
    bytes.extend_from_slice(body);
    Message::new(bytes)
}

fn block_refusal() -> Message {
    Message::new(vec![
        priority::BLOCK,
        device_id::TOOL,
        device_id::PCM,
        mode::NEGATIVE,
        mode::PCM_UPLOAD,
    ])
}

/// Appends the J1850 frame CRC, which some adapters pass through
fn with_frame_crc(message: Message) -> Message {
    let mut bytes = message.bytes().to_vec();
    bytes.push(J1850_CRC.checksum(message.bytes()));
    Message::new(bytes)
}

fn block_address(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

/// A flash image with varied code in the lower half and erased flash above it
pub fn default_image(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| {
            if i < size / 2 {
                (i as u8).wrapping_mul(7) ^ (i >> 8) as u8
            } else {
                0xFF
            }
        })
        .collect()
}

/// An adapter wired straight to a [MockPcm]
#[derive(Debug, Clone)]
pub struct MockDevice {
    pcm: MockPcm,
    pending: VecDeque<Message>,
    chatter: VecDeque<Message>,
    sent: Vec<Message>,
    initialized: bool,
    state: DeviceState,
}

impl MockDevice {
    /// Creates an adapter connected to `pcm`
    pub fn new(pcm: MockPcm, config: DeviceConfig) -> Self {
        let mut state = DeviceState::new(config);
        state.max_send_size = 4096 + 12;
        state.max_receive_size = 4096 + 12;
        state.capabilities = DeviceCapabilities::SUPPORTS_4X
            | DeviceCapabilities::SINGLE_DPID_LOGGING
            | DeviceCapabilities::STREAM_LOGGING;
        Self {
            pcm,
            pending: VecDeque::new(),
            chatter: VecDeque::new(),
            sent: Vec::new(),
            initialized: false,
            state,
        }
    }

    /// The simulated PCM
    pub fn pcm(&self) -> &MockPcm {
        &self.pcm
    }

    /// The simulated PCM
    pub fn pcm_mut(&mut self) -> &mut MockPcm {
        &mut self.pcm
    }

    /// Every frame sent so far, oldest first
    pub fn sent(&self) -> &[Message] {
        &self.sent
    }

    /// Queues a frame from another module. It arrives just before the reply to the next
    /// frame sent
    pub fn inject(&mut self, message: Message) {
        self.chatter.push_back(message);
    }
}

impl Device for MockDevice {
    fn initialize(&mut self) -> bool {
        log::info!("Initializing {DEVICE_TYPE} device");
        self.pending.clear();
        self.initialized = true;
        true
    }

    fn send_message(&mut self, message: &Message) -> bool {
        if !self.initialized {
            log::error!("{DEVICE_TYPE} device is not initialized");
            return false;
        }
        log::debug!("TX: {message}");
        if message.len() > self.state.max_send_size {
            return false;
        }
        self.sent.push(message.clone());
        self.pending.extend(self.chatter.drain(..));
        if self.state.speed != self.pcm.speed() {
            log::debug!("Bus speed mismatch, the PCM did not hear that");
            return true;
        }
        let replies = self.pcm.handle(message);
        self.pending.extend(replies);
        true
    }

    fn receive(&mut self) {
        if self.pending.is_empty() && self.state.speed == self.pcm.speed() {
            self.pending.extend(self.pcm.next_stream_rows());
        }
        while let Some(message) = self.pending.pop_front() {
            self.state.enqueue(message);
        }
    }

    fn clear_message_buffer(&mut self) {
        self.pending.clear();
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario {
        std::mem::replace(&mut self.state.scenario, scenario)
    }

    fn set_vpw_speed_internal(&mut self, speed: VpwSpeed) -> bool {
        log::debug!("{DEVICE_TYPE} setting VPW {speed}");
        true
    }

    fn read_voltage(&mut self) -> Option<f32> {
        Some(12.6)
    }

    fn state(&self) -> &DeviceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }
}
