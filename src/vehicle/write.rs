use strum_macros::{Display, EnumIter, EnumString};

use super::{Query, Vehicle};
use crate::{
    VpwError, VpwResult,
    block::{BLOCK_OVERHEAD, BlockCopyType, create_block_message, crc32},
    flash_chip::{BlockType, FlashChip, MemoryRange},
    hardware::{Device, TimeoutScenario},
    message::Message,
    pcm_info::PcmInfo,
    protocol::*,
    response::{Response, ResponseStatus},
    vpw::VpwSpeed,
};

/// Compare/erase/write cycles before a flash write is given up
const MAX_WRITE_ATTEMPTS: usize = 5;

/// How much of the flash a write touches
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteType {
    /// Compare every range against the image, write nothing
    Compare,
    /// Send the calibration without erasing or writing it, to test the connection
    TestWrite,
    /// Calibration only
    Calibration,
    /// Parameter blocks only
    Parameters,
    /// Operating system and calibration
    OsAndCalibration,
    /// Everything except the parameter blocks, which hold pairing data for other modules
    Full,
}

impl WriteType {
    /// True if ranges of `block_type` are compared and written
    pub fn includes(&self, block_type: BlockType) -> bool {
        match self {
            WriteType::Compare => true,
            WriteType::TestWrite | WriteType::Calibration => block_type == BlockType::Calibration,
            WriteType::Parameters => block_type == BlockType::Parameter,
            WriteType::OsAndCalibration => {
                matches!(block_type, BlockType::Calibration | BlockType::OperatingSystem)
            }
            WriteType::Full => block_type != BlockType::Parameter,
        }
    }
}

impl<D: Device> Vehicle<D> {
    /// Writes `image` to flash through `kernel`. The PCM must already be unlocked.
    ///
    /// Only the ranges selected by `write_type` whose CRC differs from the image are erased
    /// and rewritten. The kernel is exited after a successful write. After a failure it is
    /// left running so the write can be retried without uploading it again
    pub fn write_contents(
        &mut self,
        info: &PcmInfo,
        kernel: &[u8],
        image: &[u8],
        write_type: WriteType,
    ) -> VpwResult<Response<bool>> {
        if image.len() != info.image_size as usize {
            return Err(VpwError::ParameterInvalid(format!(
                "Image is {} bytes, this PCM holds {}",
                image.len(),
                info.image_size
            )));
        }

        self.device.clear_message_queue();
        self.force_send_tool_present_notification();
        if !self.set_vpw_4x(VpwSpeed::FourX) {
            log::error!("Stopping here because we were unable to switch to 4x");
            return Ok(Response::create(ResponseStatus::Error, false));
        }

        let executed = self.pcm_execute(info, kernel);
        if !executed.is_success() {
            log::error!("Failed to upload kernel to PCM");
            return Ok(executed);
        }

        let response = self.write_with_kernel(image, write_type);
        if response.is_success() {
            self.cleanup();
        }
        Ok(response)
    }

    fn write_with_kernel(&mut self, image: &[u8], write_type: WriteType) -> Response<bool> {
        self.send_tool_present_notification();
        let chip_id = self.query_flash_chip_id();
        if !chip_id.is_success() {
            return Response::create(chip_id.status(), false);
        }
        let chip = match FlashChip::new(chip_id.into_value()) {
            Ok(chip) => chip,
            Err(e) => {
                log::error!("{e}");
                return Response::create(ResponseStatus::Error, false);
            }
        };
        log::info!("Flash chip: {chip}");
        let mut ranges = chip.memory_ranges;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let compared = self.compare_ranges(&mut ranges, image, write_type);
            if !compared.is_success() {
                return compared;
            }
            let all_match = *compared.value();
            match write_type {
                WriteType::Compare => {
                    if !all_match {
                        log::info!(
                            "Mismatched parameter blocks are expected, \
                             they change as the PCM is used"
                        );
                    }
                    return compared;
                }
                WriteType::TestWrite if attempt > 1 => {
                    log::info!("Test write complete");
                    return Response::create(ResponseStatus::Success, true);
                }
                WriteType::TestWrite => log::info!("Beginning test write"),
                _ if all_match => {
                    log::info!("All ranges are identical");
                    return compared;
                }
                _ => {}
            }

            for range in ranges.iter().filter(|r| write_type.includes(r.block_type)) {
                if range.actual_crc == range.desired_crc && write_type != WriteType::TestWrite {
                    continue;
                }
                if self.is_cancelled() {
                    log::error!(
                        "Write cancelled, this PCM is probably not usable in its current state"
                    );
                    return Response::create(ResponseStatus::Error, false);
                }
                log::info!(
                    "Processing range {:06X}-{:06X}",
                    range.address,
                    range.address + range.size - 1
                );
                let copy_type = if write_type == WriteType::TestWrite {
                    BlockCopyType::TestWrite
                } else {
                    let erased = self.erase_flash_block(range.address);
                    if !erased.is_success() {
                        return erased;
                    }
                    BlockCopyType::Copy
                };
                let written = self.write_block_chunks(image, range, copy_type);
                if !written.is_success() {
                    log::warn!(
                        "Range {:06X} was not written cleanly: {}",
                        range.address,
                        written.status()
                    );
                }
            }
        }

        log::error!("THE CHANGES WERE NOT WRITTEN SUCCESSFULLY");
        if write_type == WriteType::Calibration {
            log::warn!("Erasing calibration to force recovery mode");
            let calibration: Vec<u32> = ranges
                .iter()
                .filter(|r| r.block_type == BlockType::Calibration)
                .map(|r| r.address)
                .collect();
            for address in calibration {
                self.erase_flash_block(address);
            }
        }
        Response::create(ResponseStatus::Error, false)
    }

    /// Fills in both CRCs of every range `write_type` includes. The value is true if they
    /// all match
    pub fn compare_ranges(
        &mut self,
        ranges: &mut [MemoryRange],
        image: &[u8],
        write_type: WriteType,
    ) -> Response<bool> {
        for range in ranges.iter_mut() {
            let start = range.address as usize;
            let end = start + range.size as usize;
            let Some(data) = image.get(start..end) else {
                log::error!("Range {start:06X}-{end:06X} is outside the image");
                return Response::create(ResponseStatus::Error, false);
            };
            range.desired_crc = crc32(data);
        }

        // The kernel answers with the CRC of the last range it was asked about, so reset it
        self.send_tool_present_notification();
        Query::new(|| create_crc_query(0, 0), |m: &Message| parse_crc(m, 0, 0)).execute(self);

        self.set_device_timeout(TimeoutScenario::ReadCrc);
        let mut all_match = true;
        for range in ranges.iter_mut() {
            if !write_type.includes(range.block_type) {
                log::debug!("{:06X} {:?} not needed", range.address, range.block_type);
                continue;
            }
            self.send_tool_present_notification();
            let (address, size) = (range.address, range.size);
            let crc = Query::new(
                || create_crc_query(address, size),
                |m: &Message| parse_crc(m, address, size),
            )
            .execute(self);
            if !crc.is_success() {
                log::error!("Unable to get CRC for memory range {address:06X}/{size:06X}");
                return Response::create(crc.status(), false);
            }
            range.actual_crc = crc.into_value();
            let same = range.actual_crc == range.desired_crc;
            log::info!(
                "{:06X}-{:06X} file {:08X} PCM {:08X} {} {:?}",
                address,
                address + size - 1,
                range.desired_crc,
                range.actual_crc,
                if same { "Same" } else { "Different" },
                range.block_type
            );
            all_match &= same;
        }
        Response::create(ResponseStatus::Success, all_match)
    }

    /// Erases the flash block starting at `address`. A non zero flash status is an error
    pub fn erase_flash_block(&mut self, address: u32) -> Response<bool> {
        log::info!("Erasing {address:06X}");
        self.set_device_timeout(TimeoutScenario::EraseMemoryBlock);
        let response = Query::new(
            || create_flash_erase_block_request(address),
            parse_flash_erase_block,
        )
        .execute(self);
        match response.status() {
            ResponseStatus::Success if *response.value() == 0 => {
                Response::create(ResponseStatus::Success, true)
            }
            ResponseStatus::Success => {
                log::error!("Unable to erase flash memory, code {:02X}", response.value());
                Response::create(ResponseStatus::Error, false)
            }
            status => {
                log::error!("Unable to erase flash memory: {status}");
                Response::create(status, false)
            }
        }
    }

    /// Writes `range` of `image` to flash in blocks, checking the reply to each
    pub fn write_block_chunks(
        &mut self,
        image: &[u8],
        range: &MemoryRange,
        copy_type: BlockCopyType,
    ) -> Response<bool> {
        self.set_device_timeout(TimeoutScenario::WriteMemoryBlock);
        let chunk_size = self.device.max_flash_write_send_size().saturating_sub(BLOCK_OVERHEAD);
        if chunk_size == 0 {
            return Response::create(ResponseStatus::Error, false);
        }
        let size = range.size as usize;
        for index in (0..size).step_by(chunk_size) {
            if self.is_cancelled() {
                return Response::create(ResponseStatus::Error, false);
            }
            let address = range.address as usize + index;
            let length = chunk_size.min(size - index);
            log::debug!(
                "Sending payload with offset {index:04X}, start address {address:06X}, \
                 length {length:04X}"
            );
            let message = create_block_message(image, address, length, address as u32, copy_type);
            let response = self.write_payload(&message, parse_chunk_write_response);
            if !response.is_success() {
                return response;
            }
        }
        Response::create(ResponseStatus::Success, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        DeviceConfig,
        mock::{DEFAULT_OSID, MockDevice, MockPcm, default_image},
    };

    const KERNEL: [u8; 4] = [0x4E, 0x71, 0x4E, 0x75];

    fn vehicle() -> Vehicle<MockDevice> {
        let mut pcm = MockPcm::new();
        pcm.set_unlocked(true);
        let mut v = Vehicle::new(MockDevice::new(pcm, DeviceConfig::default()));
        assert!(v.initialize());
        v
    }

    #[test]
    fn block_selection() {
        assert!(WriteType::Compare.includes(BlockType::Boot));
        assert!(!WriteType::Calibration.includes(BlockType::OperatingSystem));
        assert!(WriteType::Full.includes(BlockType::OperatingSystem));
        assert!(!WriteType::Full.includes(BlockType::Parameter));
        assert!(WriteType::Parameters.includes(BlockType::Parameter));
    }

    #[test]
    fn compare_identical_image() {
        let mut v = vehicle();
        let info = PcmInfo::new(DEFAULT_OSID);
        let image = default_image(info.image_size as usize);
        let response = v.write_contents(&info, &KERNEL, &image, WriteType::Compare).unwrap();
        assert_eq!(response, Response::create(ResponseStatus::Success, true));
        assert!(!v.device().pcm().is_kernel_running());
    }

    #[test]
    fn writes_changed_calibration() {
        let mut v = vehicle();
        let info = PcmInfo::new(DEFAULT_OSID);
        let mut image = default_image(info.image_size as usize);
        image[0x9000..0x9010].fill(0xA5);
        // Changes outside the calibration are not written
        image[0x30000] ^= 0xFF;

        let response = v.write_contents(&info, &KERNEL, &image, WriteType::Calibration).unwrap();
        assert!(response.is_success());
        let flash = v.device().pcm().flash();
        assert_eq!(&flash[0x8000..0x20000], &image[0x8000..0x20000]);
        assert_ne!(flash[0x30000], image[0x30000]);
    }

    #[test]
    fn erase_rejects_unaligned_address() {
        let mut v = vehicle();
        let info = PcmInfo::new(DEFAULT_OSID);
        assert!(v.pcm_execute(&info, &KERNEL).is_success());
        assert!(v.erase_flash_block(0x8000).is_success());
        assert_eq!(v.erase_flash_block(0x8001).status(), ResponseStatus::Error);
    }

    #[test]
    fn wrong_image_size() {
        let mut v = vehicle();
        let info = PcmInfo::new(DEFAULT_OSID);
        assert!(v.write_contents(&info, &KERNEL, &[0; 16], WriteType::Full).is_err());
        assert!(v.device().sent().is_empty());
    }
}
