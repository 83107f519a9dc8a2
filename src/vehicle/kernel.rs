use std::{thread, time::Duration};

use super::{MAX_RECEIVE_ATTEMPTS, MAX_SEND_ATTEMPTS, Query, Vehicle};
use crate::{
    block::{BLOCK_OVERHEAD, BlockCopyType, create_block_message},
    hardware::{Device, TimeoutScenario},
    message::Message,
    pcm_info::{HardwareType, P01_P59_KERNEL_LIMIT, PcmInfo},
    protocol::*,
    response::{Response, ResponseStatus},
    vpw::VpwSpeed,
};

/// PCMs reject upload requests for more than this, though they accept larger kernels
const MAX_CLAIMED_KERNEL_SIZE: usize = 4096;
/// Gives a running kernel time to get back to its receive loop
const KERNEL_SETTLE: Duration = Duration::from_millis(50);
/// Gap between repeated clear code requests
const CLEAR_CODES_DELAY: Duration = Duration::from_millis(250);

impl<D: Device> Vehicle<D> {
    /// Uploads `payload` to the kernel base address of `info` and runs it.
    ///
    /// The payload is sent highest block first. The block at offset 0 goes last and tells
    /// the PCM to execute
    pub fn pcm_execute(&mut self, info: &PcmInfo, payload: &[u8]) -> Response<bool> {
        if payload.is_empty() {
            log::error!("Kernel image is empty");
            return Response::create(ResponseStatus::Error, false);
        }
        let claimed_size = payload.len().min(MAX_CLAIMED_KERNEL_SIZE);

        // The PCM only checks the claimed size
        if matches!(info.hardware_type, HardwareType::P01 | HardwareType::P59)
            && info.kernel_base_address as usize + payload.len() > P01_P59_KERNEL_LIMIT as usize
        {
            log::error!("Base address and size would exceed usable RAM");
            return Response::create(ResponseStatus::Error, false);
        }

        log::debug!(
            "Sending upload request for kernel size {}, load address {:06X}",
            payload.len(),
            info.kernel_base_address
        );
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        let permission = Query::new(
            || create_upload_request(info, claimed_size),
            parse_upload_permission,
        )
        .execute(self);
        if !(permission.is_success() && *permission.value()) {
            log::error!("Permission to upload kernel was denied: {}", permission.status());
            return Response::create(permission.status(), false);
        }

        self.set_device_timeout(TimeoutScenario::SendKernel);
        let chunk_size = self.device.max_kernel_send_size().saturating_sub(BLOCK_OVERHEAD);
        if chunk_size == 0 {
            return Response::create(ResponseStatus::Error, false);
        }
        let chunk_count = payload.len() / chunk_size;
        let remainder = payload.len() % chunk_size;

        if remainder > 0 {
            let offset = chunk_count * chunk_size;
            let copy_type = if offset == 0 {
                BlockCopyType::Execute
            } else {
                BlockCopyType::Copy
            };
            log::debug!("Sending end block with offset {offset:X}, length {remainder:X}");
            let message = create_block_message(
                payload,
                offset,
                remainder,
                info.kernel_base_address + offset as u32,
                copy_type,
            );
            let response = self.write_payload(&message, parse_upload_response);
            if !response.is_success() {
                log::error!("Could not upload kernel to PCM, remainder payload not accepted");
                return response;
            }
        }

        for chunk in (0..chunk_count).rev() {
            if self.is_cancelled() {
                return Response::create(ResponseStatus::Error, false);
            }
            let offset = chunk * chunk_size;
            log::info!(
                "Kernel upload {}% complete",
                (payload.len() - offset - chunk_size) * 100 / payload.len()
            );
            let copy_type = if offset == 0 {
                BlockCopyType::Execute
            } else {
                BlockCopyType::Copy
            };
            let message = create_block_message(
                payload,
                offset,
                chunk_size,
                info.kernel_base_address + offset as u32,
                copy_type,
            );
            let response = self.write_payload(&message, parse_upload_response);
            if !response.is_success() {
                log::error!(
                    "Could not upload kernel to PCM, block at offset {offset:X} not accepted"
                );
                return response;
            }
        }

        log::info!("Kernel upload 100% complete");
        Response::create(ResponseStatus::Success, true)
    }

    /// Sends one block, retrying until `filter` accepts a reply
    pub(crate) fn write_payload(
        &mut self,
        message: &Message,
        filter: impl Fn(&Message) -> Response<bool>,
    ) -> Response<bool> {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            self.send_tool_present_notification();
            if self.is_cancelled() {
                return Response::create(ResponseStatus::Error, false);
            }
            thread::sleep(KERNEL_SETTLE);
            if !self.send(message) {
                continue;
            }
            let response = self.wait_for_success(&filter, MAX_RECEIVE_ATTEMPTS);
            if response.is_success() && *response.value() {
                return response;
            }
            log::debug!("Block not accepted ({}), attempt {attempt}", response.status());
        }
        log::error!("Giving up on block write");
        Response::create(ResponseStatus::Error, false)
    }

    /// Version of the running kernel. [ResponseStatus::Refused] means no kernel is running
    pub fn get_kernel_version(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        let query = Query::new(create_kernel_version_query, parse_kernel_version);
        let mut last = Response::failed(ResponseStatus::Timeout);
        for _ in 0..5 {
            last = query.execute(self);
            match last.status() {
                ResponseStatus::Success if *last.value() != 0 => return last,
                ResponseStatus::Refused => return last,
                _ => {}
            }
        }
        last
    }

    /// Operating system ID, as read by the kernel from flash
    pub fn query_os_id_from_kernel(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(
            create_operating_system_id_kernel_request,
            parse_operating_system_id_kernel_response,
        )
        .execute(self)
    }

    /// ID of the flash chip. An ID of 0 is treated as no answer
    pub fn query_flash_chip_id(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        let query = Query::new(create_flash_memory_type_query, parse_flash_memory_type);
        for _ in 0..3 {
            let response = query.execute(self);
            if response.is_success() && *response.value() != 0 {
                log::info!("Flash chip ID {:08X}", response.value());
                return response;
            }
        }
        log::error!("Unable to determine which flash chip is in this PCM");
        Response::failed(ResponseStatus::Error)
    }

    /// Exits the kernel at 4x, then at 1x. The bus is left at 1x
    pub fn exit_kernel(&mut self) {
        let exit = create_exit_kernel();
        self.device.clear_message_queue();
        if self.device.supports_4x() {
            self.device.set_vpw_speed(VpwSpeed::FourX);
            self.send(&exit);
            self.device.set_vpw_speed(VpwSpeed::Standard);
        }
        self.send(&exit);
    }

    /// Asks the operating system and other modules to clear trouble codes. Replies are not
    /// checked, so each request is sent twice
    pub fn clear_trouble_codes(&mut self) {
        log::info!("Clearing trouble codes");
        self.device.clear_message_queue();
        self.set_device_timeout(TimeoutScenario::Minimum);
        for request in [
            create_clear_diagnostic_trouble_codes_request(),
            create_clear_diagnostic_information_request(),
        ] {
            for _ in 0..2 {
                thread::sleep(CLEAR_CODES_DELAY);
                self.send(&request);
            }
        }
    }

    /// Halts the kernel and clears trouble codes
    pub fn cleanup(&mut self) {
        log::debug!("Halting the kernel");
        self.exit_kernel();
        self.clear_trouble_codes();
    }

    /// True if the PCM answers from its boot block recovery loop
    pub fn is_in_recovery_mode(&mut self) -> bool {
        self.device.clear_message_queue();
        for _ in 0..3 {
            if !self.send(&create_recovery_query()) {
                continue;
            }
            let Some(message) = self.device.receive_message() else {
                continue;
            };
            if *parse_recovery_mode_broadcast(&message).value() {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hardware::{
            DeviceConfig,
            mock::{DEFAULT_OSID, FLASH_CHIP_ID, KERNEL_VERSION, MockDevice, MockPcm},
        },
        key_algorithm::GmKeyAlgorithm,
    };

    fn unlocked() -> Vehicle<MockDevice> {
        let mut pcm = MockPcm::new();
        pcm.set_unlocked(true);
        let mut v = Vehicle::new(MockDevice::new(pcm, DeviceConfig::default()));
        assert!(v.initialize());
        v
    }

    fn kernel_image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn uploads_and_runs_kernel() {
        let mut v = unlocked();
        let info = PcmInfo::new(DEFAULT_OSID);
        // Larger than one block so the remainder and a full block are both sent
        let kernel = kernel_image(5000);
        assert!(v.pcm_execute(&info, &kernel).is_success());
        assert!(v.device().pcm().is_kernel_running());
        assert_eq!(v.device().pcm().kernel(), kernel.as_slice());

        assert_eq!(v.get_kernel_version().into_value(), KERNEL_VERSION);
        assert_eq!(v.query_os_id_from_kernel().into_value(), DEFAULT_OSID);
        assert_eq!(v.query_flash_chip_id().into_value(), FLASH_CHIP_ID);

        v.cleanup();
        assert!(!v.device().pcm().is_kernel_running());
        assert_eq!(v.get_kernel_version().status(), ResponseStatus::Refused);
    }

    #[test]
    fn upload_needs_unlock() {
        let mut pcm = MockPcm::new();
        pcm.set_unlocked(false);
        let mut v = Vehicle::new(MockDevice::new(pcm, DeviceConfig::default()));
        assert!(v.initialize());
        let info = PcmInfo::new(DEFAULT_OSID);
        let response = v.pcm_execute(&info, &kernel_image(100));
        assert_eq!(response.status(), ResponseStatus::Refused);

        assert!(v.unlock_ecu(&GmKeyAlgorithm::new(1)).is_success());
        assert!(v.pcm_execute(&info, &kernel_image(100)).is_success());
    }

    #[test]
    fn kernel_too_large_for_ram() {
        let mut v = unlocked();
        let info = PcmInfo::new(DEFAULT_OSID);
        let response = v.pcm_execute(&info, &vec![0; 0x5000]);
        assert_eq!(response.status(), ResponseStatus::Error);
        assert!(v.device().sent().is_empty());
    }

    #[test]
    fn recovery_mode() {
        let mut v = unlocked();
        assert!(!v.is_in_recovery_mode());
        v.device_mut().pcm_mut().set_recovery_mode(true);
        assert!(v.is_in_recovery_mode());
    }
}
