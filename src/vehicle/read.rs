use super::{MAX_RECEIVE_ATTEMPTS, MAX_SEND_ATTEMPTS, Vehicle};
use crate::{
    block::{BLOCK_OVERHEAD, parse_payload},
    hardware::{Device, TimeoutScenario},
    pcm_info::PcmInfo,
    protocol::*,
    response::{Response, ResponseStatus},
    vpw::VpwSpeed,
};

impl<D: Device> Vehicle<D> {
    /// Reads the whole flash image through `kernel`. The PCM must already be unlocked.
    ///
    /// The kernel is always exited afterwards, whether or not the read succeeded
    pub fn read_contents(&mut self, info: &PcmInfo, kernel: &[u8]) -> Response<Vec<u8>> {
        let response = self.read_contents_with_kernel(info, kernel);
        self.cleanup();
        response
    }

    fn read_contents_with_kernel(&mut self, info: &PcmInfo, kernel: &[u8]) -> Response<Vec<u8>> {
        self.device.clear_message_queue();
        // Must precede the switch to 4x
        self.force_send_tool_present_notification();
        if !self.set_vpw_4x(VpwSpeed::FourX) {
            log::error!("Stopping here because we were unable to switch to 4x");
            return Response::failed(ResponseStatus::Error);
        }
        self.send_tool_present_notification();

        let executed = self.pcm_execute(info, kernel);
        if !executed.is_success() {
            log::error!("Failed to upload kernel to PCM");
            return Response::failed(executed.status());
        }
        log::info!("Kernel uploaded to PCM successfully, requesting data");

        self.set_device_timeout(TimeoutScenario::ReadMemoryBlock);
        let block_size = self.device.max_receive_size().saturating_sub(BLOCK_OVERHEAD);
        if block_size == 0 {
            return Response::failed(ResponseStatus::Error);
        }

        let mut image = vec![0u8; info.image_size as usize];
        let mut offset = 0;
        while offset < image.len() {
            if self.is_cancelled() {
                log::info!("Read cancelled");
                return Response::failed(ResponseStatus::Error);
            }
            self.send_tool_present_notification();

            let length = block_size.min(image.len() - offset);
            let address = info.image_base_address + offset as u32;
            let Some(block) = self.try_read_block(address, length) else {
                log::error!(
                    "Unable to read block from {address:06X} to {:06X}",
                    address as usize + length - 1
                );
                return Response::failed(ResponseStatus::Error);
            };
            image[offset..offset + length].copy_from_slice(&block);
            offset += length;
            log::info!("Received block starting at {address:06X}, {}%", offset * 100 / image.len());
        }
        log::info!("Image download complete");
        Response::create(ResponseStatus::Success, image)
    }

    /// Reads `length` bytes at `address` from a running kernel
    fn try_read_block(&mut self, address: u32, length: usize) -> Option<Vec<u8>> {
        log::debug!("Reading from {address:06X}, length {length}");
        'send: for _ in 0..MAX_SEND_ATTEMPTS {
            if !self.send(&create_read_request(address, length)) {
                continue;
            }

            let mut allowed = false;
            for _ in 0..MAX_RECEIVE_ATTEMPTS {
                let Some(message) = self.device.receive_message() else {
                    log::debug!("No reply to the read request");
                    continue 'send;
                };
                let response = parse_read_response(&message);
                match response.status() {
                    ResponseStatus::Success if *response.value() => {
                        allowed = true;
                        break;
                    }
                    ResponseStatus::Success | ResponseStatus::Refused => {
                        log::debug!("Read request refused");
                        continue 'send;
                    }
                    _ => log::debug!("Not a read response: {message}"),
                }
            }
            if !allowed {
                continue;
            }

            for _ in 0..MAX_RECEIVE_ATTEMPTS {
                let Some(message) = self.device.receive_message() else {
                    log::debug!("No payload following read request");
                    continue;
                };
                let payload = parse_payload(&message, length, address);
                if payload.is_success() {
                    return Some(payload.into_value());
                }
                log::debug!("Not a valid payload message or bad checksum: {}", payload.status());
            }
        }
        None
    }
}
