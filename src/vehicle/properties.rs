use super::{MAX_RECEIVE_ATTEMPTS, Query, Vehicle};
use crate::{
    VpwResult,
    hardware::{Device, TimeoutScenario},
    message::Message,
    protocol::*,
    response::{Response, ResponseStatus},
    vin,
    vpw::{block_id, device_id, mode, priority},
};

/// Accepts the reply to a block read of `block`, `[6C F0 10 7C block ..]`
fn block_read_reply(block: u8) -> impl Fn(&Message) -> Response<Option<Message>> {
    move |message| {
        let expected = [
            priority::PHYSICAL0,
            device_id::TOOL,
            device_id::PCM,
            mode::READ_BLOCK + mode::RESPONSE,
            block,
        ];
        match try_verify_initial_bytes(message.bytes(), &expected) {
            ResponseStatus::Success => {
                Response::create(ResponseStatus::Success, Some(message.clone()))
            }
            status => {
                let refused = [
                    priority::PHYSICAL0,
                    device_id::TOOL,
                    device_id::PCM,
                    mode::NEGATIVE,
                    mode::READ_BLOCK,
                    block,
                ];
                if try_verify_initial_bytes(message.bytes(), &refused) == ResponseStatus::Success {
                    Response::failed(ResponseStatus::Refused)
                } else {
                    Response::failed(status)
                }
            }
        }
    }
}

impl<D: Device> Vehicle<D> {
    /// Reads three blocks in turn, stopping at the first that fails
    fn read_three_blocks(
        &mut self,
        requests: [(Message, u8); 3],
    ) -> Response<Option<[Message; 3]>> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();
        let mut replies = Vec::with_capacity(3);
        for (request, block) in requests {
            if !self.send(&request) {
                return Response::failed(ResponseStatus::Error);
            }
            let reply = self.wait_for_success(block_read_reply(block), MAX_RECEIVE_ATTEMPTS);
            let status = reply.status();
            match reply.into_value() {
                Some(message) if status == ResponseStatus::Success => replies.push(message),
                _ => {
                    log::error!("Block {block:02X} read failed: {status}");
                    return Response::failed(status);
                }
            }
        }
        match <[Message; 3]>::try_from(replies) {
            Ok(replies) => Response::create(ResponseStatus::Success, Some(replies)),
            Err(_) => Response::failed(ResponseStatus::Error),
        }
    }

    /// Reads the VIN from its three blocks. Failures carry [UNKNOWN]
    pub fn query_vin(&mut self) -> Response<String> {
        let requests = [
            (create_vin_request1(), block_id::VIN1),
            (create_vin_request2(), block_id::VIN2),
            (create_vin_request3(), block_id::VIN3),
        ];
        let replies = self.read_three_blocks(requests);
        match replies.status() {
            ResponseStatus::Success => match replies.into_value() {
                Some([r1, r2, r3]) => parse_vin_responses(&r1, &r2, &r3),
                None => Response::create(ResponseStatus::Error, UNKNOWN.to_string()),
            },
            status => Response::create(status, UNKNOWN.to_string()),
        }
    }

    /// Reads the serial number from its three blocks. Failures carry [UNKNOWN]
    pub fn query_serial(&mut self) -> Response<String> {
        let requests = [
            (create_serial_request1(), block_id::SERIAL1),
            (create_serial_request2(), block_id::SERIAL2),
            (create_serial_request3(), block_id::SERIAL3),
        ];
        let replies = self.read_three_blocks(requests);
        match replies.status() {
            ResponseStatus::Success => match replies.into_value() {
                Some([r1, r2, r3]) => parse_serial_responses(&r1, &r2, &r3),
                None => Response::create(ResponseStatus::Error, UNKNOWN.to_string()),
            },
            status => Response::create(status, UNKNOWN.to_string()),
        }
    }

    /// Broadcast code
    pub fn query_bcc(&mut self) -> Response<String> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(create_bcc_request, parse_bcc_response).execute(self)
    }

    /// Manufacturer enable counter
    pub fn query_mec(&mut self) -> Response<String> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(create_mec_request, parse_mec_response).execute(self)
    }

    /// Operating system ID
    pub fn query_operating_system_id(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(create_operating_system_id_read_request, parse_u32_from_block_read).execute(self)
    }

    /// Calibration ID
    pub fn query_calibration_id(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(create_calibration_id_read_request, parse_u32_from_block_read).execute(self)
    }

    /// Hardware ID
    pub fn query_hardware_id(&mut self) -> Response<u32> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        Query::new(create_hardware_id_read_request, parse_u32_from_block_read).execute(self)
    }

    /// Writes a new VIN. The PCM must be unlocked first.
    ///
    /// Returns `Err` if `vin` is not a valid VIN, otherwise the status of the first block
    /// write that did not succeed
    pub fn update_vin(&mut self, vin: &str) -> VpwResult<Response<bool>> {
        vin::validate(vin)?;
        if !vin::is_checksum_ok(vin) {
            log::warn!("VIN {vin} has an incorrect check digit");
        }
        let mut bytes = [0u8; vin::VIN_LENGTH];
        bytes.copy_from_slice(vin.as_bytes());
        let blocks = split_vin(&bytes);

        self.set_device_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();
        let block_ids = [block_id::VIN1, block_id::VIN2, block_id::VIN3];
        for (block, data) in block_ids.into_iter().zip(&blocks) {
            log::info!("Writing VIN block {block}");
            if !self.send(&create_block_write_request(block, data)) {
                return Ok(Response::create(ResponseStatus::Error, false));
            }
            let reply = self.wait_for_success(
                |m| parse_block_write_response(m, block),
                MAX_RECEIVE_ATTEMPTS,
            );
            if !reply.is_success() {
                log::error!("VIN block {block} write failed: {}", reply.status());
                return Ok(reply);
            }
        }
        log::info!("VIN successfully updated to {vin}");
        Ok(Response::create(ResponseStatus::Success, true))
    }
}
