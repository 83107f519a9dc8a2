use super::{MAX_RECEIVE_ATTEMPTS, Query, Vehicle};
use crate::{
    VpwError, VpwResult,
    hardware::{Device, TimeoutScenario},
    logging::{dpid_configuration::DpidConfiguration, parameter::ParameterKind},
    message::Message,
    protocol::*,
    response::{Response, ResponseStatus},
};

impl<D: Device> Vehicle<D> {
    /// Assigns every column of `configuration` to its DPID slot.
    ///
    /// Returns the configured DPIDs, or `None` if the PCM did not accept a slot. Returns
    /// `Err` if a column cannot be read through a DPID on `osid`
    pub fn configure_dpids(
        &mut self,
        configuration: &DpidConfiguration,
        osid: u32,
    ) -> VpwResult<Option<Vec<u8>>> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        for group in &configuration.groups {
            // Slots are numbered from 1
            let mut position = 1u8;
            for column in &group.columns {
                let parameter = &column.parameter;
                let (define_by, id) = match &parameter.kind {
                    ParameterKind::Pid { pid, .. } => (DefineBy::Pid, *pid),
                    ParameterKind::Ram { .. } => {
                        let address = parameter.ram_address(osid).ok_or_else(|| {
                            VpwError::ParameterInvalid(format!(
                                "{} has no RAM address for operating system {osid}",
                                parameter.name
                            ))
                        })?;
                        (DefineBy::Address, address)
                    }
                    _ => {
                        return Err(VpwError::ParameterInvalid(format!(
                            "{} is not read through a DPID",
                            parameter.name
                        )));
                    }
                };
                let size = parameter.byte_count() as u8;
                let request = configure_dynamic_data(group.dpid, define_by, position, size, id)?;
                let dpid = group.dpid;
                let response = Query::new(
                    || request.clone(),
                    |m: &Message| parse_configure_dynamic_data_response(m, dpid),
                )
                .execute(self);
                if !(response.is_success() && *response.value()) {
                    log::error!(
                        "Unable to configure {} in DPID {dpid:02X}: {}",
                        parameter.name,
                        response.status()
                    );
                    return Ok(None);
                }
                position += size;
            }
        }
        Ok(Some(configuration.dpids()))
    }

    /// Asks the PCM to send DPID data
    pub fn request_dpids(&mut self, dpids: &[u8], request_type: DpidRequestType) -> bool {
        self.send(&request_dpids(dpids, request_type))
    }

    /// Reads the next DPID payload, skipping other traffic. `None` if nothing arrives
    pub fn read_log_data(&mut self) -> Option<RawLogData> {
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            let message = self.device.receive_message()?;
            if let Some(data) = try_parse_raw_log_data(&message) {
                return Some(data);
            }
            log::debug!("Ignoring {message}");
        }
        None
    }

    /// Reads one PID
    pub fn query_pid(&mut self, pid: u32) -> VpwResult<Response<u32>> {
        self.read_value(create_pid_request(pid), parse_pid_response)
    }

    /// Reads 4 bytes of RAM
    pub fn query_ram(&mut self, address: u32) -> VpwResult<Response<u32>> {
        self.read_value(create_ram_request(address), parse_ram_response)
    }

    fn read_value(
        &mut self,
        request: Message,
        parse: fn(&Message) -> VpwResult<Response<u32>>,
    ) -> VpwResult<Response<u32>> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();
        if !self.send(&request) {
            return Ok(Response::failed(ResponseStatus::Error));
        }
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            let Some(message) = self.device.receive_message() else {
                break;
            };
            let response = parse(&message)?;
            match response.status() {
                ResponseStatus::UnexpectedResponse | ResponseStatus::Truncated => {
                    log::debug!("Ignoring {message}");
                }
                _ => return Ok(response),
            }
        }
        Ok(Response::failed(ResponseStatus::Timeout))
    }
}
