use super::{MAX_RECEIVE_ATTEMPTS, Vehicle};
use crate::{
    hardware::{Device, TimeoutScenario},
    key_algorithm::KeyAlgorithm,
    protocol::*,
    response::{Response, ResponseStatus},
};

impl<D: Device> Vehicle<D> {
    /// Runs the seed/key handshake.
    ///
    /// A PCM that reports itself already unlocked (or hands out a seed of 0) is a success
    /// without sending a key
    pub fn unlock_ecu(&mut self, key_algorithm: &dyn KeyAlgorithm) -> Response<bool> {
        self.set_device_timeout(TimeoutScenario::ReadProperty);
        self.device.clear_message_queue();
        log::info!("Sending seed request");
        if !self.send(&create_seed_request()) {
            return Response::create(ResponseStatus::Error, false);
        }

        let mut seed = None;
        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            let Some(message) = self.device.receive_message() else {
                continue;
            };
            if is_unlocked(&message) {
                log::info!("PCM is already unlocked");
                return Response::create(ResponseStatus::Success, true);
            }
            let response = parse_seed(&message);
            if response.is_success() {
                seed = Some(response.into_value());
                break;
            }
            log::debug!("Ignoring {message}");
        }

        let Some(seed) = seed else {
            log::error!("No seed received");
            return Response::create(ResponseStatus::Timeout, false);
        };
        if seed == 0 {
            log::info!("PCM is already unlocked");
            return Response::create(ResponseStatus::Success, true);
        }

        let key = key_algorithm.get_key(seed);
        log::info!("Seed {seed:04X}, sending key {key:04X}");
        if !self.send(&create_unlock_request(key)) {
            return Response::create(ResponseStatus::Error, false);
        }

        for _ in 0..MAX_RECEIVE_ATTEMPTS {
            let Some(message) = self.device.receive_message() else {
                continue;
            };
            let (response, description) = parse_unlock_response(&message);
            if response.status() == ResponseStatus::UnexpectedResponse {
                log::debug!("Ignoring {message}");
                continue;
            }
            match description {
                Some(description) => log::error!("{description}"),
                None => log::info!("PCM unlocked"),
            }
            return response;
        }
        log::error!("No reply to the unlock request");
        Response::create(ResponseStatus::Timeout, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hardware::{
            DeviceConfig,
            mock::{MockDevice, MockPcm},
        },
        key_algorithm::GmKeyAlgorithm,
    };

    struct WrongKey;

    impl KeyAlgorithm for WrongKey {
        fn get_key(&self, seed: u16) -> u16 {
            seed
        }
    }

    fn vehicle() -> Vehicle<MockDevice> {
        let mut v = Vehicle::new(MockDevice::new(MockPcm::new(), DeviceConfig::default()));
        assert!(v.initialize());
        v
    }

    #[test]
    fn unlocks() {
        let mut v = vehicle();
        let response = v.unlock_ecu(&GmKeyAlgorithm::new(1));
        assert_eq!(response, Response::create(ResponseStatus::Success, true));
        assert!(v.device().pcm().is_unlocked());
        // Second attempt sees the unlocked reply and sends no key
        let sent = v.device().sent().len();
        assert!(v.unlock_ecu(&GmKeyAlgorithm::new(1)).is_success());
        assert_eq!(v.device().sent().len(), sent + 1);
    }

    #[test]
    fn wrong_key() {
        let mut v = vehicle();
        let response = v.unlock_ecu(&WrongKey);
        assert_eq!(response.status(), ResponseStatus::Error);
        assert!(!v.device().pcm().is_unlocked());
    }
}
