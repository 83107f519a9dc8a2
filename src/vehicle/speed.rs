use std::time::{Duration, Instant};

use super::Vehicle;
use crate::{
    hardware::{Device, TimeoutScenario},
    protocol::*,
    vpw::{VpwSpeed, device_category, device_id},
};

/// How long to watch for modules refusing the switch to 4x
const REFUSAL_WINDOW: Duration = Duration::from_millis(500);

impl<D: Device> Vehicle<D> {
    /// Asks every module on the bus to stop sending normal traffic
    pub fn suppress_chatter(&mut self) -> bool {
        log::debug!("Suppressing VPW chatter");
        let sent = self.send(&create_disable_normal_message_transmission());
        self.force_send_tool_present_notification();
        sent
    }

    /// Moves the whole bus to `speed`.
    ///
    /// Returns true without changing anything if the adapter lacks 4x or 4x is disabled.
    /// Returns false if any module refuses the switch
    pub fn set_vpw_4x(&mut self, speed: VpwSpeed) -> bool {
        if !self.device.supports_4x() {
            if speed == VpwSpeed::FourX {
                log::info!("This interface does not support VPW 4x");
            }
            return true;
        }
        if speed == VpwSpeed::FourX && !self.device.state().enable_4x {
            log::info!("4x communications disabled by configuration");
            return true;
        }

        if speed == VpwSpeed::FourX {
            log::info!("Attempting switch to VPW 4x");
            self.set_device_timeout(TimeoutScenario::ReadProperty);
            if !self.request_high_speed_permission() {
                return false;
            }
            self.force_send_tool_present_notification();
            self.send(&create_begin_high_speed(device_id::BROADCAST));

            // Refusals after the switch command usually get lost, but check anyway
            let started = Instant::now();
            while started.elapsed() < REFUSAL_WINDOW {
                let Some(message) = self.device.receive_message() else {
                    break;
                };
                let refused = parse_high_speed_refusal(&message);
                if refused.is_success() && *refused.value() {
                    log::error!("Module 0x{:02X} refused the high speed switch", message[2]);
                    return false;
                }
            }
        } else {
            log::info!("Reverting to VPW 1x");
        }

        if !self.device.set_vpw_speed(speed) {
            log::error!("Unable to switch the interface to {speed}");
            return false;
        }
        self.force_send_tool_present_notification();
        true
    }

    /// Broadcasts a permission request and collects replies. False if any module refuses
    fn request_high_speed_permission(&mut self) -> bool {
        self.device.clear_message_queue();
        self.send(&create_high_speed_permission_request(device_id::BROADCAST));

        let mut any_refused = false;
        while let Some(message) = self.device.receive_message() {
            let parsed = parse_high_speed_permission_response(&message);
            if !parsed.is_valid {
                log::debug!("Ignoring {message}");
                continue;
            }
            let category = device_category(parsed.device_id);
            if parsed.permission_granted {
                log::info!(
                    "Module 0x{:02X} ({category}) agreed to enter high speed mode",
                    parsed.device_id
                );
            } else {
                log::warn!(
                    "Module 0x{:02X} ({category}) refused to enter high speed mode",
                    parsed.device_id
                );
                any_refused = true;
            }
        }
        !any_refused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        DeviceConfig,
        mock::{MockDevice, MockPcm},
    };

    fn vehicle(enable_4x: bool) -> Vehicle<MockDevice> {
        let mut v = Vehicle::new(MockDevice::new(MockPcm::new(), DeviceConfig { enable_4x }));
        assert!(v.initialize());
        v
    }

    #[test]
    fn switches_bus() {
        let mut v = vehicle(true);
        assert!(v.set_vpw_4x(VpwSpeed::FourX));
        assert_eq!(v.device().speed(), VpwSpeed::FourX);
        assert_eq!(v.device().pcm().speed(), VpwSpeed::FourX);
        // The PCM still answers at the new speed
        assert!(v.query_operating_system_id().is_success());
    }

    #[test]
    fn refused_switch() {
        let mut v = vehicle(true);
        v.device_mut().pcm_mut().set_refuse_high_speed(true);
        assert!(!v.set_vpw_4x(VpwSpeed::FourX));
        assert_eq!(v.device().speed(), VpwSpeed::Standard);
    }

    #[test]
    fn disabled_by_configuration() {
        let mut v = vehicle(false);
        assert!(v.set_vpw_4x(VpwSpeed::FourX));
        assert_eq!(v.device().speed(), VpwSpeed::Standard);
        assert!(v.device().sent().is_empty());
    }

    #[test]
    fn chatter_suppression() {
        let mut v = vehicle(false);
        assert!(v.suppress_chatter());
        assert_eq!(v.device().sent()[0].bytes(), &[0x6C, 0xFE, 0xF0, 0x28, 0x00]);
    }
}
