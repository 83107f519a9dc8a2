//! Keeps the PCM in diagnostic mode during long operations

use std::time::{Duration, Instant};

use crate::{
    hardware::{Device, TimeoutScenario},
    protocol::create_test_device_present_notification,
};

/// PCMs leave diagnostic mode after 5 seconds without a tool present frame
pub const NOTIFICATION_INTERVAL: Duration = Duration::from_secs(2);

/// Sends tool present frames no more often than [NOTIFICATION_INTERVAL]
#[derive(Debug, Clone, Copy)]
pub struct ToolPresentNotifier {
    last_notification: Option<Instant>,
}

impl Default for ToolPresentNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolPresentNotifier {
    /// Creates a notifier that will send on the first [ToolPresentNotifier::notify]
    pub fn new() -> Self {
        Self { last_notification: None }
    }

    /// Sends a notification if the last one was long enough ago
    pub fn notify<D: Device>(&mut self, device: &mut D) {
        let due = self
            .last_notification
            .is_none_or(|last| last.elapsed() > NOTIFICATION_INTERVAL);
        if due {
            self.force_notify(device);
        }
    }

    /// Sends a notification now. The device timeout is dropped to the minimum for the send,
    /// as nothing replies
    pub fn force_notify<D: Device>(&mut self, device: &mut D) {
        let previous = device.set_timeout(TimeoutScenario::Minimum);
        if !device.send_message(&create_test_device_present_notification()) {
            log::warn!("Unable to send tool present notification");
        }
        device.set_timeout(previous);
        self.last_notification = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        DeviceConfig,
        mock::{MockDevice, MockPcm},
    };

    #[test]
    fn rate_limited() {
        let mut device = MockDevice::new(MockPcm::new(), DeviceConfig::default());
        device.initialize();
        device.set_timeout(TimeoutScenario::ReadProperty);
        let mut notifier = ToolPresentNotifier::new();
        notifier.notify(&mut device);
        notifier.notify(&mut device);
        assert_eq!(device.sent().len(), 1);
        assert_eq!(device.sent()[0].bytes(), &[0x8C, 0xFE, 0xF0, 0x3F]);
        notifier.force_notify(&mut device);
        assert_eq!(device.sent().len(), 2);
        assert_eq!(device.state().scenario, TimeoutScenario::ReadProperty);
    }
}
