//! Orchestration of multi step operations against a PCM.
//!
//! A [Vehicle] owns one [Device] and sequences protocol requests into operations such as
//! reading the VIN, unlocking the PCM, uploading a kernel, or reading the whole flash. Each
//! operation stops at the first step that does not succeed and returns that step's status.
//!
//! Requests on one vehicle are strictly sequential. Long operations check a cancellation flag
//! between steps, which another thread can set through [Vehicle::cancel_handle].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    hardware::{Device, TimeoutScenario},
    message::Message,
    response::{Response, ResponseStatus},
};

mod kernel;
mod logging;
mod properties;
pub mod query;
mod read;
mod speed;
pub mod tool_present;
mod unlock;
mod write;

pub use query::Query;
pub use tool_present::ToolPresentNotifier;
pub use write::WriteType;

/// Times a block is sent before an operation gives up
pub const MAX_SEND_ATTEMPTS: usize = 10;
/// Frames read while waiting for one reply
pub const MAX_RECEIVE_ATTEMPTS: usize = 15;

/// A PCM reached through a [Device]
#[derive(Debug)]
pub struct Vehicle<D: Device> {
    device: D,
    notifier: ToolPresentNotifier,
    cancel: Arc<AtomicBool>,
}

impl<D: Device> Vehicle<D> {
    /// Wraps a device. The device is not initialized until [Vehicle::initialize]
    pub fn new(device: D) -> Self {
        Self {
            device,
            notifier: ToolPresentNotifier::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Initializes the device
    pub fn initialize(&mut self) -> bool {
        self.device.initialize()
    }

    /// The device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Releases the device
    pub fn into_device(self) -> D {
        self.device
    }

    /// Flag that cancels long running operations when set. Clear it before starting the
    /// next operation
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// True if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sets the device timeout. Returns the previous scenario
    pub fn set_device_timeout(&mut self, scenario: TimeoutScenario) -> TimeoutScenario {
        self.device.set_timeout(scenario)
    }

    /// Sends a tool present notification if one is due
    pub fn send_tool_present_notification(&mut self) {
        self.notifier.notify(&mut self.device);
    }

    /// Sends a tool present notification now
    pub fn force_send_tool_present_notification(&mut self) {
        self.notifier.force_notify(&mut self.device);
    }

    /// Reads frames until `filter` accepts one, skipping frames it classifies as
    /// [ResponseStatus::UnexpectedResponse] or [ResponseStatus::Truncated]
    fn wait_for_success<T: Default>(
        &mut self,
        filter: impl Fn(&Message) -> Response<T>,
        attempts: usize,
    ) -> Response<T> {
        for _ in 0..attempts {
            if self.is_cancelled() {
                return Response::failed(ResponseStatus::Error);
            }
            let Some(message) = self.device.receive_message() else {
                continue;
            };
            let response = filter(&message);
            match response.status() {
                ResponseStatus::UnexpectedResponse | ResponseStatus::Truncated => {
                    log::debug!("Ignoring {message}");
                }
                _ => return response,
            }
        }
        Response::failed(ResponseStatus::Timeout)
    }

    /// Sends a frame, logging failure
    fn send(&mut self, message: &Message) -> bool {
        let sent = self.device.send_message(message);
        if !sent {
            log::error!("Unable to send {message}");
        }
        sent
    }
}
