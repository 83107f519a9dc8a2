//! Request/reply exchange with a retry budget

use super::Vehicle;
use crate::{
    hardware::Device,
    message::Message,
    response::{Response, ResponseStatus},
};

/// Times a request is sent before giving up
pub const QUERY_SEND_ATTEMPTS: usize = 2;
/// Frames read per send while looking for the reply
pub const QUERY_RECEIVE_ATTEMPTS: usize = 50;
/// Empty reads per send before sending again
pub const QUERY_MAX_TIMEOUTS: usize = 5;

/// Sends a request and reads frames until one the filter accepts.
///
/// Frames the filter classifies as [ResponseStatus::UnexpectedResponse] or
/// [ResponseStatus::Truncated] are assumed to be other bus traffic and skipped. After each
/// empty read a tool present notification is forced so the PCM stays in diagnostic mode
#[derive(Debug, Clone)]
pub struct Query<G, F> {
    generator: G,
    filter: F,
    send_attempts: usize,
    receive_attempts: usize,
}

impl<T, G, F> Query<G, F>
where
    T: Default,
    G: Fn() -> Message,
    F: Fn(&Message) -> Response<T>,
{
    /// Creates a query with the default budget
    pub fn new(generator: G, filter: F) -> Self {
        Self {
            generator,
            filter,
            send_attempts: QUERY_SEND_ATTEMPTS,
            receive_attempts: QUERY_RECEIVE_ATTEMPTS,
        }
    }

    /// Changes the retry budget
    pub fn with_attempts(mut self, send_attempts: usize, receive_attempts: usize) -> Self {
        self.send_attempts = send_attempts;
        self.receive_attempts = receive_attempts;
        self
    }

    /// Runs the exchange. Gives up with [ResponseStatus::Timeout] once the budget is spent
    pub fn execute<D: Device>(&self, vehicle: &mut Vehicle<D>) -> Response<T> {
        let request = (self.generator)();
        vehicle.device.clear_message_queue();

        for send_attempt in 1..=self.send_attempts {
            if !vehicle.device.send_message(&request) {
                log::warn!("Unable to send request, attempt {send_attempt}");
                vehicle.force_send_tool_present_notification();
                continue;
            }

            let mut timeouts = 0;
            for _ in 0..self.receive_attempts {
                if vehicle.is_cancelled() {
                    log::info!("Query cancelled");
                    return Response::failed(ResponseStatus::Error);
                }
                let Some(message) = vehicle.device.receive_message() else {
                    timeouts += 1;
                    if timeouts >= QUERY_MAX_TIMEOUTS {
                        break;
                    }
                    vehicle.force_send_tool_present_notification();
                    continue;
                };
                let response = (self.filter)(&message);
                match response.status() {
                    ResponseStatus::UnexpectedResponse | ResponseStatus::Truncated => {
                        log::debug!("Ignoring {message}");
                    }
                    _ => return response,
                }
            }
        }
        log::debug!("No reply to {request}");
        Response::failed(ResponseStatus::Timeout)
    }
}
