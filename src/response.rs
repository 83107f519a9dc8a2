//! Classified outcome of a single wire exchange

use strum_macros::{Display, EnumIter, EnumString};

/// Terminal classification of one request/response exchange
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseStatus {
    /// The reply matched the expected template
    Success,
    /// Generic negative reply, or a block checksum failure
    Error,
    /// No reply within the timeout window, or the ECU is enforcing a lockout delay
    Timeout,
    /// Reply is shorter than required to evaluate it
    Truncated,
    /// A reply was received but it matches no known template
    UnexpectedResponse,
    /// The ECU explicitly rejected the request
    Refused,
}

/// A [ResponseStatus] paired with a value.
///
/// The value is only meaningful when the status is [ResponseStatus::Success]. For every other
/// status it holds a best effort default (or, for block reads with a bad checksum, the data that
/// was received) so callers can still log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    status: ResponseStatus,
    value: T,
}

impl<T> Response<T> {
    /// Creates a response. This is the only way to build one
    pub fn create(status: ResponseStatus, value: T) -> Self {
        Self { status, value }
    }

    /// Status of the exchange
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// True if the status is [ResponseStatus::Success]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Value carried by the response. Check [Response::status] first
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the response and returns its value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the value only if the exchange succeeded
    pub fn success(self) -> Option<T> {
        match self.status {
            ResponseStatus::Success => Some(self.value),
            _ => None,
        }
    }

    /// Maps the value, keeping the status
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Response<U> {
        Response {
            status: self.status,
            value: f(self.value),
        }
    }
}

impl<T: Default> Response<T> {
    /// Creates a response carrying the default value of `T`, used for every non-success outcome
    pub fn failed(status: ResponseStatus) -> Self {
        Self::create(status, T::default())
    }
}
