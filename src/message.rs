//! The VPW message, the unit of data exchanged between every layer of the crate

use std::{fmt, ops::Index, sync::Arc, time::Instant};

use crate::utility::to_hex;

/// An immutable VPW frame.
///
/// Outgoing messages are built by the functions in [crate::protocol]. Incoming messages are
/// produced by a device when it deserializes a frame from its transport. The bytes are never
/// modified after construction, so clones share the same buffer.
#[derive(Clone)]
pub struct Message {
    bytes: Arc<[u8]>,
    timestamp: Instant,
    error: u64,
}

impl Message {
    /// Creates a message from raw bytes, stamped with the current time
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_metadata(bytes, Instant::now(), 0)
    }

    /// Creates a message carrying the acquisition timestamp and transport error code
    /// reported by the device that received it
    ///
    /// ## Parameters
    /// * bytes - Frame contents, header included
    /// * timestamp - When the frame was received
    /// * error - Transport specific error code. 0 means no error
    pub fn with_metadata(bytes: impl Into<Vec<u8>>, timestamp: Instant, error: u64) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: Arc::from(bytes),
            timestamp,
            error,
        }
    }

    /// Returns the frame contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the frame
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the frame has no bytes. A valid VPW frame is never empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// When the frame was created or received
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Transport error code associated with this frame
    pub fn error(&self) -> u64 {
        self.error
    }

    /// Gets a byte without panicking if the index is out of range
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }
}

impl Index<usize> for Message {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.bytes[index]
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Message {}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_hex(&self.bytes))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("bytes", &to_hex(&self.bytes))
            .field("error", &self.error)
            .finish()
    }
}
