//! Byte level state machines that cut a transport's raw byte stream into frames.
//!
//! Each machine is a value implementing [Framer]. Feeding it a byte consumes the old state and
//! returns the next one, plus a frame when the byte completed one. A machine never surfaces a
//! partial frame: an unexpected byte puts it back in its start state and the partial frame is
//! dropped.
//!
//! Currently, the following framers are defined:
//! * [avt::AvtFramer] - AVT length prefixed packets
//! * [elm::ElmFramer] - ELM327 prompt terminated text lines
//! * [can::CanFramer] - `AA .. 55` CAN frames from serial CAN loggers
//! * [dpid_serial::DpidSerialFramer] - `FF id FE payload` frames from serial DPID loggers

pub mod avt;
pub mod can;
pub mod dpid_serial;
pub mod elm;

/// A byte stream state machine
pub trait Framer: Default {
    /// What the machine produces
    type Frame;

    /// Consumes one byte. Returns the next state and, if `byte` completed one, a frame.
    /// After a frame is returned the next state is always the start state
    fn step(self, byte: u8) -> (Self, Option<Self::Frame>);
}

/// Holds a [Framer] between bytes for transports that receive a few bytes at a time
#[derive(Debug, Default)]
pub struct FrameReader<F: Framer> {
    state: F,
}

impl<F: Framer> FrameReader<F> {
    /// Creates a reader in the start state
    pub fn new() -> Self {
        Self { state: F::default() }
    }

    /// Feeds one byte
    pub fn push(&mut self, byte: u8) -> Option<F::Frame> {
        let (next, frame) = std::mem::take(&mut self.state).step(byte);
        self.state = next;
        frame
    }

    /// Feeds a buffer, returning every frame it completed
    pub fn push_all(&mut self, bytes: &[u8]) -> Vec<F::Frame> {
        bytes.iter().filter_map(|b| self.push(*b)).collect()
    }

    /// Drops any partial frame
    pub fn reset(&mut self) {
        self.state = F::default();
    }
}

/// Lazy sequence of frames decoded from a byte iterator.
///
/// Ends when the byte source ends. An infinite source (such as a receive loop) yields an infinite
/// sequence
#[derive(Debug)]
pub struct Frames<F: Framer, I> {
    bytes: I,
    reader: FrameReader<F>,
}

impl<F: Framer, I: Iterator<Item = u8>> Iterator for Frames<F, I> {
    type Item = F::Frame;

    fn next(&mut self) -> Option<Self::Item> {
        for byte in self.bytes.by_ref() {
            if let Some(frame) = self.reader.push(byte) {
                return Some(frame);
            }
        }
        None
    }
}

/// Decodes frames from `bytes` with framer `F`
pub fn frames<F: Framer, I: IntoIterator<Item = u8>>(bytes: I) -> Frames<F, I::IntoIter> {
    Frames {
        bytes: bytes.into_iter(),
        reader: FrameReader::new(),
    }
}
