//! Module for the byte channels that carry adapter traffic
//!
//! Serial adapters (AVT, ELM327 family) exchange raw bytes with the host. A device owns a
//! [ByteChannel] and runs its own framing on top of it, so the device logic can be tested
//! against a scripted channel.
//!
//! Currently, the following channels are defined:
//! * [SerialPortChannel] - OS serial port (requires the `serial` feature)
//! * [crate::hardware::simulation::SimulationChannel] - Scripted channel for testing

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug)]
/// Error produced by a communication channel
pub enum ChannelError {
    /// Underlying IO Error with channel
    IOError(std::io::Error),
    /// Timeout when writing data to the channel
    WriteTimeout,
    /// Timeout when reading from the channel
    ReadTimeout,
    /// Unsupported channel request
    UnsupportedRequest,
    /// The interface is not open
    InterfaceNotOpen,
    /// Any other channel failure
    Other(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::IOError(e) => write!(f, "IO error: {e}"),
            ChannelError::UnsupportedRequest => write!(f, "unsupported channel request"),
            ChannelError::ReadTimeout => write!(f, "timeout reading from channel"),
            ChannelError::WriteTimeout => write!(f, "timeout writing to channel"),
            ChannelError::InterfaceNotOpen => write!(f, "channel's interface is not open"),
            ChannelError::Other(e) => write!(f, "channel error: {e}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::IOError(io_err) = self {
            Some(io_err)
        } else {
            None
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::ReadTimeout,
            _ => Self::IOError(err),
        }
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// OS name of the port, EG: `COM3` or `/dev/ttyUSB0`
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u32,
}

impl SerialConfig {
    /// Creates a config with a 1 second read timeout
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout_ms: 1000,
        }
    }
}

/// A bidirectional byte stream to an adapter.
///
/// Reads never block longer than the configured timeout. A read that times out returns `Ok(0)`
/// rather than an error, devices treat it as "nothing yet".
pub trait ByteChannel: Send {
    /// Opens (or reopens) the channel with the given settings
    fn open(&mut self, config: &SerialConfig) -> ChannelResult<()>;

    /// Closes the channel. Further operations return [ChannelError::InterfaceNotOpen]
    fn close(&mut self) -> ChannelResult<()>;

    /// Writes every byte of `buffer`
    fn write_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()>;

    /// Reads up to `buffer.len()` bytes, returning how many were read. 0 means the read timed out
    fn read_bytes(&mut self, buffer: &mut [u8]) -> ChannelResult<usize>;

    /// Drops anything pending in the receive and transmit buffers
    fn discard_buffers(&mut self) -> ChannelResult<()>;

    /// Changes the read timeout
    fn set_timeout(&mut self, timeout_ms: u32) -> ChannelResult<()>;

    /// Number of bytes that can be read without waiting
    fn bytes_to_read(&mut self) -> ChannelResult<usize>;

    /// Reads a single byte, `None` on timeout
    fn read_byte(&mut self) -> ChannelResult<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_bytes(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }
}

#[cfg(feature = "serial")]
pub use serial::SerialPortChannel;

#[cfg(feature = "serial")]
mod serial {
    use std::{io::Read, io::Write, time::Duration};

    use serialport::{ClearBuffer, SerialPort};

    use super::{ByteChannel, ChannelError, ChannelResult, SerialConfig};

    impl From<serialport::Error> for ChannelError {
        fn from(err: serialport::Error) -> Self {
            match err.kind() {
                serialport::ErrorKind::Io(_) => ChannelError::IOError(err.into()),
                serialport::ErrorKind::NoDevice => ChannelError::InterfaceNotOpen,
                _ => ChannelError::Other(err.description),
            }
        }
    }

    /// [ByteChannel] over an OS serial port
    pub struct SerialPortChannel {
        port: Option<Box<dyn SerialPort>>,
    }

    impl std::fmt::Debug for SerialPortChannel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialPortChannel")
                .field("port", &self.port.as_ref().and_then(|p| p.name()))
                .finish()
        }
    }

    impl Default for SerialPortChannel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SerialPortChannel {
        /// Creates a closed channel
        pub fn new() -> Self {
            Self { port: None }
        }

        fn port(&mut self) -> ChannelResult<&mut Box<dyn SerialPort>> {
            self.port.as_mut().ok_or(ChannelError::InterfaceNotOpen)
        }
    }

    impl ByteChannel for SerialPortChannel {
        fn open(&mut self, config: &SerialConfig) -> ChannelResult<()> {
            self.port = None;
            log::debug!("Opening {} at {} baud", config.port_name, config.baud_rate);
            let port = serialport::new(&config.port_name, config.baud_rate)
                .timeout(Duration::from_millis(config.timeout_ms as u64))
                .open()?;
            self.port = Some(port);
            Ok(())
        }

        fn close(&mut self) -> ChannelResult<()> {
            self.port = None;
            Ok(())
        }

        fn write_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()> {
            let port = self.port()?;
            port.write_all(buffer)?;
            port.flush()?;
            Ok(())
        }

        fn read_bytes(&mut self, buffer: &mut [u8]) -> ChannelResult<usize> {
            match self.port()?.read(buffer) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e.into()),
            }
        }

        fn discard_buffers(&mut self) -> ChannelResult<()> {
            self.port()?.clear(ClearBuffer::All)?;
            Ok(())
        }

        fn set_timeout(&mut self, timeout_ms: u32) -> ChannelResult<()> {
            self.port()?
                .set_timeout(Duration::from_millis(timeout_ms as u64))?;
            Ok(())
        }

        fn bytes_to_read(&mut self) -> ChannelResult<usize> {
            Ok(self.port()?.bytes_to_read()? as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_map_to_read_timeout() {
        let err: ChannelError = std::io::Error::new(std::io::ErrorKind::TimedOut, "t").into();
        assert!(matches!(err, ChannelError::ReadTimeout));
        let err: ChannelError = std::io::Error::other("boom").into();
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(ChannelError::InterfaceNotOpen.to_string(), "channel's interface is not open");
    }
}
