#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for talking to GM powertrain control modules (PCMs) over the SAE J1850 VPW bus.
//!
//! ## Protocol engine
//!
//! The core of this crate is a byte-exact implementation of the VPW request/response protocol
//! spoken by GM PCMs from the late 1990s to the late 2000s. This includes:
//! * Building request frames and classifying replies into a single [response::ResponseStatus]
//! * The seed/key security unlock handshake
//! * Block transfers to and from PCM memory, including the 16 bit additive block checksum
//!   and run-length encoded replies
//! * Uploading and executing a kernel in PCM RAM
//! * Negotiating 4x (41.6kbps) high speed mode
//! * Configuring and reading dynamic PIDs (DPIDs) for data logging
//!
//! Parsing functions never fail with an `Err` for malformed replies; they always classify the
//! reply and return a [response::Response]. Errors in this crate are reserved for
//! environment problems (IO, driver loading) and programmer mistakes.
//!
//! ## Hardware support
//!
//! ### AVT 838/842/852
//! Serial adapters using AVT's length-prefixed packet framing.
//!
//! ### ELM327 derived adapters
//! OBDLink ScanTool (STN chipset) and AllPro adapters, using AT commands and ASCII hex framing.
//!
//! ### SAE J2534
//! SAE J2534 (AKA Passthru) adapters that support J1850VPW. The caller supplies the path of
//! the vendor library, discovery of installed adapters is not handled here.
//!
//! ### Mock
//! A simulated PCM for testing orchestration code without hardware.
//!

use std::sync::Arc;

use channel::ChannelError;
use hardware::HardwareError;
use logging::expression::ExpressionError;

pub mod block;
pub mod channel;
pub mod flash_chip;
pub mod framing;
pub mod hardware;
pub mod key_algorithm;
pub mod logging;
pub mod message;
pub mod pcm_info;
pub mod protocol;
pub mod response;
pub mod utility;
pub mod vehicle;
pub mod vin;
pub mod vpw;

pub use message::Message;
pub use response::{Response, ResponseStatus};
pub use vehicle::Vehicle;

/// VPW engine result
pub type VpwResult<T> = Result<T, VpwError>;

#[derive(Clone, Debug, thiserror::Error)]
/// Errors that are not a classification of an ECU reply
pub enum VpwError {
    /// A parameter given to the function is invalid. Check the function's documentation
    /// for more information
    #[error("Function parameter invalid: {0}")]
    ParameterInvalid(String),
    /// A data format the engine does not handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Conversion expression could not be evaluated for a log parameter
    #[error("Unable to evaluate expression \"{expression}\" for parameter \"{parameter}\"")]
    Evaluation {
        /// Expression text after sanitizing
        expression: String,
        /// Name of the parameter being converted
        parameter: String,
        /// Underlying expression error
        #[source]
        source: ExpressionError,
    },
    /// Conversion expression could not be parsed
    #[error("Conversion expression error")]
    Expression(
        #[from]
        #[source]
        ExpressionError,
    ),
    /// Error with underlying communication channel
    #[error("Byte channel error")]
    ChannelError(
        #[from]
        #[source]
        Arc<ChannelError>,
    ),
    /// Device hardware error
    #[error("Device hardware error")]
    HardwareError(
        #[from]
        #[source]
        Arc<HardwareError>,
    ),
}

impl From<ChannelError> for VpwError {
    fn from(err: ChannelError) -> Self {
        Self::ChannelError(Arc::new(err))
    }
}

impl From<HardwareError> for VpwError {
    fn from(err: HardwareError) -> Self {
        Self::HardwareError(Arc::new(err))
    }
}
