//! Data logging through dynamic PIDs (DPIDs).
//!
//! Parameters picked by the user are packed into DPIDs of up to 6 bytes each by
//! [config_factory::LoggerConfigurationFactory]. A [logger::Logger] configures those DPIDs on
//! the PCM, then reads rows of payloads which [row_parser::LogRowParser] converts to
//! display strings. Math columns are calculated from two converted columns of the same row.

pub mod config_factory;
pub mod dpid_configuration;
pub mod expression;
pub mod logger;
pub mod math_value;
pub mod parameter;
pub mod profile;
pub mod row_parser;

pub use config_factory::{LoggerConfiguration, LoggerConfigurationFactory};
pub use dpid_configuration::{DpidConfiguration, ParameterGroup};
pub use logger::{FastLogger, Logger, LoggingStrategy, SlowLogger};
pub use parameter::{Conversion, LogColumn, Parameter, ParameterKind, StorageType};
pub use profile::{LogProfile, ParameterDatabase};
