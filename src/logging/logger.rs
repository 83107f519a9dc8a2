//! Logging sessions.
//!
//! A [Logger] configures the DPIDs of a [LoggerConfiguration] once, then produces rows of
//! display strings. How rows are requested from the PCM is up to its [LoggingStrategy]:
//! [SlowLogger] polls one row at a time, [FastLogger] asks the PCM to stream.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use super::{
    config_factory::LoggerConfiguration, math_value::MathValueProcessor, row_parser::LogRowParser,
};
use crate::{
    VpwResult,
    hardware::{Device, TimeoutScenario},
    protocol::DpidRequestType,
    vehicle::Vehicle,
};

/// Interval between tool present frames while streaming
const STREAM_NOTIFY_INTERVAL: Duration = Duration::from_secs(2);
/// Frames read per call while streaming
const STREAM_READS_PER_ROW: usize = 6;

/// How rows are requested from the PCM
pub trait LoggingStrategy<D: Device>: Send + Debug {
    /// Called once the DPIDs are configured. False if logging cannot start
    fn start(&mut self, vehicle: &mut Vehicle<D>, dpids: &[u8], group_count: usize) -> bool;

    /// Feeds received DPID payloads into `row`. False if the request for data failed.
    ///
    /// Returning true does not mean the row is complete
    fn fill_row(&mut self, vehicle: &mut Vehicle<D>, dpids: &[u8], row: &mut LogRowParser) -> bool;
}

/// Requests every row individually
#[derive(Debug, Default, Clone, Copy)]
pub struct SlowLogger;

impl<D: Device> LoggingStrategy<D> for SlowLogger {
    fn start(&mut self, vehicle: &mut Vehicle<D>, _dpids: &[u8], group_count: usize) -> bool {
        vehicle.set_device_timeout(TimeoutScenario::for_dpid_count(group_count));
        true
    }

    fn fill_row(&mut self, vehicle: &mut Vehicle<D>, dpids: &[u8], row: &mut LogRowParser) -> bool {
        if !vehicle.request_dpids(dpids, DpidRequestType::SingleRow) {
            return false;
        }
        while !row.is_complete() {
            let Some(data) = vehicle.read_log_data() else {
                log::debug!("Row incomplete, no more DPID data");
                return true;
            };
            row.parse_data(data);
        }
        true
    }
}

/// Asks the PCM to stream DPIDs, then reads rows from the stream
#[derive(Debug, Clone, Copy)]
pub struct FastLogger {
    last_notification: Instant,
}

impl Default for FastLogger {
    fn default() -> Self {
        Self {
            last_notification: Instant::now(),
        }
    }
}

impl<D: Device> LoggingStrategy<D> for FastLogger {
    fn start(&mut self, vehicle: &mut Vehicle<D>, dpids: &[u8], _group_count: usize) -> bool {
        vehicle.set_device_timeout(TimeoutScenario::Minimum);
        if !vehicle.request_dpids(dpids, DpidRequestType::Stream2) {
            return false;
        }
        vehicle.set_device_timeout(TimeoutScenario::DataLoggingStreaming);
        self.last_notification = Instant::now();
        true
    }

    fn fill_row(
        &mut self,
        vehicle: &mut Vehicle<D>,
        _dpids: &[u8],
        row: &mut LogRowParser,
    ) -> bool {
        for _ in 0..STREAM_READS_PER_ROW {
            if row.is_complete() {
                break;
            }
            if let Some(data) = vehicle.read_log_data() {
                row.parse_data(data);
            }
        }
        // The bus times out without a tool present frame
        if self.last_notification.elapsed() > STREAM_NOTIFY_INTERVAL {
            self.last_notification = Instant::now();
            vehicle.force_send_tool_present_notification();
        }
        true
    }
}

/// One logging session
#[derive(Debug)]
pub struct Logger<D: Device> {
    configuration: LoggerConfiguration,
    dpids: Vec<u8>,
    math: MathValueProcessor,
    strategy: Box<dyn LoggingStrategy<D>>,
}

impl<D: Device> Logger<D> {
    /// Creates a logger, streaming if the configuration asks for fast logging
    pub fn new(configuration: LoggerConfiguration) -> Self {
        let strategy: Box<dyn LoggingStrategy<D>> = if configuration.fast_logging {
            Box::new(FastLogger::default())
        } else {
            Box::new(SlowLogger)
        };
        Self::with_strategy(configuration, strategy)
    }

    /// Creates a logger with a specific strategy
    pub fn with_strategy(
        configuration: LoggerConfiguration,
        strategy: Box<dyn LoggingStrategy<D>>,
    ) -> Self {
        let math = configuration.math_processor();
        Self {
            configuration,
            dpids: Vec::new(),
            math,
            strategy,
        }
    }
}

impl<D: Device> Logger<D> {
    /// Headers of every column, in row order
    pub fn column_headers(&self) -> Vec<String> {
        self.configuration.column_headers()
    }

    /// Configures the DPIDs and starts the strategy. False if the PCM did not accept the
    /// configuration or the strategy could not start
    pub fn start_logging(&mut self, vehicle: &mut Vehicle<D>, osid: u32) -> VpwResult<bool> {
        let Some(dpids) = vehicle.configure_dpids(&self.configuration.dpids, osid)? else {
            return Ok(false);
        };
        self.dpids = dpids;
        let groups = self.configuration.dpids.groups.len();
        Ok(self.strategy.start(vehicle, &self.dpids, groups))
    }

    /// Next row as display strings, DPID columns followed by math columns.
    ///
    /// `None` if the row could not be completed. The session carries on and the caller may
    /// simply ask again
    pub fn get_next_row(&mut self, vehicle: &mut Vehicle<D>) -> VpwResult<Option<Vec<String>>> {
        let mut row = LogRowParser::new(&self.configuration.dpids);
        if !self.strategy.fill_row(vehicle, &self.dpids, &mut row) || !row.is_complete() {
            return Ok(None);
        }
        let values = row.evaluate()?;
        let mut strings = values.strings();
        strings.extend(self.math.math_values(&values)?);
        Ok(Some(strings))
    }

    /// Reads rows until `stop` is set, handing each complete row to `on_row`.
    ///
    /// Incomplete rows are skipped. Returns the number of rows delivered
    pub fn run(
        &mut self,
        vehicle: &mut Vehicle<D>,
        stop: &AtomicBool,
        mut on_row: impl FnMut(Vec<String>),
    ) -> VpwResult<usize> {
        let mut rows = 0;
        while !stop.load(Ordering::Relaxed) {
            match self.get_next_row(vehicle)? {
                Some(row) => {
                    on_row(row);
                    rows += 1;
                }
                None => log::debug!("Dropped incomplete row"),
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hardware::{
            DeviceConfig,
            mock::{DEFAULT_OSID, MockDevice, MockPcm},
        },
        logging::{
            config_factory::LoggerConfigurationFactory,
            parameter::{Conversion, LogColumn, Parameter, StorageType},
        },
    };

    fn vehicle() -> Vehicle<MockDevice> {
        let mut pcm = MockPcm::new();
        pcm.set_pid(0x000C, 12000);
        pcm.set_pid(0x0005, 120);
        pcm.set_pid(0x0010, 500);
        let mut v = Vehicle::new(MockDevice::new(pcm, DeviceConfig::default()));
        assert!(v.initialize());
        v
    }

    fn columns() -> Vec<LogColumn> {
        let rpm = LogColumn::new(
            Parameter::pid("rpm", "Engine Speed", 0x000C, StorageType::UInt16),
            Conversion::new("RPM", "x*.25", "0").unwrap(),
        );
        let ect = LogColumn::new(
            Parameter::pid("ect", "Coolant", 0x0005, StorageType::UInt8),
            Conversion::new("C", "x-40", "0").unwrap(),
        );
        let maf = LogColumn::new(
            Parameter::pid("maf", "Airflow", 0x0010, StorageType::UInt16),
            Conversion::new("g/s", "x/100", "0.00").unwrap(),
        );
        let per_rev = LogColumn::new(
            Parameter::math("per_rev", "Airflow per Rev", maf.clone(), rpm.clone()),
            Conversion::new("g", "x/y", "0.000").unwrap(),
        );
        vec![rpm, ect, per_rev]
    }

    fn configuration(fast_logging: bool) -> LoggerConfiguration {
        LoggerConfigurationFactory::new(columns(), DEFAULT_OSID).create(fast_logging)
    }

    #[test]
    fn slow_logger_rows() {
        let mut v = vehicle();
        let mut logger = Logger::new(configuration(false));
        assert_eq!(
            logger.column_headers(),
            vec!["Engine Speed (RPM)", "Airflow (g/s)", "Coolant (C)", "Airflow per Rev (g)"]
        );
        assert!(logger.start_logging(&mut v, DEFAULT_OSID).unwrap());

        let row = logger.get_next_row(&mut v).unwrap().unwrap();
        assert_eq!(row, vec!["3000", "5.00", "80", "0.002"]);
        // Every row is requested again
        let requests_before = v.device().sent().len();
        assert!(logger.get_next_row(&mut v).unwrap().is_some());
        assert!(v.device().sent().len() > requests_before);
    }

    #[test]
    fn fast_logger_streams() {
        let mut v = vehicle();
        let mut logger = Logger::new(configuration(true));
        assert!(logger.start_logging(&mut v, DEFAULT_OSID).unwrap());
        let requests = v.device().sent().len();

        for _ in 0..3 {
            let row = logger.get_next_row(&mut v).unwrap().unwrap();
            assert_eq!(row[0], "3000");
        }
        // Rows keep arriving without further requests
        assert_eq!(v.device().sent().len(), requests);
    }

    #[test]
    fn run_stops_on_flag() {
        let mut v = vehicle();
        let mut logger = Logger::new(configuration(false));
        assert!(logger.start_logging(&mut v, DEFAULT_OSID).unwrap());

        let stop = AtomicBool::new(false);
        let mut received = Vec::new();
        let count = logger
            .run(&mut v, &stop, |row| {
                received.push(row);
                if received.len() == 3 {
                    stop.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(received.len(), 3);
    }

    #[test]
    fn ram_parameter_for_other_os() {
        let mut v = vehicle();
        let knock = vec![LogColumn::new(
            Parameter::ram("knock", "Knock", StorageType::UInt8, &[(12202088, 0xFF8A84)]),
            Conversion::new("raw", "x", "0").unwrap(),
        )];
        // Built for an OS that has the address, then started on one that does not
        let configuration = LoggerConfigurationFactory::new(knock, 12202088).create(false);
        let mut logger = Logger::new(configuration);
        assert!(logger.start_logging(&mut v, DEFAULT_OSID).is_err());
    }
}
