//! Builds a logger configuration from the columns a user picked

use super::{
    dpid_configuration::{DpidConfiguration, ParameterGroup},
    math_value::MathValueProcessor,
    parameter::{LogColumn, ParameterKind},
};

/// First DPID number used. Later groups count down from here
pub const FIRST_DPID: u8 = 0xFE;

/// Everything a logger needs to run
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoggerConfiguration {
    /// Columns read through DPIDs
    pub dpids: DpidConfiguration,
    /// Columns calculated from DPID columns
    pub math_columns: Vec<LogColumn>,
    /// Stream DPIDs instead of polling one row at a time
    pub fast_logging: bool,
}

impl LoggerConfiguration {
    /// Processor for the math columns
    pub fn math_processor(&self) -> MathValueProcessor {
        MathValueProcessor::new(self.math_columns.clone())
    }

    /// Headers of every column, DPID columns first
    pub fn column_headers(&self) -> Vec<String> {
        let mut headers = self.dpids.parameter_names();
        headers.extend(self.math_columns.iter().map(LogColumn::header));
        headers
    }
}

/// Packs columns into DPIDs for one operating system
#[derive(Debug, Clone)]
pub struct LoggerConfigurationFactory {
    columns: Vec<LogColumn>,
    osid: u32,
}

impl LoggerConfigurationFactory {
    /// Creates a factory for the PCM running `osid`
    pub fn new(columns: Vec<LogColumn>, osid: u32) -> Self {
        Self { columns, osid }
    }

    /// Builds the configuration.
    ///
    /// Columns the operating system cannot supply are dropped. Sources of math columns are
    /// logged even if not picked. Two byte values are packed first, then single bytes, so
    /// groups fill exactly; DPID numbers count down from [FIRST_DPID]. Columns that do not
    /// fit in [DpidConfiguration::MAX_GROUPS] groups are dropped with a warning
    pub fn create(&self, fast_logging: bool) -> LoggerConfiguration {
        let mut pcm_columns: Vec<LogColumn> = Vec::new();
        let mut math_columns = Vec::new();
        let add_pcm = |column: &LogColumn, list: &mut Vec<LogColumn>| {
            if !list.iter().any(|c| c.parameter.id == column.parameter.id) {
                list.push(column.clone());
            }
        };
        for column in &self.columns {
            if !column.parameter.is_supported(self.osid) {
                log::warn!("{} is not supported by OS {}", column.parameter.name, self.osid);
                continue;
            }
            match &column.parameter.kind {
                ParameterKind::Math { x, y } => {
                    add_pcm(x, &mut pcm_columns);
                    add_pcm(y, &mut pcm_columns);
                    math_columns.push(column.clone());
                }
                _ if column.parameter.is_pcm_parameter() => add_pcm(column, &mut pcm_columns),
                _ => log::debug!("{} is not read through a DPID", column.parameter.name),
            }
        }
        // Sources of math columns may themselves be non-PCM parameters
        pcm_columns.retain(|c| c.parameter.is_pcm_parameter());

        let (single, double): (Vec<_>, Vec<_>) = pcm_columns
            .into_iter()
            .partition(|c| c.parameter.byte_count() == 1);

        let mut dpids = DpidConfiguration::default();
        let mut dpid = FIRST_DPID;
        let mut group = ParameterGroup::new(dpid);
        for column in double.into_iter().chain(single) {
            if dpids.groups.len() == DpidConfiguration::MAX_GROUPS {
                log::warn!("Too many parameters, dropped {}", column.parameter.name);
                continue;
            }
            if !group.try_add_column(column.clone()) {
                log::warn!("{} does not fit in DPID {dpid:02X}", column.parameter.name);
                continue;
            }
            if group.total_bytes() == ParameterGroup::MAX_BYTES {
                dpids.try_add_group(group);
                dpid -= 1;
                group = ParameterGroup::new(dpid);
            }
        }
        if !group.columns.is_empty() {
            dpids.try_add_group(group);
        }

        // Math columns whose sources were dropped cannot be calculated
        let logged: Vec<String> = dpids.columns().map(|c| c.parameter.id.clone()).collect();
        math_columns.retain(|c: &LogColumn| match &c.parameter.kind {
            ParameterKind::Math { x, y } => {
                logged.contains(&x.parameter.id) && logged.contains(&y.parameter.id)
            }
            _ => false,
        });

        LoggerConfiguration {
            dpids,
            math_columns,
            fast_logging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::parameter::{Conversion, Parameter, StorageType};

    const OSID: u32 = 12593358;

    fn pid(id: &str, storage: StorageType) -> LogColumn {
        LogColumn::new(
            Parameter::pid(id, id, 0x1000, storage),
            Conversion::new("raw", "x", "0").unwrap(),
        )
    }

    #[test]
    fn two_byte_values_first() {
        let columns = vec![
            pid("a", StorageType::UInt8),
            pid("b", StorageType::UInt16),
            pid("c", StorageType::UInt8),
            pid("d", StorageType::Int16),
            pid("e", StorageType::UInt16),
            pid("f", StorageType::UInt8),
        ];
        let config = LoggerConfigurationFactory::new(columns, OSID).create(true);
        assert!(config.fast_logging);
        assert_eq!(config.dpids.dpids(), vec![0xFE, 0xFD]);
        let names: Vec<&str> = config.dpids.columns().map(|c| c.parameter.id.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "e", "a", "c", "f"]);
        assert_eq!(config.dpids.groups[0].total_bytes(), 6);
        assert_eq!(config.dpids.groups[1].total_bytes(), 3);
    }

    #[test]
    fn unsupported_and_overflowing_columns_dropped() {
        let mut columns = vec![LogColumn::new(
            Parameter::ram("ram", "ram", StorageType::UInt8, &[(1, 0xFF0000)]),
            Conversion::new("raw", "x", "0").unwrap(),
        )];
        columns.extend((0..10).map(|i| pid(&format!("p{i}"), StorageType::UInt16)));
        let config = LoggerConfigurationFactory::new(columns, OSID).create(false);
        assert_eq!(config.dpids.groups.len(), DpidConfiguration::MAX_GROUPS);
        assert_eq!(config.dpids.column_count(), 9);
        assert!(config.dpids.columns().all(|c| c.parameter.id != "ram"));
    }

    #[test]
    fn math_sources_are_logged() {
        let x = pid("x", StorageType::UInt16);
        let y = pid("y", StorageType::UInt8);
        let math = LogColumn::new(
            Parameter::math("m", "Ratio", x, y.clone()),
            Conversion::new("", "x/y", "0.0").unwrap(),
        );
        let config = LoggerConfigurationFactory::new(vec![y, math], OSID).create(false);
        assert_eq!(config.dpids.column_count(), 2);
        assert_eq!(config.math_columns.len(), 1);
        assert_eq!(config.column_headers(), vec!["x (raw)", "y (raw)", "Ratio ()"]);
    }
}
