//! Packing log columns into DPIDs

use std::fmt;

use super::parameter::LogColumn;

/// Columns sharing one DPID payload
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterGroup {
    /// DPID number
    pub dpid: u8,
    /// Columns in payload order
    pub columns: Vec<LogColumn>,
}

impl ParameterGroup {
    /// Bytes in one DPID payload
    pub const MAX_BYTES: usize = 6;

    /// Creates an empty group
    pub fn new(dpid: u8) -> Self {
        Self { dpid, columns: Vec::new() }
    }

    /// Payload bytes used so far
    pub fn total_bytes(&self) -> usize {
        self.columns.iter().map(|c| c.parameter.byte_count()).sum()
    }

    /// Adds `column` if it is read through a DPID and fits. The group is unchanged on failure
    pub fn try_add_column(&mut self, column: LogColumn) -> bool {
        if !column.parameter.is_pcm_parameter() {
            return false;
        }
        if self.total_bytes() + column.parameter.byte_count() > Self::MAX_BYTES {
            return false;
        }
        self.columns.push(column);
        true
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.dpid)?;
        for column in &self.columns {
            write!(f, ", {}", column.parameter.name)?;
        }
        Ok(())
    }
}

/// The DPIDs one log uses
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DpidConfiguration {
    /// Groups, one per DPID
    pub groups: Vec<ParameterGroup>,
}

impl DpidConfiguration {
    /// PCMs only stream this many DPIDs at once
    pub const MAX_GROUPS: usize = 3;

    /// Adds a group unless the configuration is full
    pub fn try_add_group(&mut self, group: ParameterGroup) -> bool {
        if self.groups.len() >= Self::MAX_GROUPS {
            return false;
        }
        self.groups.push(group);
        true
    }

    /// DPID numbers in group order
    pub fn dpids(&self) -> Vec<u8> {
        self.groups.iter().map(|g| g.dpid).collect()
    }

    /// All columns in group order
    pub fn columns(&self) -> impl Iterator<Item = &LogColumn> {
        self.groups.iter().flat_map(|g| g.columns.iter())
    }

    /// Column headers, `Name (units)`
    pub fn parameter_names(&self) -> Vec<String> {
        self.columns().map(LogColumn::header).collect()
    }

    /// Total number of columns
    pub fn column_count(&self) -> usize {
        self.groups.iter().map(|g| g.columns.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::parameter::{Conversion, Parameter, StorageType};

    fn column(name: &str, storage: StorageType) -> LogColumn {
        LogColumn::new(
            Parameter::pid(name, name, 0x1000, storage),
            Conversion::new("raw", "x", "0").unwrap(),
        )
    }

    #[test]
    fn group_capacity() {
        let mut group = ParameterGroup::new(0xFE);
        assert!(group.try_add_column(column("a", StorageType::UInt16)));
        assert!(group.try_add_column(column("b", StorageType::Int16)));
        assert!(group.try_add_column(column("c", StorageType::UInt8)));
        assert_eq!(group.total_bytes(), 5);
        assert!(!group.try_add_column(column("d", StorageType::UInt16)));
        assert_eq!(group.columns.len(), 3);
        assert!(group.try_add_column(column("e", StorageType::Int8)));
        assert_eq!(group.total_bytes(), ParameterGroup::MAX_BYTES);
        assert_eq!(group.to_string(), "0xFE, a, b, c, e");
    }

    #[test]
    fn group_rejects_non_pcm_columns() {
        let x = column("x", StorageType::UInt8);
        let math = LogColumn::new(
            Parameter::math("m", "m", x.clone(), x),
            Conversion::new("", "x+y", "").unwrap(),
        );
        assert!(!ParameterGroup::new(0xFE).try_add_column(math));
    }

    #[test]
    fn configuration_capacity() {
        let mut config = DpidConfiguration::default();
        for dpid in [0xFE, 0xFD, 0xFC] {
            let mut group = ParameterGroup::new(dpid);
            group.try_add_column(column("p", StorageType::UInt8));
            assert!(config.try_add_group(group));
        }
        assert!(!config.try_add_group(ParameterGroup::new(0xFB)));
        assert_eq!(config.dpids(), vec![0xFE, 0xFD, 0xFC]);
        assert_eq!(config.column_count(), 3);
        assert_eq!(config.parameter_names()[0], "p (raw)");
    }
}
