//! Collects DPID payloads into a row and converts them to column values

use std::collections::{HashMap, HashSet};

use super::{dpid_configuration::DpidConfiguration, parameter::LogColumn};
use crate::{VpwResult, protocol::RawLogData};

/// One converted value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterValue {
    /// Display text
    pub value_as_string: String,
    /// Converted value
    pub value_as_double: f64,
    /// Value as extracted from the payload, before conversion
    pub raw_value: f64,
}

/// Values of one row, in column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterValues {
    values: Vec<(LogColumn, ParameterValue)>,
}

impl ParameterValues {
    /// Value of the column logging parameter `parameter_id`
    pub fn get(&self, parameter_id: &str) -> Option<&ParameterValue> {
        self.values
            .iter()
            .find(|(column, _)| column.parameter.id == parameter_id)
            .map(|(_, value)| value)
    }

    /// Columns and their values
    pub fn iter(&self) -> impl Iterator<Item = &(LogColumn, ParameterValue)> {
        self.values.iter()
    }

    /// Display text of every column
    pub fn strings(&self) -> Vec<String> {
        self.values.iter().map(|(_, v)| v.value_as_string.clone()).collect()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if there are no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accumulates the DPID payloads of one row.
///
/// A row is complete once every configured DPID has arrived at least once. Order does not
/// matter and repeats overwrite the earlier payload
#[derive(Debug)]
pub struct LogRowParser<'a> {
    configuration: &'a DpidConfiguration,
    response_data: HashMap<u8, Vec<u8>>,
    received: HashSet<u8>,
}

impl<'a> LogRowParser<'a> {
    /// Starts an empty row
    pub fn new(configuration: &'a DpidConfiguration) -> Self {
        Self {
            configuration,
            response_data: HashMap::new(),
            received: HashSet::new(),
        }
    }

    /// True once every configured DPID has been received
    pub fn is_complete(&self) -> bool {
        self.configuration
            .groups
            .iter()
            .all(|g| self.received.contains(&g.dpid))
    }

    /// Records one DPID payload
    pub fn parse_data(&mut self, data: RawLogData) {
        self.received.insert(data.dpid);
        self.response_data.insert(data.dpid, data.payload);
    }

    /// Converts the row. Columns whose DPID never arrived are empty
    pub fn evaluate(&self) -> VpwResult<ParameterValues> {
        let mut values = Vec::with_capacity(self.configuration.column_count());
        for group in &self.configuration.groups {
            let Some(payload) = self.response_data.get(&group.dpid) else {
                values.extend(group.columns.iter().map(|c| (c.clone(), ParameterValue::default())));
                continue;
            };
            let mut index = 0;
            for column in &group.columns {
                let raw = extract(payload, index, column);
                index += column.parameter.byte_count();
                let (value, text) = column.conversion.apply(
                    raw,
                    column.parameter.byte_count(),
                    &column.parameter.name,
                )?;
                values.push((
                    column.clone(),
                    ParameterValue {
                        value_as_string: text,
                        value_as_double: value,
                        raw_value: raw,
                    },
                ));
            }
        }
        Ok(ParameterValues { values })
    }
}

/// Reads a column's raw value at `index`. Zero when the payload is too short
fn extract(payload: &[u8], index: usize, column: &LogColumn) -> f64 {
    let signed = column.parameter.is_signed();
    match column.parameter.byte_count() {
        1 => match payload.get(index) {
            Some(&b) if signed => b as i8 as f64,
            Some(&b) => b as f64,
            None => 0.0,
        },
        2 => match payload.get(index..index + 2) {
            Some(&[hi, lo]) if signed => i16::from_be_bytes([hi, lo]) as f64,
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) as f64,
            _ => 0.0,
        },
        _ => 0.0,
    }
}
