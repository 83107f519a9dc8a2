//! Columns calculated from two logged values, such as airflow per cylinder

use super::{
    parameter::{LogColumn, ParameterKind},
    row_parser::ParameterValues,
};
use crate::{VpwResult, utility::format_number};

/// Evaluates math columns against a converted row
#[derive(Debug, Clone, Default)]
pub struct MathValueProcessor {
    columns: Vec<LogColumn>,
}

impl MathValueProcessor {
    /// Keeps the columns whose parameter is a math parameter
    pub fn new(columns: Vec<LogColumn>) -> Self {
        let columns = columns
            .into_iter()
            .filter(|c| matches!(c.parameter.kind, ParameterKind::Math { .. }))
            .collect();
        Self { columns }
    }

    /// Math columns in output order
    pub fn columns(&self) -> &[LogColumn] {
        &self.columns
    }

    /// Column headers, `Name (units)`
    pub fn header_names(&self) -> Vec<String> {
        self.columns.iter().map(LogColumn::header).collect()
    }

    /// Display text for each math column.
    ///
    /// `x` and `y` are the raw values of the two source columns, each converted with the
    /// conversion the math parameter gives for it. A source missing from the row gives an
    /// empty cell
    pub fn math_values(&self, values: &ParameterValues) -> VpwResult<Vec<String>> {
        let mut result = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let ParameterKind::Math { x, y } = &column.parameter.kind else {
                continue;
            };
            let (Some(x_raw), Some(y_raw)) = (
                values.get(&x.parameter.id).map(|v| v.raw_value),
                values.get(&y.parameter.id).map(|v| v.raw_value),
            ) else {
                result.push(String::new());
                continue;
            };
            let (x_value, _) =
                x.conversion.apply(x_raw, x.parameter.byte_count(), &x.parameter.name)?;
            let (y_value, _) =
                y.conversion.apply(y_raw, y.parameter.byte_count(), &y.parameter.name)?;

            let conversion = &column.conversion;
            let value = conversion
                .evaluate(&[("x", x_value), ("y", y_value)], &column.parameter.name)?;
            result.push(format_number(value, conversion.display_format()));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logging::{
            dpid_configuration::{DpidConfiguration, ParameterGroup},
            parameter::{Conversion, Parameter, StorageType},
            row_parser::LogRowParser,
        },
        protocol::RawLogData,
    };

    fn maf() -> LogColumn {
        LogColumn::new(
            Parameter::pid("maf", "Mass Air Flow", 0x0010, StorageType::UInt16),
            Conversion::new("g/s", "x/100", "0.00").unwrap(),
        )
    }

    fn rpm() -> LogColumn {
        LogColumn::new(
            Parameter::pid("rpm", "Engine Speed", 0x000C, StorageType::UInt16),
            Conversion::new("RPM", "x*.25", "0").unwrap(),
        )
    }

    fn airflow_per_rev() -> LogColumn {
        LogColumn::new(
            Parameter::math("apr", "Airflow per Rev", maf(), rpm()),
            Conversion::new("g", "x*60/y", "0.000").unwrap(),
        )
    }

    #[test]
    fn calculates_from_row() {
        let mut group = ParameterGroup::new(0xFE);
        group.try_add_column(maf());
        group.try_add_column(rpm());
        let config = DpidConfiguration { groups: vec![group] };
        let mut row = LogRowParser::new(&config);
        // 12.00 g/s at 3000 rpm
        row.parse_data(RawLogData {
            dpid: 0xFE,
            payload: vec![0x04, 0xB0, 0x2E, 0xE0, 0, 0],
        });
        let values = row.evaluate().unwrap();

        let processor = MathValueProcessor::new(vec![maf(), airflow_per_rev()]);
        assert_eq!(processor.columns().len(), 1);
        assert_eq!(processor.header_names(), vec!["Airflow per Rev (g)"]);
        assert_eq!(processor.math_values(&values).unwrap(), vec!["0.240"]);
    }

    #[test]
    fn missing_source_gives_empty_cell() {
        let processor = MathValueProcessor::new(vec![airflow_per_rev()]);
        let values = ParameterValues::default();
        assert_eq!(processor.math_values(&values).unwrap(), vec![String::new()]);
    }
}
