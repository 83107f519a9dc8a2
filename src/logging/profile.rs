//! Saved parameter selections, and the parameter list they are resolved against

use super::parameter::{LogColumn, Parameter};
use crate::{VpwError, VpwResult};

/// One column of a saved profile
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileColumn {
    /// [Parameter::id]
    pub parameter_id: String,
    /// Units of the chosen conversion
    pub units: String,
}

/// A saved set of columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogProfile {
    /// Columns in display order
    pub columns: Vec<ProfileColumn>,
}

impl LogProfile {
    /// Adds a column
    pub fn add_column(&mut self, parameter_id: &str, units: &str) {
        self.columns.push(ProfileColumn {
            parameter_id: parameter_id.to_string(),
            units: units.to_string(),
        });
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Looks every column up in `database`
    pub fn resolve(&self, database: &ParameterDatabase) -> VpwResult<Vec<LogColumn>> {
        self.columns
            .iter()
            .map(|column| {
                let parameter = database.find(&column.parameter_id).ok_or_else(|| {
                    VpwError::ParameterInvalid(format!("Unknown parameter {}", column.parameter_id))
                })?;
                LogColumn::for_units(parameter.clone(), &column.units)
            })
            .collect()
    }
}

/// The parameters that can be logged.
///
/// Loading definitions from disk is left to the caller. With the `serde` feature the
/// database deserializes from any format serde supports
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterDatabase {
    /// Known parameters
    pub parameters: Vec<Parameter>,
}

impl ParameterDatabase {
    /// Creates a database
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    /// Parameter with the given ID
    pub fn find(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Parameters the operating system supports
    pub fn supported(&self, osid: u32) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.is_supported(osid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::parameter::{Conversion, StorageType};

    fn database() -> ParameterDatabase {
        ParameterDatabase::new(vec![
            Parameter::pid("rpm", "Engine Speed", 0x000C, StorageType::UInt16)
                .with_conversion(Conversion::new("RPM", "x*.25", "0").unwrap()),
            Parameter::ram("knock", "Knock Retard", StorageType::UInt8, &[(12593358, 0xFF8A84)])
                .with_conversion(Conversion::new("deg", "x*22.5/256", "0.0").unwrap()),
        ])
    }

    #[test]
    fn resolves_columns() {
        let mut profile = LogProfile::default();
        profile.add_column("rpm", "RPM");
        profile.add_column("knock", "deg");
        let columns = profile.resolve(&database()).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].header(), "Knock Retard (deg)");
    }

    #[test]
    fn unknown_parameter_or_units() {
        let mut profile = LogProfile::default();
        profile.add_column("maf", "g/s");
        assert!(profile.resolve(&database()).is_err());

        let mut profile = LogProfile::default();
        profile.add_column("rpm", "Hz");
        assert!(profile.resolve(&database()).is_err());
    }

    #[test]
    fn supported_by_osid() {
        let db = database();
        assert_eq!(db.supported(12593358).count(), 2);
        assert_eq!(db.supported(1).count(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn profile_json_document() {
        let json = r#"{"columns":[{"parameter_id":"rpm","units":"RPM"}]}"#;
        let profile: LogProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.column_count(), 1);
        assert_eq!(serde_json::to_string(&profile).unwrap(), json);

        let db: ParameterDatabase =
            serde_json::from_str(&serde_json::to_string(&database()).unwrap()).unwrap();
        assert_eq!(db, database());
    }
}
