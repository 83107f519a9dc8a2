//! Loggable parameters and the conversions that turn their raw values into readable ones

use std::collections::HashMap;
use std::fmt;

use strum_macros::{Display, EnumIter, EnumString};

use super::expression::{Expression, ExpressionError};
use crate::{VpwError, VpwResult, framing::can::CanMessage, utility::format_number};

/// Format used when a conversion does not give one
pub const DEFAULT_FORMAT: &str = "0.00";

/// Expression that shows the raw value as hex
pub const HEX_EXPRESSION: &str = "0x";

/// How a PCM stores a value
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StorageType {
    /// Unsigned byte
    UInt8,
    /// Signed byte
    Int8,
    /// Unsigned big endian word
    UInt16,
    /// Signed big endian word
    Int16,
}

impl StorageType {
    /// Size on the wire
    pub fn byte_count(&self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
        }
    }

    /// True for the signed types
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16)
    }
}

/// Converts a raw value into engineering units, or a bit into one of two labels
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "ConversionFields", into = "ConversionFields")
)]
pub struct Conversion {
    /// Units of the converted value
    pub units: String,
    /// Number format such as `0.00`
    pub format: String,
    /// Value is a single bit shown as a label
    pub is_bit_mapped: bool,
    /// Bit tested when bit mapped
    pub bit_index: u8,
    /// Label when the bit is set
    pub true_value: String,
    /// Label when the bit is clear
    pub false_value: String,
    expression: String,
    compiled: Option<Expression>,
}

impl Conversion {
    /// Creates an expression conversion.
    ///
    /// `>> n` is rewritten as a division by 2^n, so `x >> 3` is stored as `x /8`. The
    /// division binds tighter than the shift it replaces. The expression is parsed here, so a
    /// malformed one is rejected before any value is converted
    pub fn new(units: &str, expression: &str, format: &str) -> VpwResult<Self> {
        let expression = sanitize_expression(expression)?;
        let compiled = compile(&expression)?;
        Ok(Self {
            units: units.to_string(),
            format: format.to_string(),
            expression,
            compiled,
            ..Default::default()
        })
    }

    /// Creates a conversion that tests one bit
    pub fn bit_mapped(units: &str, bit_index: u8, true_value: &str, false_value: &str) -> Self {
        Self {
            units: units.to_string(),
            expression: "x".to_string(),
            is_bit_mapped: true,
            bit_index,
            true_value: true_value.to_string(),
            false_value: false_value.to_string(),
            ..Default::default()
        }
    }

    /// Expression over `x`, or [HEX_EXPRESSION]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Converts a raw value. Returns the value and its display text.
    ///
    /// `byte_count` sets the hex width for [HEX_EXPRESSION] and bounds the bit a bit mapped
    /// conversion may test. A bit outside the value is an error. `x_high` and `x_low` are
    /// bound to the top and bottom bytes of a 16 bit raw value. Failures carry `parameter` for
    /// context
    pub fn apply(&self, raw: f64, byte_count: usize, parameter: &str) -> VpwResult<(f64, String)> {
        if self.expression == HEX_EXPRESSION {
            let format = if byte_count == 1 { "X2" } else { "X4" };
            // Negative values print as their unsigned bit pattern
            let bits = if byte_count == 1 { raw as i64 & 0xFF } else { raw as i64 & 0xFFFF };
            return Ok((raw, format_number(bits as f64, format)));
        }
        if self.is_bit_mapped {
            let bit = self.bit_index as u32;
            // Zero means the width is unknown, as for CAN values
            let width = if byte_count == 0 { i64::BITS } else { byte_count as u32 * 8 };
            let shifted = (bit < width)
                .then(|| (raw as i64).checked_shr(bit))
                .flatten()
                .ok_or_else(|| VpwError::Evaluation {
                    expression: format!("bit {}", self.bit_index),
                    parameter: parameter.to_string(),
                    source: ExpressionError::InvalidShift(self.bit_index as i64),
                })?;
            let label = if shifted & 1 != 0 { &self.true_value } else { &self.false_value };
            return Ok((raw, label.clone()));
        }
        let as_int = raw as i64;
        let variables = [
            ("x", raw),
            ("x_high", ((as_int >> 8) & 0xFF) as f64),
            ("x_low", (as_int & 0xFF) as f64),
        ];
        let value = self.evaluate(&variables, parameter)?;
        Ok((value, format_number(value, self.display_format())))
    }

    /// Evaluates the expression with `variables` bound
    pub(crate) fn evaluate(&self, variables: &[(&str, f64)], parameter: &str) -> VpwResult<f64> {
        let result = match &self.compiled {
            Some(expression) => expression.evaluate(variables),
            None => Expression::parse(&self.expression).and_then(|e| e.evaluate(variables)),
        };
        result.map_err(|source| VpwError::Evaluation {
            expression: self.expression.clone(),
            parameter: parameter.to_string(),
            source,
        })
    }

    /// Number format, [DEFAULT_FORMAT] when none was given
    pub(crate) fn display_format(&self) -> &str {
        match self.format.trim() {
            "" => DEFAULT_FORMAT,
            f => f,
        }
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.units, self.expression)
    }
}

/// Parses everything but [HEX_EXPRESSION], which is not evaluated
fn compile(expression: &str) -> Result<Option<Expression>, ExpressionError> {
    if expression == HEX_EXPRESSION {
        return Ok(None);
    }
    Expression::parse(expression).map(Some)
}

/// Serialized form of a [Conversion]. The parsed expression is rebuilt on load
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct ConversionFields {
    units: String,
    expression: String,
    format: String,
    is_bit_mapped: bool,
    bit_index: u8,
    true_value: String,
    false_value: String,
}

#[cfg(feature = "serde")]
impl TryFrom<ConversionFields> for Conversion {
    type Error = VpwError;

    fn try_from(fields: ConversionFields) -> VpwResult<Self> {
        let compiled = compile(&fields.expression)?;
        Ok(Self {
            units: fields.units,
            format: fields.format,
            is_bit_mapped: fields.is_bit_mapped,
            bit_index: fields.bit_index,
            true_value: fields.true_value,
            false_value: fields.false_value,
            expression: fields.expression,
            compiled,
        })
    }
}

#[cfg(feature = "serde")]
impl From<Conversion> for ConversionFields {
    fn from(conversion: Conversion) -> Self {
        Self {
            units: conversion.units,
            expression: conversion.expression,
            format: conversion.format,
            is_bit_mapped: conversion.is_bit_mapped,
            bit_index: conversion.bit_index,
            true_value: conversion.true_value,
            false_value: conversion.false_value,
        }
    }
}

/// Rewrites each `>> n` as `/2^n`
fn sanitize_expression(expression: &str) -> Result<String, ExpressionError> {
    let mut result = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(idx) = rest.find(">>") {
        result.push_str(&rest[..idx]);
        let after = rest[idx + 2..].trim_start();
        let digits = after.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(ExpressionError::UnexpectedToken(">>".into()));
        }
        let shift: i64 = after[..digits]
            .parse()
            .map_err(|_| ExpressionError::InvalidNumber(after[..digits].to_string()))?;
        if !(0..=15).contains(&shift) {
            return Err(ExpressionError::InvalidShift(shift));
        }
        result.push_str(&format!("/{}", 1u32 << shift));
        rest = &after[digits..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Where a parameter's value comes from
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterKind {
    /// Standard or GM PID, read by number
    Pid {
        /// PID number
        pid: u32,
        /// Storage of the value
        storage: StorageType,
        /// Operating systems known to support the PID. Empty means all
        osids: Vec<u32>,
    },
    /// Value read from a RAM address, which moves between operating systems
    Ram {
        /// Storage of the value
        storage: StorageType,
        /// Address per operating system ID
        addresses: HashMap<u32, u32>,
    },
    /// Value calculated from two other columns
    Math {
        /// Column bound to `x`
        x: Box<LogColumn>,
        /// Column bound to `y`
        y: Box<LogColumn>,
    },
    /// Value taken from a frame on an auxiliary CAN bus
    Can {
        /// CAN identifier
        message_id: u32,
        /// First payload byte
        byte_index: usize,
        /// Number of payload bytes, 1 to 4
        byte_count: usize,
        /// Byte order
        high_byte_first: bool,
    },
}

/// A loggable value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    /// Unique ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Longer description
    pub description: String,
    /// Available conversions
    pub conversions: Vec<Conversion>,
    /// Source
    pub kind: ParameterKind,
}

impl Parameter {
    /// Creates a parameter with no description or conversions
    pub fn new(id: &str, name: &str, kind: ParameterKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            conversions: Vec::new(),
            kind,
        }
    }

    /// PID parameter supported by every operating system
    pub fn pid(id: &str, name: &str, pid: u32, storage: StorageType) -> Self {
        Self::new(id, name, ParameterKind::Pid { pid, storage, osids: Vec::new() })
    }

    /// RAM parameter at `addresses` (operating system ID, address)
    pub fn ram(id: &str, name: &str, storage: StorageType, addresses: &[(u32, u32)]) -> Self {
        Self::new(
            id,
            name,
            ParameterKind::Ram {
                storage,
                addresses: addresses.iter().copied().collect(),
            },
        )
    }

    /// Math parameter over two columns
    pub fn math(id: &str, name: &str, x: LogColumn, y: LogColumn) -> Self {
        Self::new(id, name, ParameterKind::Math { x: Box::new(x), y: Box::new(y) })
    }

    /// Adds a conversion
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversions.push(conversion);
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Conversion with the given units
    pub fn get_conversion(&self, units: &str) -> Option<&Conversion> {
        self.conversions.iter().find(|c| c.units == units)
    }

    /// True if the parameter can be logged on this operating system
    pub fn is_supported(&self, osid: u32) -> bool {
        match &self.kind {
            ParameterKind::Pid { osids, .. } => osids.is_empty() || osids.contains(&osid),
            ParameterKind::Ram { addresses, .. } => addresses.contains_key(&osid),
            ParameterKind::Math { x, y } => {
                x.parameter.is_supported(osid) && y.parameter.is_supported(osid)
            }
            ParameterKind::Can { .. } => true,
        }
    }

    /// Storage of PID and RAM parameters
    pub fn storage(&self) -> Option<StorageType> {
        match &self.kind {
            ParameterKind::Pid { storage, .. } | ParameterKind::Ram { storage, .. } => {
                Some(*storage)
            }
            _ => None,
        }
    }

    /// True for parameters read from the PCM through a DPID
    pub fn is_pcm_parameter(&self) -> bool {
        self.storage().is_some()
    }

    /// Bytes the value takes in a DPID payload. Zero for parameters not read through DPIDs
    pub fn byte_count(&self) -> usize {
        self.storage().map(|s| s.byte_count()).unwrap_or(0)
    }

    /// True if the raw value is signed
    pub fn is_signed(&self) -> bool {
        self.storage().map(|s| s.is_signed()).unwrap_or(false)
    }

    /// RAM address on this operating system
    pub fn ram_address(&self, osid: u32) -> Option<u32> {
        match &self.kind {
            ParameterKind::Ram { addresses, .. } => addresses.get(&osid).copied(),
            _ => None,
        }
    }

    /// Extracts the raw value from a CAN frame, if this parameter is carried by it
    pub fn can_value(&self, message: &CanMessage) -> Option<u32> {
        let ParameterKind::Can {
            message_id,
            byte_index,
            byte_count,
            high_byte_first,
        } = &self.kind
        else {
            return None;
        };
        if message.id != *message_id || !(1..=4).contains(byte_count) {
            return None;
        }
        let bytes = message.payload.get(*byte_index..*byte_index + *byte_count)?;
        let fold = |acc: u32, b: &u8| (acc << 8) | *b as u32;
        Some(if *high_byte_first {
            bytes.iter().fold(0, fold)
        } else {
            bytes.iter().rev().fold(0, fold)
        })
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A parameter paired with the conversion chosen for one log
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogColumn {
    /// What is logged
    pub parameter: Parameter,
    /// How it is shown
    pub conversion: Conversion,
}

impl LogColumn {
    /// Creates a column
    pub fn new(parameter: Parameter, conversion: Conversion) -> Self {
        Self { parameter, conversion }
    }

    /// Creates a column using the parameter's conversion for `units`
    pub fn for_units(parameter: Parameter, units: &str) -> VpwResult<Self> {
        let conversion = parameter.get_conversion(units).cloned().ok_or_else(|| {
            VpwError::ParameterInvalid(format!("{} has no conversion to {units}", parameter.name))
        })?;
        Ok(Self::new(parameter, conversion))
    }

    /// Column header, `Name (units)`
    pub fn header(&self) -> String {
        format!("{} ({})", self.parameter.name, self.conversion.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpm() -> Parameter {
        Parameter::pid("rpm", "Engine Speed", 0x000C, StorageType::UInt16)
            .with_conversion(Conversion::new("RPM", "x*.25", "0").unwrap())
    }

    #[test]
    fn shift_rewritten_as_division() {
        let c = Conversion::new("kPa", "x >> 3", "0.0").unwrap();
        assert_eq!(c.expression(), "x /8");
        let c = Conversion::new("v", "(x>>4)+(x>>0)", "").unwrap();
        assert_eq!(c.expression(), "(x/16)+(x/1)");
        assert!(Conversion::new("v", "x >> 16", "").is_err());
        assert!(Conversion::new("v", "x >> y", "").is_err());
    }

    #[test]
    fn expression_conversion() {
        let col = LogColumn::for_units(rpm(), "RPM").unwrap();
        assert_eq!(col.header(), "Engine Speed (RPM)");
        let (value, text) = col.conversion.apply(3000.0, 2, "Engine Speed").unwrap();
        assert_eq!(value, 750.0);
        assert_eq!(text, "750");
        assert!(LogColumn::for_units(rpm(), "Hz").is_err());
    }

    #[test]
    fn default_format() {
        let c = Conversion::new("C", "x-40", "").unwrap();
        assert_eq!(c.apply(100.0, 1, "ECT").unwrap().1, "60.00");
    }

    #[test]
    fn hex_and_bits() {
        let hex = Conversion::new("hex", HEX_EXPRESSION, "").unwrap();
        assert_eq!(hex.apply(10.0, 1, "p").unwrap().1, "0A");
        assert_eq!(hex.apply(10.0, 2, "p").unwrap().1, "000A");

        let bit = Conversion::bit_mapped("", 2, "On", "Off");
        assert_eq!(bit.apply(0b0100 as f64, 1, "p").unwrap().1, "On");
        assert_eq!(bit.apply(0b1011 as f64, 1, "p").unwrap().1, "Off");
    }

    #[test]
    fn bit_outside_value_is_an_error() {
        let flag = Conversion::bit_mapped("", 64, "on", "off");
        match flag.apply(1.0, 1, "flag") {
            Err(VpwError::Evaluation { parameter, source, .. }) => {
                assert_eq!(parameter, "flag");
                assert_eq!(source, ExpressionError::InvalidShift(64));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Conversion::bit_mapped("", 8, "on", "off").apply(1.0, 1, "p").is_err());
        let high = Conversion::bit_mapped("", 15, "on", "off");
        assert_eq!(high.apply(0x8000 as f64, 2, "p").unwrap().1, "on");
        assert!(Conversion::bit_mapped("", 64, "on", "off").apply(1.0, 0, "p").is_err());
    }

    #[test]
    fn expression_parsed_on_creation() {
        assert!(matches!(
            Conversion::new("v", "x+", ""),
            Err(VpwError::Expression(ExpressionError::UnexpectedEnd))
        ));
        let c = Conversion::new("v", "x*2", "0").unwrap();
        assert!(c.compiled.is_some());
        for raw in 0..4 {
            assert_eq!(c.apply(raw as f64, 1, "p").unwrap().0, raw as f64 * 2.0);
        }
        assert!(Conversion::new("hex", HEX_EXPRESSION, "").unwrap().compiled.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn conversion_json_document() {
        let c = Conversion::new("kPa", "x >> 3", "0.0").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let loaded: Conversion = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, c);
        assert!(loaded.compiled.is_some());

        let broken = json.replace("x /8", "x /");
        assert!(serde_json::from_str::<Conversion>(&broken).is_err());
    }

    #[test]
    fn evaluation_error_names_parameter() {
        let c = Conversion::new("?", "x/0", "").unwrap();
        match c.apply(1.0, 1, "Broken") {
            Err(VpwError::Evaluation { expression, parameter, .. }) => {
                assert_eq!(expression, "x/0");
                assert_eq!(parameter, "Broken");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn support_by_osid() {
        assert!(rpm().is_supported(1));
        let ram = Parameter::ram(
            "knock",
            "Knock Retard",
            StorageType::UInt8,
            &[(12593358, 0xFF8A84)],
        );
        assert!(ram.is_supported(12593358));
        assert!(!ram.is_supported(1));
        assert_eq!(ram.ram_address(12593358), Some(0xFF8A84));
        assert_eq!(ram.byte_count(), 1);

        let x = LogColumn::new(rpm(), Conversion::new("RPM", "x", "").unwrap());
        let y = LogColumn::new(ram.clone(), Conversion::new("deg", "x", "").unwrap());
        let math = Parameter::math("m", "Math", x, y);
        assert!(math.is_supported(12593358));
        assert!(!math.is_supported(1));
        assert!(!math.is_pcm_parameter());
        assert_eq!(math.byte_count(), 0);
    }

    #[test]
    fn can_extraction() {
        let p = Parameter::new(
            "afr",
            "Wideband",
            ParameterKind::Can {
                message_id: 0x180,
                byte_index: 1,
                byte_count: 2,
                high_byte_first: true,
            },
        );
        let msg = CanMessage {
            id: 0x180,
            payload: vec![0x00, 0x12, 0x34, 0x56],
            is_remote: false,
        };
        assert_eq!(p.can_value(&msg), Some(0x1234));
        let other = CanMessage { id: 0x181, ..msg.clone() };
        assert_eq!(p.can_value(&other), None);
        let short = CanMessage { payload: vec![0x00, 0x12], ..msg };
        assert_eq!(p.can_value(&short), None);
    }
}
