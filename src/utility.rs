//! Helper functions shared by the protocol, device and logging layers

use std::fmt::Write;

const HEX: [u8; 16] = *b"0123456789ABCDEF";

/// Formats bytes as uppercase hex separated by spaces, EG: `6C 10 F0`
pub fn to_hex(bytes: &[u8]) -> String {
    let mut res = String::with_capacity(bytes.len() * 3);
    for (pos, b) in bytes.iter().enumerate() {
        if pos != 0 {
            res.push(' ');
        }
        res.push(HEX[(*b >> 4) as usize] as char);
        res.push(HEX[(*b & 0x0F) as usize] as char);
    }
    res
}

/// Formats bytes as uppercase hex with no separators, EG: `6C10F0`
pub fn to_hex_compact(bytes: &[u8]) -> String {
    let mut res = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(res, "{b:02X}");
    }
    res
}

/// Keeps only the bytes that form readable identifiers (`'0'..='~'`)
pub fn get_printable(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| (0x30..=0x7E).contains(b))
        .collect()
}

/// Returns true if `actual` begins with every byte of `expected`
pub fn compare_arrays_part(actual: &[u8], expected: &[u8]) -> bool {
    actual.len() >= expected.len() && actual[..expected.len()] == *expected
}

/// Converts a single ASCII hex digit to its value
pub fn hex_to_byte(hex: u8) -> Option<u8> {
    match hex {
        b'0'..=b'9' => Some(hex - b'0'),
        b'a'..=b'f' => Some(hex - b'a' + 10),
        b'A'..=b'F' => Some(hex - b'A' + 10),
        _ => None,
    }
}

/// Decodes a hex string. Whitespace between digit pairs is ignored.
///
/// Returns `None` if a non hex character is found or the digit count is odd
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| Some(hex_to_byte(pair[0])? << 4 | hex_to_byte(pair[1])?))
        .collect()
}

/// Formats a number using a .NET style custom format string such as `0.00`, `0` or `X4`.
///
/// Only the forms that appear in parameter definitions are handled: hexadecimal (`X` + width)
/// and fixed point with the number of decimals given by the digits after the `.`
pub fn format_number(value: f64, format: &str) -> String {
    let format = format.trim();
    if let Some(width) = format.strip_prefix('X').or_else(|| format.strip_prefix('x')) {
        let width: usize = width.parse().unwrap_or(0);
        let as_int = value as i64;
        return if format.starts_with('X') {
            format!("{as_int:0width$X}")
        } else {
            format!("{as_int:0width$x}")
        };
    }
    let decimals = match format.split_once('.') {
        Some((_, fraction)) => fraction.chars().filter(|c| *c == '0' || *c == '#').count(),
        None => 0,
    };
    format!("{value:.decimals$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(to_hex(&[0x01, 0xFF]), "01 FF");
        assert_eq!(to_hex(&[]), "");
        assert_eq!(to_hex_compact(&[0x3C, 0x01]), "3C01");
    }

    #[test]
    fn printable_filter() {
        assert_eq!(get_printable(&[0x00, b'1', b'A', 0x7F, b'~', 0x20]), b"1A~".to_vec());
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("6C F0 10 7C"), Some(vec![0x6C, 0xF0, 0x10, 0x7C]));
        assert_eq!(parse_hex("6cf0"), Some(vec![0x6C, 0xF0]));
        assert_eq!(parse_hex("6C F"), None);
        assert_eq!(parse_hex("NO DATA"), None);
    }

    #[test]
    fn number_formats() {
        assert_eq!(format_number(6.0, "0.00"), "6.00");
        assert_eq!(format_number(12.345, "0.0"), "12.3");
        assert_eq!(format_number(12.6, "0"), "13");
        assert_eq!(format_number(255.0, "X2"), "FF");
        assert_eq!(format_number(10.0, "X4"), "000A");
    }

    #[test]
    fn partial_compare() {
        assert!(compare_arrays_part(&[0x5B, 0xF0, 0x00], &[0x5B, 0xF0]));
        assert!(!compare_arrays_part(&[0x5B], &[0x5B, 0xF0]));
    }
}
