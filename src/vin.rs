//! Vehicle identification number validation

use crate::{VpwError, VpwResult};

/// Number of characters in a VIN
pub const VIN_LENGTH: usize = 17;

const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// Index of the check digit
const CHECK_DIGIT_INDEX: usize = 8;

/// Checks that a VIN can be written to a PCM: exactly 17 characters, letters and digits only
pub fn validate(vin: &str) -> VpwResult<()> {
    if vin.chars().count() != VIN_LENGTH {
        return Err(VpwError::ParameterInvalid(format!(
            "The VIN must be {VIN_LENGTH} characters long. This is {}.",
            vin.chars().count()
        )));
    }
    if !vin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VpwError::ParameterInvalid(
            "The VIN must contain only letters and numbers.".into(),
        ));
    }
    Ok(())
}

/// Verifies the ISO 3779 / NHTSA check digit at position 9
pub fn is_checksum_ok(vin: &str) -> bool {
    if validate(vin).is_err() {
        return false;
    }
    let bytes = vin.as_bytes();
    let mut sum = 0;
    for (idx, b) in bytes.iter().enumerate() {
        match transliterate(b.to_ascii_uppercase()) {
            Some(v) => sum += v * WEIGHTS[idx],
            None => return false,
        }
    }
    let expected = match sum % 11 {
        10 => b'X',
        n => b'0' + n as u8,
    };
    bytes[CHECK_DIGIT_INDEX].to_ascii_uppercase() == expected
}

fn transliterate(c: u8) -> Option<u32> {
    let v = match c {
        b'0'..=b'9' => c - b'0',
        b'A' | b'J' => 1,
        b'B' | b'K' | b'S' => 2,
        b'C' | b'L' | b'T' => 3,
        b'D' | b'M' | b'U' => 4,
        b'E' | b'N' | b'V' => 5,
        b'F' | b'W' => 6,
        b'G' | b'P' | b'X' => 7,
        b'H' | b'Y' => 8,
        b'R' | b'Z' => 9,
        // I, O and Q never appear in a VIN
        _ => return None,
    };
    Some(v as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_good_check_digits() {
        assert!(is_checksum_ok("1M8GDM9AXKP042788"));
        assert!(is_checksum_ok("1GCEC14X5RZ123456"));
    }

    #[test]
    fn check_digit_follows_iso_3779() {
        // Weighted sum is 423 and 423 % 11 is 5, so a 3 in position 9 is wrong
        assert!(!is_checksum_ok("1GCEC14X3RZ123456"));
        assert!(is_checksum_ok("1GCEC14X5RZ123456"));
    }

    #[test]
    fn mutated_check_digit_fails() {
        for c in ['0', '1', '3', '9', 'X'] {
            let mut vin = String::from("1GCEC14X5RZ123456");
            vin.replace_range(8..9, &c.to_string());
            assert!(!is_checksum_ok(&vin), "{vin}");
        }
    }

    #[test]
    fn rejects_bad_shape() {
        assert!(validate("1GCEC14X5RZ12345").is_err());
        assert!(validate("1GCEC14X5RZ12345-").is_err());
        assert!(!is_checksum_ok("1GCEC14X5RZ12345 "));
        assert!(validate("1GCEC14X5RZ123456").is_ok());
    }

    #[test]
    fn letters_i_o_q_are_invalid() {
        assert!(!is_checksum_ok("1GCEC14X5RZ12345O"));
    }
}
