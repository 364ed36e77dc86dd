//! IEEE 754 to IBM System/360 floating-point conversion.
//!
//! XPT stores numerics as 8-byte IBM hexadecimal floats: a sign bit, a
//! 7-bit base-16 exponent biased by 64, and a 56-bit fraction in [1/16, 1).
//! Missing values are encoded as a sentinel first byte with a zero fraction:
//! `.` is 0x2E, `._` is 0x5F, and `.A` through `.Z` use the ASCII letter.

use crate::types::MissingValue;

/// Convert an IEEE 754 double to its 8-byte IBM representation.
///
/// Values outside the IBM range saturate; zero encodes as all zeros.
pub fn ieee_to_ibm(value: f64) -> [u8; 8] {
    if value == 0.0 || !value.is_finite() {
        return [0u8; 8];
    }

    let sign: u8 = if value.is_sign_negative() { 0x80 } else { 0 };
    let bits = value.abs().to_bits();
    let exp2 = ((bits >> 52) & 0x7ff) as i32 - 1023;
    // Subnormals are far below the IBM range; treat as zero.
    if exp2 == -1023 {
        return [0u8; 8];
    }
    let frac53 = (bits & 0x000f_ffff_ffff_ffff) | 0x0010_0000_0000_0000;

    // Rebase 2^exp2 onto 16^exp16 with the fraction in [1/16, 1).
    let exp16 = (exp2 >> 2) + 1;
    let shift = 4 * exp16 - exp2; // 1..=4
    let fraction56 = frac53 << (4 - shift);

    let biased = exp16 + 64;
    if biased > 127 {
        // Saturate to the largest representable magnitude.
        let mut out = [0xffu8; 8];
        out[0] = sign | 0x7f;
        return out;
    }
    if biased < 0 {
        return [0u8; 8];
    }

    let mut out = [0u8; 8];
    out[0] = sign | biased as u8;
    out[1..8].copy_from_slice(&fraction56.to_be_bytes()[1..8]);
    out
}

/// Convert an 8-byte IBM float back to an IEEE 754 double.
///
/// Missing-value sentinels must be screened with [`is_missing`] first; this
/// function treats a zero fraction as 0.0.
pub fn ibm_to_ieee(bytes: [u8; 8]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exp16 = i32::from(bytes[0] & 0x7f) - 64;

    let mut frac_bytes = [0u8; 8];
    frac_bytes[1..8].copy_from_slice(&bytes[1..8]);
    let fraction56 = u64::from_be_bytes(frac_bytes);
    if fraction56 == 0 {
        return 0.0;
    }

    let magnitude = (fraction56 as f64) * 2f64.powi(-56) * 16f64.powi(exp16);
    if negative { -magnitude } else { magnitude }
}

/// Encode a missing value as its 8-byte sentinel.
pub fn encode_missing(missing: MissingValue) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0] = match missing {
        MissingValue::Standard => 0x2e,
        MissingValue::Underscore => 0x5f,
        MissingValue::Special(letter) => letter.to_ascii_uppercase() as u8,
    };
    out
}

/// Identify a missing-value sentinel, if `bytes` holds one.
pub fn is_missing(bytes: &[u8]) -> Option<MissingValue> {
    if bytes.is_empty() || bytes[1..].iter().any(|&b| b != 0) {
        return None;
    }
    match bytes[0] {
        0x2e => Some(MissingValue::Standard),
        0x5f => Some(MissingValue::Underscore),
        b @ b'A'..=b'Z' => Some(MissingValue::Special(b as char)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_encodes_to_known_bytes() {
        assert_eq!(ieee_to_ibm(1.0), [0x41, 0x10, 0, 0, 0, 0, 0, 0]);
        assert!((ibm_to_ieee([0x41, 0x10, 0, 0, 0, 0, 0, 0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_and_sign() {
        assert_eq!(ieee_to_ibm(0.0), [0u8; 8]);
        assert_eq!(ibm_to_ieee([0u8; 8]), 0.0);
        let neg = ieee_to_ibm(-2.5);
        assert_eq!(neg[0] & 0x80, 0x80);
        assert!((ibm_to_ieee(neg) + 2.5).abs() < 1e-12);
    }

    #[test]
    fn missing_sentinels_round_trip() {
        for missing in [
            MissingValue::Standard,
            MissingValue::Underscore,
            MissingValue::Special('A'),
            MissingValue::Special('Z'),
        ] {
            let bytes = encode_missing(missing);
            assert_eq!(is_missing(&bytes), Some(missing));
        }
        // A real value is not mistaken for a sentinel.
        assert_eq!(is_missing(&ieee_to_ibm(1.0)), None);
    }

    #[test]
    fn integers_convert_exactly() {
        for v in [1.0, 2.0, 16.0, 255.0, 1024.0, 123_456.0, -42.0] {
            assert_eq!(ibm_to_ieee(ieee_to_ibm(v)), v);
        }
    }

    proptest! {
        #[test]
        fn round_trip_is_close(v in -1.0e15f64..1.0e15f64) {
            let back = ibm_to_ieee(ieee_to_ibm(v));
            let tolerance = v.abs().max(1.0) * 1e-13;
            prop_assert!((back - v).abs() <= tolerance, "{v} -> {back}");
        }

        #[test]
        fn small_integers_are_exact(v in -1_000_000i64..1_000_000i64) {
            let v = v as f64;
            prop_assert_eq!(ibm_to_ieee(ieee_to_ibm(v)), v);
        }
    }
}
