//! Numeric parsing with exact down-casting.
//!
//! `parse_numeric` classifies a string in a single pass, then produces the
//! smallest representation that holds the value exactly: integers down-cast
//! to the narrowest fitting width, decimals collapse to integers or doubles
//! only when the round trip is lossless.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use num_bigint::BigInt;

use crate::value::Numeric;

/// Parse a numeric string. Returns `None` for anything that is not a plain
/// integer, decimal, or exponential number (ill-placed signs, double dots,
/// stray characters).
pub fn parse_numeric(input: &str) -> Option<Numeric> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    let mut is_decimal = false;
    let mut has_exponent = false;
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'.' => {
                if is_decimal {
                    return None;
                }
                is_decimal = true;
            }
            b'e' | b'E' => {
                has_exponent = true;
                break;
            }
            b'+' | b'-' => {
                if i != 0 && bytes[i - 1] != b'e' && bytes[i - 1] != b'E' {
                    return None;
                }
            }
            b'0'..=b'9' => {}
            _ => return None,
        }
    }

    if !is_decimal && !has_exponent {
        if let Ok(v) = s.parse::<i64>() {
            return Some(downcast_long(v));
        }
        // Too wide for i64; keep exact.
        return BigInt::from_str(s).ok().map(Numeric::BigInt);
    }

    let dec = BigDecimal::from_str(s).ok()?;
    if dec.is_integer() {
        let (int, _) = dec.with_scale(0).as_bigint_and_exponent();
        return Some(Numeric::BigInt(int));
    }
    let dv = dec.to_f64()?;
    if dv.is_finite() && double_round_trips(dv, &dec) {
        return Some(Numeric::Double(dv));
    }
    Some(Numeric::Decimal(dec))
}

/// True when the shortest decimal rendering of `dv` denotes exactly `dec`.
pub(crate) fn double_round_trips(dv: f64, dec: &BigDecimal) -> bool {
    BigDecimal::from_str(&dv.to_string())
        .map(|round| round == *dec)
        .unwrap_or(false)
}

fn downcast_long(v: i64) -> Numeric {
    if let Ok(b) = i8::try_from(v) {
        Numeric::Byte(b)
    } else if let Ok(s) = i16::try_from(v) {
        Numeric::Short(s)
    } else if let Ok(i) = i32::try_from(v) {
        Numeric::Int(i)
    } else {
        Numeric::Long(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_downcast_to_smallest_width() {
        assert_eq!(parse_numeric("127"), Some(Numeric::Byte(127)));
        assert_eq!(parse_numeric("128"), Some(Numeric::Short(128)));
        assert_eq!(parse_numeric("-32769"), Some(Numeric::Int(-32769)));
        assert_eq!(
            parse_numeric("2147483648"),
            Some(Numeric::Long(2147483648))
        );
        assert_eq!(
            parse_numeric("99999999999999999999"),
            Some(Numeric::BigInt(
                BigInt::from_str("99999999999999999999").unwrap()
            ))
        );
    }

    #[test]
    fn decimals_canonicalise() {
        assert_eq!(
            parse_numeric("3.14").unwrap().canonical_string(),
            "3.14"
        );
        assert_eq!(
            parse_numeric("3.140").unwrap().canonical_string(),
            "3.14"
        );
        // Exponential collapses to an exact integer.
        assert_eq!(parse_numeric("1e2").unwrap().canonical_string(), "100");
        assert_eq!(parse_numeric("2.5e1"), Some(Numeric::BigInt(25.into())));
    }

    #[test]
    fn signs_and_garbage() {
        assert!(parse_numeric("+12").is_some());
        assert!(parse_numeric("-0.5").is_some());
        assert_eq!(parse_numeric("1e-3"), Some(Numeric::Double(0.001)));
        assert!(parse_numeric("1-2").is_none());
        assert!(parse_numeric("1.2.3").is_none());
        assert!(parse_numeric("12a").is_none());
        assert!(parse_numeric("").is_none());
        assert!(parse_numeric("   ").is_none());
    }

    #[test]
    fn high_precision_decimal_survives() {
        // More digits than f64 can hold exactly.
        let parsed = parse_numeric("0.12345678901234567890123").unwrap();
        assert!(matches!(parsed, Numeric::Decimal(_)));
        assert_eq!(
            parsed.canonical_string(),
            "0.12345678901234567890123"
        );
    }
}
