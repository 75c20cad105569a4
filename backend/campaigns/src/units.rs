//! Conversion between the ledger's smallest monetary unit and the display unit.
//!
//! Every amount that leaves the service (`goal`, `total_funds`, donor amounts)
//! goes through [`to_display`]; every amount a user types goes through
//! [`parse_display`]. Nothing else divides or multiplies by the unit ratio.

use thiserror::Error;

/// Number of fractional digits between the display unit and the smallest unit.
pub const DECIMALS: u32 = 18;

/// Smallest units per display unit (10^18).
pub const UNITS_PER_DISPLAY: u128 = 1_000_000_000_000_000_000;

/// Convert a smallest-unit integer into the display unit.
///
/// The whole and fractional parts are converted separately so that whole
/// display amounts come back exactly.
pub fn to_display(amount: u128) -> f64 {
    let whole = amount / UNITS_PER_DISPLAY;
    let frac = amount % UNITS_PER_DISPLAY;
    whole as f64 + frac as f64 / UNITS_PER_DISPLAY as f64
}

/// Convert a whole number of display units into smallest units.
pub fn from_display_whole(whole: u64) -> u128 {
    u128::from(whole) * UNITS_PER_DISPLAY
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,

    #[error("unexpected character {0:?} in amount")]
    InvalidCharacter(char),

    #[error("amount has more than {} decimal places", DECIMALS)]
    TooManyDecimals,

    #[error("amount is too large")]
    Overflow,
}

/// Parse a display-unit decimal string (`"12"`, `"0.25"`, `".5"`) into
/// smallest units without going through floating point.
pub fn parse_display(input: &str) -> Result<u128, AmountParseError> {
    let s = input.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if let Some(c) = whole.chars().chain(frac.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(AmountParseError::InvalidCharacter(c));
    }
    if frac.len() > DECIMALS as usize {
        return Err(AmountParseError::TooManyDecimals);
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| AmountParseError::Overflow)?
            .checked_mul(UNITS_PER_DISPLAY)
            .ok_or(AmountParseError::Overflow)?
    };

    let frac_units = if frac.is_empty() {
        0
    } else {
        let scale = 10u128.pow(DECIMALS - frac.len() as u32);
        frac.parse::<u128>()
            .map_err(|_| AmountParseError::Overflow)?
            * scale
    };

    whole_units
        .checked_add(frac_units)
        .ok_or(AmountParseError::Overflow)
}

/// Serde adapter for smallest-unit amounts on the wire.
///
/// Accepts decimal strings and JSON integers; always writes strings. JSON
/// numbers beyond `u64` lose precision in transit, so the gateway sends those
/// as strings and a float here is rejected.
pub mod amount {
    use std::fmt;

    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer amount as a string or integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u128, E> {
            Err(E::custom(format!(
                "amount {v} is not an exact integer; send it as a string"
            )))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .parse::<u128>()
                .map_err(|_| E::custom(format!("invalid amount {v:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapped {
        #[serde(with = "amount")]
        value: u128,
    }

    #[test]
    fn one_display_unit() {
        assert_eq!(to_display(UNITS_PER_DISPLAY), 1.0);
        assert_eq!(to_display(UNITS_PER_DISPLAY / 2), 0.5);
        assert_eq!(to_display(0), 0.0);
    }

    #[test]
    fn parse_fractions_exactly() {
        assert_eq!(parse_display("0.25").unwrap(), UNITS_PER_DISPLAY / 4);
        assert_eq!(parse_display(".5").unwrap(), UNITS_PER_DISPLAY / 2);
        assert_eq!(parse_display("3.").unwrap(), 3 * UNITS_PER_DISPLAY);
        assert_eq!(parse_display("0.000000000000000001").unwrap(), 1);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_display(""), Err(AmountParseError::Empty));
        assert_eq!(parse_display("."), Err(AmountParseError::Empty));
        assert_eq!(
            parse_display("-1"),
            Err(AmountParseError::InvalidCharacter('-'))
        );
        assert_eq!(
            parse_display("1e3"),
            Err(AmountParseError::InvalidCharacter('e'))
        );
        assert_eq!(
            parse_display("1.0000000000000000001"),
            Err(AmountParseError::TooManyDecimals)
        );
        assert_eq!(
            parse_display("999999999999999999999999"),
            Err(AmountParseError::Overflow)
        );
    }

    #[test]
    fn parse_errors_describe_the_problem() {
        assert_eq!(
            parse_display("1x").unwrap_err().to_string(),
            "unexpected character 'x' in amount"
        );
        let too_fine = format!("0.{}", "1".repeat(19));
        let err: Box<dyn std::error::Error> = parse_display(&too_fine).unwrap_err().into();
        assert_eq!(err.to_string(), "amount has more than 18 decimal places");
    }

    #[test]
    fn amount_accepts_strings_and_integers() {
        let from_str: Wrapped =
            serde_json::from_str(r#"{"value":"100000000000000000000"}"#).unwrap();
        assert_eq!(from_str.value, 100 * UNITS_PER_DISPLAY);

        let from_int: Wrapped = serde_json::from_str(r#"{"value":42}"#).unwrap();
        assert_eq!(from_int.value, 42);

        assert!(serde_json::from_str::<Wrapped>(r#"{"value":-1}"#).is_err());
        assert!(serde_json::from_str::<Wrapped>(r#"{"value":1.5}"#).is_err());

        let out = serde_json::to_string(&Wrapped { value: 7 }).unwrap();
        assert_eq!(out, r#"{"value":"7"}"#);
    }

    proptest! {
        #[test]
        fn whole_amounts_round_trip(x in 0u64..(1u64 << 53)) {
            prop_assert_eq!(to_display(from_display_whole(x)), x as f64);
            prop_assert_eq!(parse_display(&x.to_string()).unwrap(), from_display_whole(x));
        }

        #[test]
        fn display_is_monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(to_display(u128::from(lo)) <= to_display(u128::from(hi)));
        }
    }
}
