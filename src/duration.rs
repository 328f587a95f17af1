//! ISO-8601 duration text codec
//!
//! The native scheduler stores every interval as ISO-8601 duration text
//! (`PT1M`, `PT72H`, `P1DT2H`). The model keeps what the user typed in an
//! [`IsoDuration`] and only decodes it while building a native definition.

use crate::error::FormatError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_SEC: i128 = 1_000_000_000;

const DATE_UNITS: [(char, i128); 4] = [
    ('Y', 365 * 86_400),
    ('M', 30 * 86_400),
    ('W', 7 * 86_400),
    ('D', 86_400),
];

const TIME_UNITS: [(char, i128); 3] = [('H', 3_600), ('M', 60), ('S', 1)];

/// Duration text as entered or as read from a native definition.
///
/// May hold invalid text; [`IsoDuration::parse`] reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsoDuration(pub String);

impl IsoDuration {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn parse(&self) -> Result<Duration, FormatError> {
        decode_duration(&self.0)
    }
}

impl From<Duration> for IsoDuration {
    fn from(value: Duration) -> Self {
        Self(encode_duration(value))
    }
}

impl From<&str> for IsoDuration {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode as `PT<h>H<m>M<s>S`, omitting zero components.
///
/// Days are folded into hours (`PT72H`, not `P3D`). Zero and negative
/// values encode as `PT0S`.
pub fn encode_duration(value: Duration) -> String {
    if value <= Duration::zero() {
        return "PT0S".to_string();
    }

    let total = value.num_seconds();
    let nanos = (value - Duration::seconds(total))
        .num_nanoseconds()
        .unwrap_or(0);
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}S", fraction.trim_end_matches('0')));
    } else if seconds > 0 {
        out.push_str(&format!("{seconds}S"));
    }
    if out.len() == 2 {
        out.push_str("0S");
    }
    out
}

/// Decode `P[nY][nM][nW][nD][T[nH][nM][n[.f]S]]`.
///
/// Years count as 365 days and months as 30 days. Signs, empty text,
/// component-less text (`P`, `PT`), out-of-order units and overflow are
/// rejected.
pub fn decode_duration(text: &str) -> Result<Duration, FormatError> {
    let err = || FormatError::Duration(text.to_string());

    let rest = text.trim().strip_prefix('P').ok_or_else(err)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut total: i128 = 0;
    let mut components = 0usize;
    parse_components(date_part, &DATE_UNITS, &mut total, &mut components).ok_or_else(err)?;
    if let Some(time) = time_part {
        if time.is_empty() {
            return Err(err());
        }
        parse_components(time, &TIME_UNITS, &mut total, &mut components).ok_or_else(err)?;
    }
    if components == 0 {
        return Err(err());
    }

    let secs = i64::try_from(total / NANOS_PER_SEC).map_err(|_| err())?;
    let nanos = (total % NANOS_PER_SEC) as i64;
    let whole = Duration::try_seconds(secs).ok_or_else(err)?;
    whole
        .checked_add(&Duration::nanoseconds(nanos))
        .ok_or_else(err)
}

fn parse_components(
    part: &str,
    units: &[(char, i128)],
    total: &mut i128,
    components: &mut usize,
) -> Option<()> {
    let mut next_unit = 0;
    let mut number = String::new();

    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }
        let offset = units[next_unit..].iter().position(|(unit, _)| *unit == ch)?;
        let index = next_unit + offset;
        if number.is_empty() {
            return None;
        }
        let (unit, seconds_per_unit) = units[index];
        let nanos = match number.split_once('.') {
            Some((whole, fraction)) => {
                if unit != 'S' || fraction.is_empty() || fraction.len() > 9 {
                    return None;
                }
                let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
                let padded = format!("{fraction:0<9}");
                let fraction: i128 = padded.parse().ok()?;
                whole.checked_mul(NANOS_PER_SEC)?.checked_add(fraction)?
            }
            None => {
                let value: i128 = number.parse().ok()?;
                value
                    .checked_mul(seconds_per_unit)?
                    .checked_mul(NANOS_PER_SEC)?
            }
        };
        *total = total.checked_add(nanos)?;
        *components += 1;
        next_unit = index + 1;
        number.clear();
    }

    if number.is_empty() {
        Some(())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_common_values() {
        assert_eq!(encode_duration(Duration::minutes(1)), "PT1M");
        assert_eq!(encode_duration(Duration::hours(72)), "PT72H");
        assert_eq!(encode_duration(Duration::minutes(90)), "PT1H30M");
        assert_eq!(encode_duration(Duration::seconds(3_661)), "PT1H1M1S");
        assert_eq!(encode_duration(Duration::zero()), "PT0S");
        assert_eq!(encode_duration(Duration::milliseconds(500)), "PT0.5S");
        assert_eq!(encode_duration(Duration::seconds(-5)), "PT0S");
    }

    #[test]
    fn test_decode_encoder_output() {
        for text in ["PT1M", "PT72H", "PT1H30M", "PT0S", "PT0.5S", "PT1H1M1S"] {
            let value = decode_duration(text).unwrap();
            assert_eq!(encode_duration(value), text);
        }
    }

    #[test]
    fn test_decode_composite_and_date_units() {
        assert_eq!(decode_duration("P1DT2H").unwrap(), Duration::hours(26));
        assert_eq!(decode_duration("P3D").unwrap(), Duration::days(3));
        assert_eq!(decode_duration("P1W").unwrap(), Duration::days(7));
        assert_eq!(decode_duration("P1M").unwrap(), Duration::days(30));
        assert_eq!(decode_duration("P1Y").unwrap(), Duration::days(365));
        assert_eq!(decode_duration(" PT15M ").unwrap(), Duration::minutes(15));
    }

    #[test]
    fn test_decode_rejects_malformed_text() {
        for text in [
            "not-a-duration",
            "",
            "P",
            "PT",
            "1H",
            "-PT1H",
            "PT1H2",
            "PTH",
            "PT1M1H",
            "P1H",
            "PT1.5H",
            "PT999999999999999999999999H",
        ] {
            assert!(decode_duration(text).is_err(), "{text} should be rejected");
        }
    }

    #[test]
    fn test_iso_duration_wraps_text() {
        let d = IsoDuration::from("bogus");
        assert!(d.parse().is_err());
        assert!(!d.is_blank());
        assert!(IsoDuration::new("  ").is_blank());
        assert_eq!(IsoDuration::from(Duration::minutes(5)).as_str(), "PT5M");
    }
}
