//! Human duration strings such as `1y2d3h4m5s`, used by `expirydelta`.

use crate::errors::{BwError, StatusCode};
use std::time::Duration;

const UNITS: [(char, u64); 5] = [
    ('y', 365 * 24 * 60 * 60),
    ('d', 24 * 60 * 60),
    ('h', 60 * 60),
    ('m', 60),
    ('s', 1),
];

/// Parse `[Ny][Nd][Nh][Nm][Ns]`. Units must appear in that order, each at most once.
/// An empty string yields `None`.
pub fn parse_duration(s: &str) -> Result<Option<Duration>, BwError> {
    if s.is_empty() {
        return Ok(None);
    }
    let invalid = || BwError::new(StatusCode::InvalidOOBCommand, format!("invalid duration {s:?}"));
    let mut secs: u64 = 0;
    let mut next_unit = 0;
    let mut digits = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let pos = UNITS[next_unit..]
            .iter()
            .position(|(u, _)| *u == ch)
            .ok_or_else(invalid)?;
        if digits.is_empty() {
            return Err(invalid());
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let (_, mul) = UNITS[next_unit + pos];
        secs = value
            .checked_mul(mul)
            .and_then(|v| secs.checked_add(v))
            .ok_or_else(invalid)?;
        next_unit += pos + 1;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Some(Duration::from_secs(secs)))
}
