//! Event slot names: `"_" + version + ":" + base36(millis)`.

use chronicle_core::epoch::EpochMillis;
use chronicle_core::error::{Error, Result};

/// Marks an attribute as an event slot.
pub const SLOT_PREFIX: char = '_';

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Names the slot holding the event at `version`.
#[must_use]
pub fn slot_name(version: i64, at: EpochMillis) -> String {
    format!("{SLOT_PREFIX}{version}:{}", to_base36(at.as_i64()))
}

/// Whether an attribute name is an event slot.
#[must_use]
pub fn is_slot(name: &str) -> bool {
    name.starts_with(SLOT_PREFIX)
}

/// Recovers the version and time encoded in a slot name.
///
/// # Errors
///
/// Returns `InvalidKey` for anything but `_<decimal>:<base36>`. Base-36
/// digits may be either case.
pub fn parse_slot(name: &str) -> Result<(i64, EpochMillis)> {
    let invalid = || Error::InvalidKey(name.to_owned());

    let (version, at) = name
        .strip_prefix(SLOT_PREFIX)
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(invalid)?;

    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let version = version.parse().map_err(|_| invalid())?;
    let at = from_base36(at).ok_or_else(invalid)?;

    Ok((version, EpochMillis(at)))
}

fn to_base36(value: i64) -> String {
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[usize::try_from(magnitude % 36).unwrap_or_default()]);
        magnitude /= 36;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

fn from_base36(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    i64::from_str_radix(text, 36).ok()
}
