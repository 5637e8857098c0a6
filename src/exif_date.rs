//! EXIF date strings
//!
//! EXIF stores local wall-clock time as `YYYY:MM:DD HH:MM:SS` with the
//! sub-seconds and the UTC offset in separate tags. Writers in the wild are
//! sloppy: placeholders made of zeros or blanks mean "no date", seconds are
//! sometimes blanked out and some vendors use `-` between the date fields.

use crate::error::{Error, Result};
use chrono::{Datelike, DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};

/// Format used for every EXIF date tag
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const LENGTH_ONLY_DATE: usize = 10;
const LENGTH_DATE_WITH_TIME: usize = 19;

/// Whether a date string is one of the placeholders written for "no date"
pub fn is_empty_exif_date(value: &str) -> bool {
    let trimmed = value.trim_end_matches('\0');
    trimmed.trim().is_empty() || trimmed == "0000:00:00 00:00:00"
}

/// Render a wall-clock time the way EXIF stores it
pub fn format_exif_date(date: &NaiveDateTime) -> String {
    date.format(EXIF_DATE_FORMAT).to_string()
}

/// Parse an EXIF date string
///
/// Accepts `-` as date separator, a date without time and blank seconds.
/// Returns `None` for placeholders and anything that is not a valid date.
pub fn parse_exif_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim_end_matches('\0');
    if is_empty_exif_date(value) || !value.is_ascii() || value.len() < LENGTH_ONLY_DATE {
        return None;
    }

    let mut chars: Vec<u8> = value.as_bytes().to_vec();
    chars[4] = b':';
    chars[7] = b':';

    if chars.len() == LENGTH_ONLY_DATE {
        let text = std::str::from_utf8(&chars).ok()?;
        return NaiveDate::parse_from_str(text, "%Y:%m:%d")
            .ok()?
            .and_hms_opt(0, 0, 0);
    }

    if chars.len() < LENGTH_DATE_WITH_TIME {
        return None;
    }
    chars.truncate(LENGTH_DATE_WITH_TIME);
    chars[10] = b' ';

    // "2023:05:12 18:04:  " happens; keep the date
    for index in [17, 18] {
        if chars[index] == b' ' {
            chars[index] = b'0';
        }
    }

    let text = std::str::from_utf8(&chars).ok()?;
    NaiveDateTime::parse_from_str(text, EXIF_DATE_FORMAT).ok()
}

/// Render an offset as `+HH:MM`, the `OffsetTime` tag format
pub fn format_offset(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}

/// Parse an `OffsetTime` value (`+HH:MM`, `-HH:MM` or `Z`)
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim_end_matches('\0').trim();
    if value == "Z" {
        return FixedOffset::east_opt(0);
    }

    let bytes = value.as_bytes();
    if bytes.len() != 6 || bytes[3] != b':' {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = value.get(1..3)?.parse().ok()?;
    let minutes: i32 = value.get(4..6)?.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Render milliseconds as a `SubSecTime` value ("5" for 500 ms, "123")
pub fn format_sub_sec(millis: u32) -> String {
    let digits = format!("{:03}", millis % 1000);
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a `SubSecTime` value into milliseconds
///
/// The digits are a decimal fraction, so "5" is 500 ms and "123456" is
/// truncated to 123 ms.
pub fn parse_sub_sec(value: &str) -> Option<u32> {
    let digits = value.trim_end_matches('\0').trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded: String = digits.chars().take(3).collect();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.parse().ok()
}

/// Convert epoch milliseconds into local wall-clock time and milliseconds
///
/// Fails for instants whose local year is outside `0..=9999`, which the
/// four-digit EXIF format cannot hold.
pub fn to_local(epoch_millis: i64, offset: &FixedOffset) -> Result<(NaiveDateTime, u32)> {
    let utc = DateTime::from_timestamp_millis(epoch_millis).ok_or_else(|| {
        Error::UnsupportedUpdate(format!("timestamp {} out of range", epoch_millis))
    })?;
    let local = utc.with_timezone(offset).naive_local();

    if !(0..=9999).contains(&local.year()) {
        return Err(Error::UnsupportedUpdate(format!(
            "year of timestamp {} cannot be stored in EXIF",
            epoch_millis
        )));
    }

    let millis = local.nanosecond() / 1_000_000;
    let whole_seconds = local.with_nanosecond(0).unwrap_or(local);
    Ok((whole_seconds, millis))
}

/// Convert a local wall-clock time back into epoch milliseconds
pub fn to_epoch_millis(date: &NaiveDateTime, millis: u32, offset: &FixedOffset) -> Option<i64> {
    let local = offset.from_local_datetime(date).single()?;
    Some(local.timestamp_millis() + i64::from(millis))
}
