//! Block timestamp parsing and staleness computation.
//!
//! Nodes report block times as RFC 3339 text with up to nanosecond precision, e.g.
//! `2024-01-02T03:04:05.123456789Z`. Fractions are truncated to microseconds before
//! parsing; anything finer does not matter for a delay measured in milliseconds.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const MAX_FRACTION_DIGITS: usize = 6;

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a block timestamp into a UTC instant.
///
/// A trailing `Z` means UTC, an explicit offset is normalized to UTC, and a
/// timestamp without any offset is taken to be UTC already. Seconds may be
/// omitted, and a bare date is midnight UTC.
pub fn parse_block_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    let text = match raw.strip_suffix('Z') {
        Some(rest) => Cow::Owned(format!("{rest}+00:00")),
        None => Cow::Borrowed(raw),
    };
    let text = truncate_fraction(&text);

    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&text, format).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

/// Cut the fractional seconds after the first `.` down to six digits, keeping any offset.
fn truncate_fraction(text: &str) -> Cow<'_, str> {
    let Some(dot) = text.find('.') else {
        return Cow::Borrowed(text);
    };

    let fraction_start = dot + 1;
    let fraction_end = text[fraction_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |offset| fraction_start + offset);

    if fraction_end - fraction_start <= MAX_FRACTION_DIGITS {
        return Cow::Borrowed(text);
    }

    Cow::Owned(format!(
        "{}{}",
        &text[..fraction_start + MAX_FRACTION_DIGITS],
        &text[fraction_end..]
    ))
}

/// Whole milliseconds between `block_time` and `now`, clamped to zero.
///
/// Clock skew between this host and the node, or a block stamped in the future,
/// yields zero rather than a negative delay.
pub fn staleness_ms(block_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - block_time).num_milliseconds()).unwrap_or(0)
}

/// Block delay for an optional raw timestamp.
///
/// `None` when the timestamp is missing or cannot be parsed. A missing timestamp is
/// never reported as a zero delay.
pub fn block_delay_ms(raw: Option<&str>, now: DateTime<Utc>) -> Option<u64> {
    let block_time = parse_block_time(raw?)?;
    Some(staleness_ms(block_time, now))
}
