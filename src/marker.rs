//! Marker line scanning
//!
//! Recognizes the single line grammar the monitor cares about:
//!
//! ```text
//! [HH:MM:SS(.fff) T] [Ocean Trip] ...Next boat is in N minutes...
//! ```
//!
//! The scanner walks the fixed tokens by hand instead of compiling a regular
//! expression. Lines that do not follow the grammar yield `None`; they are
//! never errors.

use chrono::NaiveTime;

use crate::constants::{DEFAULT_MINUTES_UNTIL_EVENT, MARKER_CATEGORY, MARKER_PHRASE};
use crate::models::RawMatch;

/// Time-of-day and countdown extracted from one marker line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerLine {
    pub time_of_day: NaiveTime,
    pub minutes_until_event: u32,
}

/// Parse one log line against the marker grammar.
///
/// A line whose time token has the right shape but is not a real time
/// (for example `25:00:00`) is skipped. A count that does not fit in `u32`
/// falls back to `DEFAULT_MINUTES_UNTIL_EVENT`.
pub fn parse_marker_line(line: &str) -> Option<MarkerLine> {
    let rest = line.strip_prefix('[')?;

    let (time_token, rest) = rest.split_once(' ')?;
    if !has_time_shape(time_token) {
        return None;
    }

    let mut chars = rest.chars();
    if !chars.next()?.is_ascii_alphabetic() {
        return None;
    }
    let rest = chars
        .as_str()
        .strip_prefix("] [")?
        .strip_prefix(MARKER_CATEGORY)?
        .strip_prefix("] ")?;

    let minutes_until_event = find_countdown(rest)?;

    let time_of_day = match parse_time_of_day(time_token) {
        Some(time) => time,
        None => {
            log::debug!("Skipping marker line with invalid time '{}'", time_token);
            return None;
        }
    };

    Some(MarkerLine {
        time_of_day,
        minutes_until_event,
    })
}

/// Parse a line and attach its origin
pub fn match_line(source_file: &str, line: &str) -> Option<RawMatch> {
    let marker = parse_marker_line(line)?;
    Some(RawMatch {
        source_file: source_file.to_string(),
        line: line.to_string(),
        time_of_day: marker.time_of_day,
        minutes_until_event: marker.minutes_until_event,
    })
}

/// Parse `HH:MM:SS` with optional fractional seconds
pub fn parse_time_of_day(token: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(token, "%H:%M:%S%.f").ok()
}

/// `DD:DD:DD` optionally followed by `.` and one or more digits
fn has_time_shape(token: &str) -> bool {
    let bytes = token.as_bytes();
    if bytes.len() < 8 {
        return false;
    }

    let clock_ok = bytes[..8].iter().enumerate().all(|(i, b)| match i {
        2 | 5 => *b == b':',
        _ => b.is_ascii_digit(),
    });
    if !clock_ok {
        return false;
    }

    match &bytes[8..] {
        [] => true,
        [b'.', fraction @ ..] => !fraction.is_empty() && fraction.iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

/// Find `<phrase> in <digits> minute` and return the count.
/// The first phrase occurrence that is followed by a count wins.
fn find_countdown(text: &str) -> Option<u32> {
    for (index, _) in text.match_indices(MARKER_PHRASE) {
        let after = &text[index + MARKER_PHRASE.len()..];
        let Some(after) = after.strip_prefix(" in ") else {
            continue;
        };

        let digit_count = after.bytes().take_while(u8::is_ascii_digit).count();
        if digit_count == 0 || !after[digit_count..].starts_with(" minute") {
            continue;
        }

        let minutes = after[..digit_count]
            .parse::<u32>()
            .unwrap_or(DEFAULT_MINUTES_UNTIL_EVENT);
        return Some(minutes);
    }
    None
}
