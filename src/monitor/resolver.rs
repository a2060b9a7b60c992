//! Entry resolution across all candidate log files
//!
//! Every marker line of every file is dated with the disambiguation rules,
//! then a single best entry is chosen with a midnight-aware ordering.

use std::fs;

use chrono::{Days, NaiveDateTime, Timelike};
use rayon::prelude::*;

use crate::constants::{EARLY_MORNING_END_HOUR, ROLLOVER_LATE_NIGHT_HOUR};
use crate::marker;
use crate::models::{LogFile, MonitorState, ResolvedEntry};
use crate::monitor::dates::resolve_timestamp;

/// Whether `t1` is strictly newer than `t2`.
///
/// Timestamps more than a day apart compare chronologically. Within a day,
/// an early-morning entry of today always beats a late-night entry of
/// yesterday.
pub fn is_newer(t1: NaiveDateTime, t2: NaiveDateTime, now: NaiveDateTime) -> bool {
    let day_gap = (t1.date() - t2.date()).num_days().abs();
    if day_gap > 1 {
        return t1 > t2;
    }

    let today = now.date();
    let t1_early_today = t1.date() == today && t1.hour() < EARLY_MORNING_END_HOUR;
    let t2_late_yesterday = today.checked_sub_days(Days::new(1)) == Some(t2.date())
        && t2.hour() >= ROLLOVER_LATE_NIGHT_HOUR;
    if t1_early_today && t2_late_yesterday {
        return true;
    }

    t1 > t2
}

/// Whether `candidate` should replace `current`.
/// Equal timestamps prefer a file other than the last processed one.
fn supersedes(candidate: &ResolvedEntry, current: &ResolvedEntry, reference_file: &str, now: NaiveDateTime) -> bool {
    is_newer(candidate.timestamp, current.timestamp, now)
        || (candidate.timestamp == current.timestamp && candidate.source_file != reference_file)
}

/// Whether `entry` is newer than the processed baseline in `state`
pub fn is_new_entry(entry: &ResolvedEntry, state: &MonitorState, now: NaiveDateTime) -> bool {
    is_newer(entry.timestamp, state.last_processed_timestamp, now)
        || (entry.timestamp == state.last_processed_timestamp
            && entry.source_file != state.last_processed_file)
}

/// Resolve every marker line of one file
pub fn resolve_file(file: &LogFile, now: NaiveDateTime) -> std::io::Result<Vec<ResolvedEntry>> {
    let bytes = fs::read(&file.path)?;
    let content = String::from_utf8_lossy(&bytes);
    let source_file = file.identifier();

    Ok(content
        .lines()
        .filter_map(|line| marker::match_line(&source_file, line.trim_end_matches('\r')))
        .map(|raw| ResolvedEntry {
            timestamp: resolve_timestamp(raw.time_of_day, file.modified, now),
            source_file: raw.source_file,
            line: raw.line,
            minutes_until_event: raw.minutes_until_event,
        })
        .collect())
}

/// Pick the latest entry across `files`.
///
/// `files` are expected newest first. Files are parsed in parallel, but
/// candidates are folded in scan order so ties resolve deterministically:
/// the last scanned file that is not `reference_file` wins. Unreadable
/// files are logged and skipped.
pub fn resolve_latest(files: &[LogFile], now: NaiveDateTime, reference_file: &str) -> Option<ResolvedEntry> {
    let per_file: Vec<Vec<ResolvedEntry>> = files
        .par_iter()
        .map(|file| match resolve_file(file, now) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Skipping unreadable log file {}: {}", file.path.display(), e);
                Vec::new()
            }
        })
        .collect();

    let mut best: Option<ResolvedEntry> = None;
    for entry in per_file.into_iter().flatten() {
        let replace = match &best {
            None => true,
            Some(current) => supersedes(&entry, current, reference_file, now),
        };
        if replace {
            best = Some(entry);
        }
    }
    best
}
