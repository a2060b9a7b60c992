//! Output formatting module
//!
//! Handles:
//! - Canonical detection events shared by the CLI and daemon logging
//! - Human-readable rendering of scans, checks and status
//! - JSON rendering of the same shapes

use anyhow::Result;

use crate::constants::EVENT_ENTRY_DETECTED;
use crate::models::{CheckReport, DetectionEvent, PollOutcome, ResolvedEntry, ScanOutput, StatusReport};

/// Create a DetectionEvent from a resolved entry.
/// This is the canonical way to build an event for output, so field names
/// stay the same across the scan command, checks and the daemon log.
pub fn create_detection_event(entry: &ResolvedEntry) -> Result<DetectionEvent> {
    use time::OffsetDateTime;

    let timestamp = OffsetDateTime::now_utc();
    let timestamp_str = timestamp.format(&time::format_description::well_known::Iso8601::DEFAULT)?;

    Ok(DetectionEvent {
        timestamp: timestamp_str,
        event_type: EVENT_ENTRY_DETECTED.to_string(),
        file: entry.source_file.clone(),
        line: entry.line.clone(),
        resolved_timestamp: entry.timestamp,
        minutes_until_event: entry.minutes_until_event,
        event_time: entry.event_time(),
    })
}

/// Format a detection event as human-readable text
pub fn format_event_human(event: &DetectionEvent) -> String {
    format!(
        "[{}] Entry in {}\n  Line: {}\n  Event in {} min (at {})",
        event.resolved_timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.file,
        event.line,
        event.minutes_until_event,
        event.event_time.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// Format a detection event as JSON string.
pub fn format_event_json(event: &DetectionEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Render the result of a one-shot scan
pub fn format_scan_human(output: &ScanOutput) -> String {
    let mut lines = Vec::new();

    match &output.latest {
        Some(event) => {
            lines.push("Latest entry:".to_string());
            lines.push(format_event_human(event));
        }
        None => lines.push("No marker lines found.".to_string()),
    }

    let summary = &output.summary;
    lines.push(String::new());
    lines.push("Scan Summary:".to_string());
    lines.push(format!("  Directory: {}", summary.directory.display()));
    lines.push(format!("  Pattern: {}", summary.pattern));
    lines.push(format!("  Scanned: {} files", summary.scanned));
    lines.push(format!("  Duration: {}", format_duration_ms(summary.duration_ms)));

    lines.join("\n")
}

/// Render a status snapshot
pub fn format_status_human(status: &StatusReport) -> String {
    let mut lines = vec![
        format!("Monitoring: {}", if status.enabled { "enabled" } else { "disabled" }),
        format!("Poll interval: {} min", status.interval_minutes),
    ];

    match status.pending_fire_at {
        Some(fire_at) => lines.push(format!("Action pending: fires at {}", fire_at.format("%H:%M:%S"))),
        None => lines.push("Action pending: no".to_string()),
    }

    match status.last_processed_timestamp {
        Some(ts) => {
            lines.push(format!(
                "Last entry: {} ({})",
                ts.format("%Y-%m-%d %H:%M:%S"),
                status.last_processed_file
            ));
            if !status.last_found_entry.is_empty() {
                lines.push(format!("  {}", status.last_found_entry));
            }
        }
        None => lines.push("Last entry: none".to_string()),
    }

    match (status.next_event_local, status.remaining_seconds) {
        (Some(local), Some(remaining)) => {
            let flag = if status.pre_event_fired { ", pre-event action fired" } else { "" };
            lines.push(format!(
                "Next event: {} (in {}{})",
                local.format("%Y-%m-%d %H:%M:%S"),
                format_remaining(remaining),
                flag
            ));
        }
        _ => lines.push("Next event: none".to_string()),
    }

    lines.join("\n")
}

/// Render a forced check
pub fn format_check_human(report: &CheckReport) -> String {
    let headline = match &report.outcome {
        PollOutcome::Disabled => "Monitoring is disabled".to_string(),
        PollOutcome::SkippedPending => "An action is already pending".to_string(),
        PollOutcome::NoCandidate => "No marker lines found".to_string(),
        PollOutcome::AlreadySeen { entry } => format!("No new entry (latest from {})", entry.source_file),
        PollOutcome::Armed { entry, fire_at } => format!(
            "New entry in {}, action scheduled for {}",
            entry.source_file,
            fire_at.format("%H:%M:%S")
        ),
        PollOutcome::DeferredWhilePending { entry } => format!(
            "New entry in {}, not scheduled while another action is pending",
            entry.source_file
        ),
    };

    format!("{}\n\n{}", headline, format_status_human(&report.status))
}

/// `1h 02m 03s`, `4m 05s` or `6s`
pub fn format_remaining(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn format_duration_ms(duration_ms: u64) -> String {
    if duration_ms < 1000 {
        format!("{}ms", duration_ms)
    } else {
        format!("{:.2}s", duration_ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanSummary;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn entry() -> ResolvedEntry {
        ResolvedEntry {
            source_file: "chat_0510.log".to_string(),
            line: "[10:00:00.000 N] [Ocean Trip] Next boat is in 15 minutes.".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap().and_hms_opt(10, 0, 0).unwrap(),
            minutes_until_event: 15,
        }
    }

    fn status() -> StatusReport {
        StatusReport {
            enabled: true,
            interval_minutes: 5,
            action_pending: false,
            pending_fire_at: None,
            last_processed_timestamp: None,
            last_processed_file: String::new(),
            last_found_entry: String::new(),
            next_event_utc: None,
            next_event_local: None,
            next_event_minutes: None,
            remaining_seconds: None,
            pre_event_fired: false,
        }
    }

    #[test]
    fn test_detection_event_fields() {
        let event = create_detection_event(&entry()).unwrap();
        assert_eq!(event.event_type, "entry_detected");
        assert_eq!(event.file, "chat_0510.log");
        assert_eq!(event.event_time.format("%H:%M").to_string(), "10:15");
        assert!(event.timestamp.contains('T'));

        let json: serde_json::Value = serde_json::from_str(&format_event_json(&event).unwrap()).unwrap();
        assert_eq!(json["minutes_until_event"], 15);
        assert_eq!(json["resolved_timestamp"], "2024-05-10T10:00:00");
    }

    #[test]
    fn test_human_event() {
        let text = format_event_human(&create_detection_event(&entry()).unwrap());
        assert!(text.starts_with("[2024-05-10 10:00:00] Entry in chat_0510.log"));
        assert!(text.contains("Event in 15 min (at 2024-05-10 10:15:00)"));
    }

    #[test]
    fn test_scan_without_entries() {
        let output = ScanOutput {
            latest: None,
            summary: ScanSummary {
                directory: PathBuf::from("/logs"),
                pattern: "*.log".to_string(),
                scanned: 3,
                duration_ms: 1500,
            },
        };
        let text = format_scan_human(&output);
        assert!(text.contains("No marker lines found."));
        assert!(text.contains("Scanned: 3 files"));
        assert!(text.contains("Duration: 1.50s"));
    }

    #[test]
    fn test_status_rendering() {
        assert!(format_status_human(&status()).contains("Next event: none"));

        let mut counting = status();
        counting.next_event_local = Some(entry().event_time());
        counting.remaining_seconds = Some(125);
        counting.pre_event_fired = true;
        let text = format_status_human(&counting);
        assert!(text.contains("(in 2m 05s, pre-event action fired)"));
    }

    #[test]
    fn test_check_headline() {
        let report = CheckReport {
            outcome: PollOutcome::AlreadySeen { entry: entry() },
            status: status(),
        };
        assert!(format_check_human(&report).starts_with("No new entry (latest from chat_0510.log)"));
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(6), "6s");
        assert_eq!(format_remaining(245), "4m 05s");
        assert_eq!(format_remaining(3723), "1h 02m 03s");
        assert_eq!(format_remaining(-4), "0s");
    }
}
