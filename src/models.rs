//! Data models module
//!
//! Defines core data structures:
//! - LogFile: Candidate log file snapshot
//! - RawMatch / ResolvedEntry: Marker lines before and after date resolution
//! - MonitorState: Persisted "already processed" baseline and countdown target
//! - ScheduleConfig: Poll and action settings
//! - StatusReport / PollOutcome: Read-only views returned to callers
//! - DetectionEvent / ScanOutput: Shapes printed by the CLI

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_FILE_PATTERN, DEFAULT_POLL_INTERVAL_MINUTES, POLL_INTERVAL_MAX_MINUTES,
    POLL_INTERVAL_MIN_MINUTES,
};


/// A candidate log file as seen by one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Last modification time in the local clock domain
    pub modified: NaiveDateTime,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>, modified: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// Identifier recorded in MonitorState (the file name)
    pub fn identifier(&self) -> String {
        file_identifier(&self.path)
    }
}

/// File name of a path, used as the stable identifier of a log file
pub fn file_identifier(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// A marker line matched in a file, before date resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub source_file: String,
    pub line: String,
    pub time_of_day: NaiveTime,
    pub minutes_until_event: u32,
}

/// A marker line paired with its inferred calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// Identifier of the file the line came from
    pub source_file: String,
    /// The full log line, trimmed of line terminators
    pub line: String,
    /// Date + time in the log's own clock domain
    pub timestamp: NaiveDateTime,
    /// Minutes announced by the marker
    pub minutes_until_event: u32,
}

impl ResolvedEntry {
    /// Predicted event time in the log's clock domain
    pub fn event_time(&self) -> NaiveDateTime {
        self.timestamp + ChronoDuration::minutes(i64::from(self.minutes_until_event))
    }
}

/// Persisted engine state.
///
/// The poll path owns the `last_*` fields, the countdown owns the
/// `next_event_*` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorState {
    /// Resolved timestamp of the last entry that triggered an action
    pub last_processed_timestamp: NaiveDateTime,
    /// Identifier of the file holding that entry
    pub last_processed_file: String,
    /// Text of that entry
    pub last_found_entry: String,
    /// Absolute time of the next predicted event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_time_utc: Option<DateTime<Utc>>,
    /// Minutes announced by the entry that produced the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_minutes: Option<u32>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            // 1970-01-01 00:00:00
            last_processed_timestamp: NaiveDateTime::default(),
            last_processed_file: String::new(),
            last_found_entry: String::new(),
            next_event_time_utc: None,
            next_event_minutes: None,
        }
    }
}

impl MonitorState {
    /// Record an entry as the new "already seen" baseline
    pub fn record_entry(&mut self, entry: &ResolvedEntry) {
        self.last_processed_timestamp = entry.timestamp;
        self.last_processed_file = entry.source_file.clone();
        self.last_found_entry = entry.line.clone();
    }

    /// Forget the "already seen" baseline. Countdown fields are untouched.
    pub fn clear_baseline(&mut self) {
        self.last_processed_timestamp = NaiveDateTime::default();
        self.last_processed_file.clear();
        self.last_found_entry.clear();
    }

    pub fn has_baseline(&self) -> bool {
        self.last_processed_timestamp != NaiveDateTime::default()
            || !self.last_processed_file.is_empty()
    }
}

/// Poll and action settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Whether scheduled polls run at all
    pub enabled: bool,
    /// Poll interval in minutes (1-60)
    pub interval_minutes: u32,
    /// Action run once after a new entry is detected
    pub action_command: String,
    /// Action run once shortly before the predicted event
    pub pre_event_action_command: String,
    /// Delete scanned files other than the one holding the last entry
    pub delete_old_files: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            action_command: String::new(),
            pre_event_action_command: String::new(),
            delete_old_files: false,
        }
    }
}

impl ScheduleConfig {
    /// Clamp the interval into the supported range
    pub fn clamp_interval(&mut self) {
        self.interval_minutes = clamp_interval_minutes(self.interval_minutes);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(clamp_interval_minutes(self.interval_minutes)) * 60)
    }
}

pub fn clamp_interval_minutes(minutes: u32) -> u32 {
    minutes.clamp(POLL_INTERVAL_MIN_MINUTES, POLL_INTERVAL_MAX_MINUTES)
}

/// Where candidate log files live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding the log files
    pub directory: PathBuf,
    /// Glob matched against file names
    pub file_pattern: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tidewatch")
                .join("logs"),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
        }
    }
}

/// What a single poll cycle did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Monitoring is disabled and the poll was not forced
    Disabled,
    /// An action is pending and the poll was not forced
    SkippedPending,
    /// No marker line found in any file
    NoCandidate,
    /// Latest entry is not newer than the recorded baseline
    AlreadySeen { entry: ResolvedEntry },
    /// New entry recorded and action scheduled
    Armed {
        entry: ResolvedEntry,
        fire_at: NaiveDateTime,
    },
    /// New entry seen by a forced check while another action is pending
    DeferredWhilePending { entry: ResolvedEntry },
}

impl PollOutcome {
    pub fn entry(&self) -> Option<&ResolvedEntry> {
        match self {
            PollOutcome::AlreadySeen { entry }
            | PollOutcome::Armed { entry, .. }
            | PollOutcome::DeferredWhilePending { entry } => Some(entry),
            _ => None,
        }
    }
}

/// Read-only snapshot reported by the status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub action_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_fire_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_timestamp: Option<NaiveDateTime>,
    pub last_processed_file: String,
    pub last_found_entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_local: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
    pub pre_event_fired: bool,
}

/// Result of a forced check: what the poll did plus the status afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub outcome: PollOutcome,
    pub status: StatusReport,
}

/// Canonical event structure for detection output.
/// Shared by the `scan` command, forced checks and daemon logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// ISO 8601 wall-clock time of the detection
    pub timestamp: String,
    /// Event type identifier
    pub event_type: String,
    /// Identifier of the file holding the line
    pub file: String,
    /// The marker line
    pub line: String,
    /// Resolved timestamp of the line
    pub resolved_timestamp: NaiveDateTime,
    /// Minutes announced by the marker
    pub minutes_until_event: u32,
    /// Predicted event time in the log clock domain
    pub event_time: NaiveDateTime,
}

/// Output of the one-shot `scan` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// Latest entry across all scanned files, if any
    pub latest: Option<DetectionEvent>,
    pub summary: ScanSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub directory: PathBuf,
    pub pattern: String,
    /// Number of files that matched the pattern
    pub scanned: usize,
    pub duration_ms: u64,
}

/// Errors raised while discovering candidate files
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Log directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("No log files matching '{pattern}' in {}", dir.display())]
    NoLogFiles { dir: PathBuf, pattern: String },
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Scan task failed: {0}")]
    Task(String),
}

/// Errors raised when applying configuration updates
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Note: bounds must match POLL_INTERVAL_MIN/MAX_MINUTES in constants.rs
    #[error("Invalid poll interval: {0}. Must be between 1 and 60 minutes")]
    InvalidInterval(String),
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("Malformed update '{0}': expected key=value")]
    MalformedUpdate(String),
}
