//! Structured logging for daemon operations
//!
//! Every event is emitted once through the `log` facade as a short human
//! summary followed by a JSON payload. The backend is the macOS Unified
//! Logging System where available and `tracing-subscriber` elsewhere.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::json;
use std::str::FromStr;
use std::sync::Once;

use crate::models::{DetectionEvent, ResolvedEntry};
use crate::scan::CleanupReport;

static BACKEND: Once = Once::new();

/// Daemon logger with a level gate
#[derive(Debug, Clone)]
pub struct DaemonLogger {
    level: LogLevel,
}

/// Log levels for daemon operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    pub fn filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => anyhow::bail!("Invalid log level: {}", s),
        }
    }
}

/// Install the process-wide log backend. Later calls are no-ops.
pub fn init_backend(subsystem: &str, level: LogLevel) -> Result<()> {
    // Validate subsystem format (should be reverse DNS)
    if !subsystem.contains('.') {
        anyhow::bail!("Subsystem must be in reverse DNS format (e.g., 'com.example.app')");
    }

    let mut result = Ok(());
    BACKEND.call_once(|| result = install_backend(subsystem, level));
    result
}

#[cfg(target_os = "macos")]
fn install_backend(subsystem: &str, level: LogLevel) -> Result<()> {
    let logger = oslog::OsLogger::new(subsystem);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
    log::set_max_level(level.filter());
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn install_backend(_subsystem: &str, level: LogLevel) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))
}

impl DaemonLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Log daemon startup event
    pub fn log_startup(&self, config_path: &std::path::Path, pid: u32) {
        let message = json!({
            "event": "daemon_startup",
            "pid": pid,
            "config_path": config_path.display().to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Daemon started", &message)
    }

    /// Log daemon shutdown event
    pub fn log_shutdown(&self, reason: &str) {
        let message = json!({
            "event": "daemon_shutdown",
            "reason": reason,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Daemon shutting down", &message)
    }

    /// Log a newly detected marker entry
    pub fn log_detection(&self, event: &DetectionEvent) {
        let message = json!({
            "event": event.event_type,
            "file": event.file,
            "line": event.line,
            "resolved_timestamp": event.resolved_timestamp,
            "minutes_until_event": event.minutes_until_event,
            "timestamp": event.timestamp,
        });

        self.log_structured(LogLevel::Info, &format!("New entry detected in {}", event.file), &message)
    }

    pub fn log_action_armed(&self, entry: &ResolvedEntry, fire_at: NaiveDateTime) {
        let message = json!({
            "event": "action_armed",
            "file": entry.source_file,
            "resolved_timestamp": entry.timestamp,
            "fire_at": fire_at,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, &format!("Action scheduled for {}", fire_at), &message)
    }

    /// Log the outcome of a scheduled or pre-event action
    pub fn log_action_result(&self, kind: &str, command: &str, outcome: Result<(), String>) {
        let (level, event, summary) = match &outcome {
            Ok(()) => (LogLevel::Info, "action_fired", format!("{} action completed", kind)),
            Err(_) => (LogLevel::Error, "action_failed", format!("{} action failed", kind)),
        };
        let message = json!({
            "event": event,
            "kind": kind,
            "command": command,
            "error": outcome.err(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(level, &summary, &message)
    }

    pub fn log_countdown_retargeted(&self, target: DateTime<Utc>, minutes: u32) {
        let message = json!({
            "event": "countdown_retargeted",
            "target_utc": target.to_rfc3339(),
            "minutes": minutes,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, &format!("Next event at {}", target), &message)
    }

    pub fn log_pre_event(&self, target: DateTime<Utc>, remaining_seconds: i64) {
        let message = json!({
            "event": "pre_event_fired",
            "target_utc": target.to_rfc3339(),
            "remaining_seconds": remaining_seconds,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, &format!("Next event in {}s", remaining_seconds), &message)
    }

    pub fn log_countdown_cleared(&self, target: DateTime<Utc>) {
        let message = json!({
            "event": "countdown_cleared",
            "target_utc": target.to_rfc3339(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Event passed, countdown cleared", &message)
    }

    pub fn log_cleanup(&self, report: &CleanupReport) {
        if report.deleted.is_empty() && report.failed.is_empty() {
            return;
        }
        let level = if report.failed.is_empty() { LogLevel::Info } else { LogLevel::Warn };
        let message = json!({
            "event": "cleanup",
            "deleted": report.deleted,
            "failed": report.failed,
            "kept": report.kept,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(level, &format!("Deleted {} old log files", report.deleted.len()), &message)
    }

    /// Log configuration changes
    pub fn log_config_change(&self, key: &str, old_value: &str, new_value: &str) {
        let message = json!({
            "event": "config_change",
            "key": key,
            "old_value": old_value,
            "new_value": new_value,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Configuration updated", &message)
    }

    /// Log error events
    pub fn log_error(&self, error_message: &str, context: Option<&str>) {
        let message = json!({
            "event": "error",
            "message": error_message,
            "context": context,
            "timestamp": Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Error, error_message, &message)
    }

    /// Send structured log message to the backend
    fn log_structured(&self, level: LogLevel, message: &str, data: &serde_json::Value) {
        if !self.should_log(level) {
            return;
        }

        let full_message = format!("{} | {}", message, data);

        match level {
            LogLevel::Error => error!("{}", full_message),
            LogLevel::Warn => warn!("{}", full_message),
            LogLevel::Info => info!("{}", full_message),
            LogLevel::Debug => debug!("{}", full_message),
        }
    }

    /// Check if we should log at this level
    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.level
    }
}

impl Default for DaemonLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}
