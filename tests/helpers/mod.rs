#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempDir;

use tidewatch::action::{ActionError, ActionInvoker};
use tidewatch::daemon::logging::DaemonLogger;
use tidewatch::models::{MonitorState, ScheduleConfig, SourceConfig};
use tidewatch::monitor::countdown::local_to_utc;
use tidewatch::monitor::{EngineConfig, MonitorEngine};
use tidewatch::state::MemoryStateStore;

pub const ACTION: &str = "/echo boat leaving";
pub const PRE_EVENT_ACTION: &str = "/echo boat arriving";

/// 2024-05-10 at the given local wall-clock time
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 10)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// `[HH:MM:SS.000 N] [Ocean Trip] Next boat is in N minutes...`
pub fn marker(time: &str, minutes: u32) -> String {
    format!("[{time}.000 N] [Ocean Trip] Next boat is in {minutes} minutes...")
}

/// A temporary log directory with controlled modification times
pub struct LogDir {
    pub temp_dir: TempDir,
}

impl LogDir {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `lines` to `name` and set its mtime to `modified` (local clock)
    pub fn write(&self, name: &str, lines: &[String], modified: NaiveDateTime) -> PathBuf {
        let path = self.path().join(name);
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        set_modified(&path, modified);
        path
    }

    /// Append a line, moving the mtime forward to `modified`
    pub fn append(&self, name: &str, line: &str, modified: NaiveDateTime) {
        let path = self.path().join(name);
        let mut content = fs::read_to_string(&path).unwrap_or_default();
        content.push_str(line);
        content.push('\n');
        fs::write(&path, content).unwrap();
        set_modified(&path, modified);
    }
}

pub fn set_modified(path: &Path, modified: NaiveDateTime) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::from(local_to_utc(modified))).unwrap();
}

/// Invoker that records every command instead of running it
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingInvoker {
    /// Records like the default but reports every command as failed
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionInvoker for RecordingInvoker {
    async fn invoke(&self, command: &str) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(command.to_string());
        if self.fail {
            return Err(ActionError::ExitStatus {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "boat missed".to_string(),
            });
        }
        Ok(())
    }
}

/// Engine wired to in-memory collaborators
pub struct Harness {
    pub engine: Arc<MonitorEngine>,
    pub store: Arc<MemoryStateStore>,
    pub invoker: Arc<RecordingInvoker>,
}

pub fn engine_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        schedule: ScheduleConfig {
            action_command: ACTION.to_string(),
            pre_event_action_command: PRE_EVENT_ACTION.to_string(),
            ..ScheduleConfig::default()
        },
        source: SourceConfig {
            directory: dir.to_path_buf(),
            file_pattern: "*.log".to_string(),
        },
    }
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_state(config, MonitorState::default())
    }

    pub fn with_state(config: EngineConfig, state: MonitorState) -> Self {
        Self::with_parts(config, state, RecordingInvoker::default())
    }

    pub fn with_parts(config: EngineConfig, state: MonitorState, invoker: RecordingInvoker) -> Self {
        let store = Arc::new(MemoryStateStore::new(state));
        let invoker = Arc::new(invoker);
        let engine = MonitorEngine::new(config, store.clone(), invoker.clone(), DaemonLogger::default()).unwrap();
        Self { engine, store, invoker }
    }
}

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
