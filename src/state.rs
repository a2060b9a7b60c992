//! Persistence of the monitor state
//!
//! The engine reads and writes [`MonitorState`] through the narrow
//! [`StateStore`] interface. Each save replaces the whole record.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::MonitorState;

pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<MonitorState>;
    fn save(&self, state: &MonitorState) -> Result<()>;
}

/// TOML file on disk, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct TomlStateStore {
    path: PathBuf,
}

impl TomlStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for TomlStateStore {
    fn load(&self) -> Result<MonitorState> {
        if !self.path.exists() {
            return Ok(MonitorState::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    fn save(&self, state: &MonitorState) -> Result<()> {
        let content = toml::to_string_pretty(state).context("Failed to serialize monitor state")?;
        write_atomically(&self.path, &content)
    }
}

/// In-process store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<MonitorState>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new(state: MonitorState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves performed so far
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or_default()
    }

    pub fn snapshot(&self) -> MonitorState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<MonitorState> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &MonitorState) -> Result<()> {
        let mut stored = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("State store lock poisoned"))?;
        *stored = state.clone();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

/// Write to a sibling temporary file, then rename over the target
pub fn write_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
