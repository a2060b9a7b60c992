//! Filesystem scanning and log file discovery module
//!
//! Responsible for:
//! - Listing candidate log files in the source directory
//! - Filtering by file name glob
//! - Ordering by modification time, newest first
//! - Optional cleanup of files that no longer matter

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use glob::Pattern;

use crate::models::{file_identifier, LogFile, ScanError};

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub kept: Option<PathBuf>,
}

/// List files in `dir` whose names match `pattern`, newest first.
///
/// A missing directory and a directory with no matching files are both
/// errors; the caller aborts its cycle without touching state.
pub fn discover_log_files(dir: &Path, pattern: &str) -> Result<Vec<LogFile>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::DirectoryNotFound(dir.to_path_buf()));
    }

    let matcher = Pattern::new(pattern).map_err(|e| ScanError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let entries = fs::read_dir(dir).map_err(|source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue, // Skip unreadable entries
        };
        let path = entry.path();

        if !matcher.matches(&file_identifier(&path)) {
            continue;
        }

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };

        let modified = match metadata.modified() {
            Ok(time) => local_naive(DateTime::<Local>::from(time)),
            Err(e) => {
                log::warn!("No modification time for {}: {}", path.display(), e);
                continue;
            }
        };

        files.push(LogFile { path, modified });
    }

    if files.is_empty() {
        return Err(ScanError::NoLogFiles {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }

    sort_newest_first(&mut files);
    Ok(files)
}

/// Descending modification time; ties broken by path for a stable order
pub fn sort_newest_first(files: &mut [LogFile]) {
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
}

/// Delete every file except the one whose identifier is `keep`.
///
/// Nothing is deleted when `keep` is empty or names none of the files:
/// without a known reference file there is no proof the others are stale.
/// Failures are logged per file and never abort the pass.
pub fn cleanup_old_files(files: &[LogFile], keep: &str) -> CleanupReport {
    let mut report = CleanupReport::default();

    if keep.is_empty() {
        return report;
    }
    let Some(kept) = files.iter().find(|f| f.identifier() == keep) else {
        log::debug!("Cleanup skipped: reference file {} not among scanned files", keep);
        return report;
    };
    report.kept = Some(kept.path.clone());

    for file in files.iter().filter(|f| f.identifier() != keep) {
        match fs::remove_file(&file.path) {
            Ok(()) => {
                log::info!("Deleted old log file {}", file.path.display());
                report.deleted.push(file.path.clone());
            }
            Err(e) => {
                log::warn!("Failed to delete {}: {}", file.path.display(), e);
                report.failed.push(file.path.clone());
            }
        }
    }

    report
}

fn local_naive(time: DateTime<Local>) -> NaiveDateTime {
    time.naive_local()
}
