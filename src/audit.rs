//! JSONL audit logging for userwall
//!
//! Records every decision as one JSON line. The live file is rotated to
//! `<path>.1` once it passes a size threshold; older archives shift up to
//! `<path>.N`. Appends and rotations are serialized by a mutex, and both
//! rotation steps are renames, so a reader sees either a complete old file
//! or the new one.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::decision::Decision;
use crate::error::Result;

/// Default rotation threshold
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Default number of archived files kept
pub const DEFAULT_MAX_ARCHIVES: usize = 3;

/// Where and how to keep the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    /// Live JSONL file
    pub path: PathBuf,

    /// Rotate before an append once the live file is larger than this
    pub max_bytes: u64,

    /// Archives kept; a value of 0 is treated as 1
    pub max_archives: usize,
}

impl AuditSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_archives: DEFAULT_MAX_ARCHIVES,
        }
    }
}

/// Record filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub pid: Option<u32>,
    pub rule_id: Option<String>,
    pub action: Option<String>,
}

impl AuditFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn matches(&self, decision: &Decision) -> bool {
        if let Some(pid) = self.pid {
            if decision.pid() != Some(pid) {
                return false;
            }
        }
        if let Some(ref rule_id) = self.rule_id {
            if decision.rule_id() != rule_id {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if !decision.action().eq_ignore_ascii_case(action) {
                return false;
            }
        }
        true
    }
}

/// Append-only decision store
pub struct AuditLog {
    settings: Option<AuditSettings>,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Create an audit log; `None` disables it
    pub fn new(settings: Option<AuditSettings>) -> Self {
        Self {
            settings,
            lock: Mutex::new(()),
        }
    }

    /// Create an enabled audit log
    pub fn open(settings: AuditSettings) -> Self {
        Self::new(Some(settings))
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.settings.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.settings.as_ref().map(|s| s.path.as_path())
    }

    /// Append one decision as a JSON line, rotating first if the live file
    /// is over the threshold
    pub fn append(&self, decision: &Decision) -> Result<()> {
        let Some(settings) = self.settings.as_ref() else {
            return Ok(());
        };

        let mut line = decision.to_json_line()?;
        line.push('\n');

        let _guard = self.lock.lock();
        rotate_if_needed(settings)?;

        if let Some(parent) = settings.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Archive the live file now, regardless of its size
    pub fn rotate(&self) -> Result<()> {
        let Some(settings) = self.settings.as_ref() else {
            return Ok(());
        };
        let _guard = self.lock.lock();
        if settings.path.exists() {
            rotate(settings)?;
        }
        Ok(())
    }

    /// Records from the live file matching `filter`, in insertion order
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<Decision>> {
        let Some(settings) = self.settings.as_ref() else {
            return Ok(Vec::new());
        };
        let mut records = read_records(&settings.path)?;
        records.retain(|d| filter.matches(d));
        Ok(records)
    }

    /// Records from the archives (oldest first) and then the live file.
    /// Holds the log mutex so a rotation cannot happen between files.
    pub fn query_all(&self, filter: &AuditFilter) -> Result<Vec<Decision>> {
        let Some(settings) = self.settings.as_ref() else {
            return Ok(Vec::new());
        };

        let _guard = self.lock.lock();
        let mut records = Vec::new();
        for path in archive_paths(settings) {
            records.extend(read_records(&path)?);
        }
        records.extend(read_records(&settings.path)?);
        records.retain(|d| filter.matches(d));
        Ok(records)
    }

    /// The last `limit` records of the live file
    pub fn recent(&self, limit: usize) -> Result<Vec<Decision>> {
        let mut records = self.query(&AuditFilter::all())?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    /// Existing archive files, oldest first
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.settings
            .as_ref()
            .map(archive_paths)
            .unwrap_or_default()
    }
}

/// Create a disabled log (for when audit logging is off)
impl Default for AuditLog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn keep(settings: &AuditSettings) -> usize {
    settings.max_archives.max(1)
}

/// `<path>.<n>`
fn archive_path(path: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

fn archive_paths(settings: &AuditSettings) -> Vec<PathBuf> {
    (1..=keep(settings))
        .rev()
        .map(|n| archive_path(&settings.path, n))
        .filter(|p| p.exists())
        .collect()
}

fn rotate_if_needed(settings: &AuditSettings) -> Result<()> {
    let size = match fs::metadata(&settings.path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if size > settings.max_bytes {
        rotate(settings)?;
    }
    Ok(())
}

/// Shift archives up by one and move the live file to `.1`.
/// Caller holds the log mutex.
fn rotate(settings: &AuditSettings) -> Result<()> {
    let keep = keep(settings);

    let oldest = archive_path(&settings.path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = archive_path(&settings.path, n);
        if from.exists() {
            fs::rename(&from, archive_path(&settings.path, n + 1))?;
        }
    }
    fs::rename(&settings.path, archive_path(&settings.path, 1))?;

    info!(path = %settings.path.display(), "rotated audit log");
    Ok(())
}

/// Parse every well-formed record in `path`; a missing file has none
fn read_records(path: &Path) -> Result<Vec<Decision>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Decision>(&line) {
            Ok(decision) => records.push(decision),
            Err(e) => {
                debug!(path = %path.display(), line = index + 1, error = %e, "skipping malformed audit line");
            }
        }
    }
    Ok(records)
}
