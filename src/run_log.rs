//! Append-only log of how many sentences each run spoke.
//!
//! One line per run: `2026-01-31 09:15:02 PM. Sentences: 12`. The file is
//! rotated by size: `speakline.log` -> `.1` -> `.2` ... and the oldest
//! backup beyond the configured count is deleted.

use crate::config::LogConfig;
use crate::error::Result;
use chrono::{Local, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// Size-rotated run log. Safe to share between runs.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    write_lock: Mutex<()>,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            backups,
            write_lock: Mutex::new(()),
        }
    }

    /// Build from config; `None` when no log location can be determined.
    pub fn from_config(config: &LogConfig) -> Option<Self> {
        config
            .run_log_path()
            .map(|path| Self::new(path, config.max_bytes, config.backups))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry for a run that spoke `sentences` segments.
    pub fn record(&self, sentences: usize) -> Result<()> {
        self.record_at(Local::now().naive_local(), sentences)
    }

    pub fn record_at(&self, at: NaiveDateTime, sentences: usize) -> Result<()> {
        let line = format_entry(at, sentences);
        let _guard = self.write_lock.lock().map_err(|_| {
            crate::error::SpeakError::Other("run log lock poisoned".to_string())
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        if self.should_rotate(line.len() as u64) {
            self.rotate()?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        if self.max_bytes == 0 || self.backups == 0 {
            return false;
        }
        let current = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        current > 0 && current + incoming >= self.max_bytes
    }

    fn rotate(&self) -> Result<()> {
        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        if self.path.exists() {
            fs::rename(&self.path, self.backup_path(1))?;
        }
        tracing::debug!(path = %self.path.display(), "Run log rotated");
        Ok(())
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }
}

/// Format one log line (with trailing newline).
pub fn format_entry(at: NaiveDateTime, sentences: usize) -> String {
    format!("{}. Sentences: {}\n", at.format(TIMESTAMP_FORMAT), sentences)
}
