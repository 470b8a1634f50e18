//! Insulin-on-board log and its file-backed store.
//!
//! `IobLog` is a plain value: a decision cycle takes it, and hands back an
//! updated copy only when a dose was confirmed. `IobStore` persists it as a
//! JSON array and holds an exclusive lock for the length of a cycle so that
//! two overlapping cycles cannot both read the same window and over-dose.

use crate::{Error, IobEntry, Result};
use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default number of entries retained
pub const DEFAULT_RETENTION: usize = 50;

/// Append-only, size-bounded history of delivered doses (oldest first)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IobLog {
    entries: Vec<IobEntry>,
}

impl IobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<IobEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[IobEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Units delivered with `now - time < window`
    pub fn total_within(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        self.entries
            .iter()
            .filter(|e| now - e.time < window)
            .fold(0.0, |total, e| total + e.insulin)
    }

    /// Append and evict the oldest entries beyond `retention`
    pub fn append(mut self, entry: IobEntry, retention: usize) -> Self {
        self.entries.push(entry);
        if self.entries.len() > retention {
            let excess = self.entries.len() - retention;
            self.entries.drain(..excess);
        }
        self
    }
}

/// JSON file holding the IOB log
pub struct IobStore {
    path: PathBuf,
}

impl IobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Take the exclusive cycle lock. Blocks until any other holder is done.
    pub fn lock(&self) -> Result<IobLock> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        tracing::debug!("Acquired IOB lock for {:?}", self.path);
        Ok(IobLock { file })
    }

    /// Read the log. A missing file is an empty log; a corrupted one, or one
    /// holding a negative or non-finite dose, is an error, since either would
    /// under-count insulin.
    pub fn load(&self) -> Result<IobLog> {
        if !self.path.exists() {
            tracing::info!("No IOB history at {:?}, starting empty", self.path);
            return Ok(IobLog::new());
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(IobLog::new());
        }

        let entries: Vec<IobEntry> = serde_json::from_str(&contents)?;
        if let Some((index, bad)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| !(e.insulin.is_finite() && e.insulin >= 0.0))
        {
            return Err(Error::Config(format!(
                "IOB entry {} in {:?} has invalid insulin {}",
                index, self.path, bad.insulin
            )));
        }
        tracing::debug!("Loaded {} IOB entries from {:?}", entries.len(), self.path);
        Ok(IobLog::from_entries(entries))
    }

    /// Atomically replace the file: temp file, fsync, rename
    pub fn save(&self, log: &IobLog) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "IOB path missing parent",
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(log.entries())?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} IOB entries to {:?}", log.len(), self.path);
        Ok(())
    }
}

/// Held for the read → decide → append → save span of one cycle
pub struct IobLock {
    file: File,
}

impl Drop for IobLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
