//! Append-only JSONL journal of lifecycle events.
//!
//! One serialized [`LifecycleEvent`] per line. Useful for post-mortems of long
//! sessions where devices came and went.

use super::LifecycleSink;
use crate::event::LifecycleEvent;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Journal IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid journal entry on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Sink that appends every event to a JSONL file.
///
/// Write failures are logged and otherwise ignored; a broken journal must not
/// take the registry down with it.
#[derive(Debug)]
pub struct JournalSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JournalSink {
    /// Open (or create) the journal at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &LifecycleEvent) -> Result<(), std::io::Error> {
        let line = serde_json::to_string(event)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{line}")?;
        file.flush()
    }
}

impl LifecycleSink for JournalSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        if let Err(e) = self.append(event) {
            log::warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }
}

/// Read back every event in a journal. Blank lines are skipped.
pub fn load_journal(path: &Path) -> Result<Vec<LifecycleEvent>, JournalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| JournalError::Parse {
            line: idx + 1,
            source,
        })?;
        events.push(event);
    }

    Ok(events)
}
