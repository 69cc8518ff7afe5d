//! Bounded append-only history with optional JSON file persistence.
//!
//! Backs the decision history, the lock history, and the liquidation audit.
//! Entries evict FIFO past the capacity. A missing or corrupt file loads as
//! an empty history with a warning; it is never an error.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

/// Bounded FIFO store of serializable records.
#[derive(Debug)]
pub struct HistoryStore<T> {
    entries: VecDeque<T>,
    cap: usize,
    path: Option<PathBuf>,
}

impl<T: Serialize + DeserializeOwned + Clone> HistoryStore<T> {
    /// In-memory store with the given capacity.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap,
            path: None,
        }
    }

    /// File-backed store; loads whatever the file already holds.
    #[must_use]
    pub fn with_file(cap: usize, path: PathBuf) -> Self {
        let mut entries = load_from(&path);
        while entries.len() > cap {
            entries.pop_front();
        }
        Self {
            entries,
            cap,
            path: Some(path),
        }
    }

    /// Appends an entry, evicting the oldest past capacity. File-backed
    /// stores save after every append; a save failure is logged, not
    /// propagated.
    pub fn push(&mut self, entry: T) {
        if self.cap > 0 && self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);

        if self.path.is_some() {
            if let Err(e) = self.save() {
                warn!(error = %e, "failed to persist history");
            }
        }
    }

    /// Snapshot of the current window, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Writes the full bounded window to the backing file via a temp-file
    /// rename, so a crash mid-write never corrupts the previous state.
    ///
    /// # Errors
    /// Returns an error on IO or serialization failure; a no-op for
    /// in-memory stores.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer(writer, &self.entries)?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = self.entries.len(), "history saved");
        Ok(())
    }
}

fn load_from<T: DeserializeOwned>(path: &Path) -> VecDeque<T> {
    if !path.exists() {
        return VecDeque::new();
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open history file, starting empty");
            return VecDeque::new();
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt history file, starting empty");
            VecDeque::new()
        }
    }
}
