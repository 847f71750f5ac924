//! Persistence - Where project snapshots go.
//!
//! The core only needs `save(snapshot)` and `load() -> snapshot`. Debouncing,
//! partial writes and remote sync belong to the implementor.

use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::Snapshot;
use crate::error::PersistenceError;

pub trait Persistence {
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    fn load(&self) -> Result<Snapshot, PersistenceError>;
}

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Option<Snapshot>,
    saves: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl Persistence for MemoryPersistence {
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.saved = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Snapshot, PersistenceError> {
        self.saved.clone().ok_or(PersistenceError::Empty)
    }
}

/// Stores the snapshot as pretty-printed JSON in one file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFilePersistence {
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        // Stage next to the target, then swap in place.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        tracing::debug!(path = %self.path.display(), "snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Snapshot, PersistenceError> {
        if !self.path.exists() {
            return Err(PersistenceError::Empty);
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
