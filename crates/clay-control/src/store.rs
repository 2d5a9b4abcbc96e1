//! Shared persistent key-value store.
//!
//! The one resource genuinely shared across the process boundary. Cells
//! are eventually-consistent, last-writer-wins; readers must treat the
//! store as the source of truth and never assume a write is observed
//! exactly once.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::warn;

/// Last-writer-wins string cells shared between processes.
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process store for tests and single-process setups.
#[derive(Clone, Default)]
pub struct MemoryStore {
    cells: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cells.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.cells
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.cells.write().unwrap().remove(key);
    }
}

/// File-backed store: one JSON object per file, rewritten atomically.
///
/// The cross-process analogue of the platform's shared defaults suite.
/// Every operation re-reads the file, so two processes interleaving writes
/// behave as last-writer-wins at file granularity — acceptable for the
/// control channel's single-slot cells. I/O failures are logged and
/// degrade to "cell absent" rather than propagating; the control channel's
/// bounded waits turn persistent store failure into timeouts.
#[derive(Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "shared store read failed");
                return HashMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "shared store is not valid JSON");
            HashMap::new()
        })
    }

    fn save(&self, cells: &HashMap<String, String>) {
        let raw = match serde_json::to_string(cells) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "shared store serialization failed");
                return;
            }
        };
        // Write-then-rename so a concurrent reader never sees a torn file.
        let tmp = self.path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, raw).and_then(|_| fs::rename(&tmp, &self.path)) {
            warn!(path = %self.path.display(), error = %e, "shared store write failed");
        }
    }
}

impl SharedStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut cells = self.load();
        cells.insert(key.to_string(), value.to_string());
        self.save(&cells);
    }

    fn remove(&self, key: &str) {
        let mut cells = self.load();
        if cells.remove(key).is_some() {
            self.save(&cells);
        }
    }
}
