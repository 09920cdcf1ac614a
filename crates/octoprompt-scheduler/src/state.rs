//! Last-fired state persistence — a single JSON file, human-readable.
//!
//! Loaded once at engine start, overwritten wholesale on every successful
//! fire. A missing or corrupt file is empty state, never an error; write
//! failures are logged and swallowed so persistence can never block
//! scheduling.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File-backed map of schedule id → last successful fire instant.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a state store inside `dir` (created if needed).
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.join("state.json"),
        }
    }

    /// Load persisted state. Missing/corrupt file → empty map.
    pub fn load(&self) -> HashMap<String, DateTime<Utc>> {
        if !self.path.exists() {
            return HashMap::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", self.path.display());
                HashMap::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.path.display());
                HashMap::new()
            }
        }
    }

    /// Overwrite the state file with `state`.
    pub fn save(&self, state: &HashMap<String, DateTime<Utc>>) {
        let json = match serde_json::to_string_pretty(state) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("⚠️ Failed to serialize state: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!("⚠️ Failed to write {}: {e}", self.path.display());
        } else {
            tracing::debug!("💾 Saved state for {} schedule(s)", state.len());
        }
    }
}
