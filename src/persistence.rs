//! Durable snapshot store for the simulation state.
//!
//! One JSON file, one schema version field. A missing, corrupt or
//! wrong-version file is never fatal: `load` reports `None` and the caller
//! starts fresh. Saves go through a temp file and a rename so a crash
//! mid-write cannot leave a half-written snapshot behind.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::SimState;

/// Bump when the persisted layout changes shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    state: SimState,
}

/// File-backed store for [`SimState`] snapshots.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state, or `None` when there is nothing usable.
    pub fn load(&self) -> Option<SimState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable; starting fresh");
                return None;
            }
        };

        let file: StateFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt; starting fresh");
                return None;
            }
        };

        if file.schema_version != SCHEMA_VERSION {
            warn!(
                found = file.schema_version,
                expected = SCHEMA_VERSION,
                "state file schema mismatch; starting fresh"
            );
            return None;
        }

        info!(
            day_index = file.state.day_index,
            balance = file.state.ledger.cash,
            "loaded simulation state"
        );
        Some(file.state)
    }

    /// Write the full state. Atomic: temp sibling then rename.
    pub fn save(&self, state: &SimState) -> Result<()> {
        let file = StateFile {
            schema_version: SCHEMA_VERSION,
            state: state.clone(),
        };
        let json = serde_json::to_string(&file).context("serialize simulation state")?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("write temp state file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace state file {}", self.path.display()))?;
        Ok(())
    }
}
