//! Atomic, crash-safe persistence for [`GridState`].
//!
//! Grounded on `aibysid-HyperLiquidMM`'s `save_state`/`load_state`
//! (`serde_json` + `tracing`-style logging of load/save outcomes) — the
//! nearest durable-state analogue in the retrieval pack — but made
//! genuinely atomic: every save writes to a temp file, `fsync`s it, renames
//! it over the target (atomic on a POSIX filesystem), and retains the
//! previous snapshot as a `.bak` rather than overwriting it directly.

use crate::domain::errors::GridError;
use crate::domain::grid_state::{GridState, CURRENT_SCHEMA_VERSION};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn bak_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    /// Writes `state` to disk atomically. The previous snapshot, if any, is
    /// retained at the `.bak` path before being overwritten. Bumps
    /// `state.version` before serializing, so every persisted snapshot
    /// carries a strictly higher version than the one it replaces (spec
    /// §3's monotone-version invariant).
    pub fn save(&self, state: &mut GridState) -> Result<(), GridError> {
        state.bump_version();
        let serialized = serde_json::to_string_pretty(state).map_err(|e| GridError::CorruptSnapshot {
            reason: format!("failed to serialize snapshot: {e}"),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| GridError::CorruptSnapshot {
                reason: format!("failed to create snapshot directory: {e}"),
            })?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = File::create(&tmp_path).map_err(|e| GridError::CorruptSnapshot {
                reason: format!("failed to create temp snapshot file: {e}"),
            })?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| GridError::CorruptSnapshot {
                    reason: format!("failed to write temp snapshot file: {e}"),
                })?;
            file.sync_all().map_err(|e| GridError::CorruptSnapshot {
                reason: format!("failed to fsync temp snapshot file: {e}"),
            })?;
        }

        if self.path.exists() {
            fs::copy(&self.path, self.bak_path()).map_err(|e| GridError::CorruptSnapshot {
                reason: format!("failed to retain previous snapshot as .bak: {e}"),
            })?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| GridError::CorruptSnapshot {
            reason: format!("failed to atomically replace snapshot file: {e}"),
        })?;

        info!(instance_id = %state.instance_id, path = %self.path.display(), "persisted grid snapshot");
        Ok(())
    }

    /// Deletes the snapshot and its `.bak`, if present. Used by the
    /// operator `teardown` command (spec §6); there is no undo, which is
    /// why `resume` is deliberately unsupported — a torn-down instance
    /// has no snapshot left to resume from.
    pub fn delete(&self) -> Result<(), GridError> {
        for path in [&self.path, &self.bak_path(), &self.tmp_path()] {
            if path.exists() {
                fs::remove_file(path).map_err(|e| GridError::CorruptSnapshot {
                    reason: format!("failed to delete snapshot file {}: {e}", path.display()),
                })?;
            }
        }
        Ok(())
    }

    /// Loads the snapshot at `path`, if present. Returns `Ok(None)` when no
    /// snapshot exists yet (a fresh instance). An unreadable or
    /// unparseable primary file falls back to the `.bak` copy before giving
    /// up, since the primary write path only ever replaces a known-good
    /// file with a fully-written temp file.
    pub fn load(&self) -> Result<Option<GridState>, GridError> {
        if !self.path.exists() {
            return Ok(None);
        }
        match self.load_from(&self.path) {
            Ok(state) => Ok(Some(state)),
            Err(primary_err) => {
                warn!(error = %primary_err, "primary snapshot unreadable, attempting .bak");
                let bak = self.bak_path();
                if bak.exists() {
                    self.load_from(&bak).map(Some)
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    fn load_from(&self, path: &Path) -> Result<GridState, GridError> {
        let contents = fs::read_to_string(path).map_err(|e| GridError::CorruptSnapshot {
            reason: format!("failed to read snapshot file {}: {e}", path.display()),
        })?;
        let state: GridState =
            serde_json::from_str(&contents).map_err(|e| GridError::CorruptSnapshot {
                reason: format!("failed to parse snapshot file {}: {e}", path.display()),
            })?;
        if state.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(GridError::UnsupportedSchemaVersion {
                found: state.schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(state)
    }
}
