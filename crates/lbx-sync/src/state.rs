//! Outcome of the last reconciliation, kept in `<dir>/.<vault file>.sync-state.json`.
//!
//! Written after every attempt; read by `sync_status` to decide between
//! synced, pending, conflict and error without contacting the provider.

use chrono::{DateTime, Utc};
use lbx_core::{LockboxError, LockboxResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::sidecar_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatusKind {
    Synced,
    /// Local edits newer than the last successful sync
    Pending,
    Conflict,
    Error,
    /// Sync not configured or disabled
    Disconnected,
}

impl std::fmt::Display for SyncStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Time of the last successful reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// `synced`, `conflict` or `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<SyncStatusKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Remote version number after the last successful reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<u64>,
}

impl SyncState {
    pub fn path_for(vault_path: &Path) -> PathBuf {
        sidecar_path(vault_path, "sync-state.json")
    }

    /// Load the state file; a vault never synced has the default state.
    pub fn load(vault_path: &Path) -> LockboxResult<Self> {
        let path = Self::path_for(vault_path);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| LockboxError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn save(&self, vault_path: &Path) -> LockboxResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        lbx_core::fs::atomic_write(&Self::path_for(vault_path), &json)?;
        Ok(())
    }

    pub fn remove(vault_path: &Path) -> LockboxResult<()> {
        match std::fs::remove_file(Self::path_for(vault_path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>, remote_version: Option<u64>) {
        self.last_sync = Some(at);
        self.last_status = Some(SyncStatusKind::Synced);
        self.last_error = None;
        if remote_version.is_some() {
            self.remote_version = remote_version;
        }
    }

    /// `last_sync` is left alone: the last good sync is still the last good sync.
    pub fn record_conflict(&mut self) {
        self.last_status = Some(SyncStatusKind::Conflict);
        self.last_error = None;
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_status = Some(SyncStatusKind::Error);
        self.last_error = Some(error.to_string());
    }
}
