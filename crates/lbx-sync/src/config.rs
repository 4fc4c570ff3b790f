//! Per-vault sync sidecar: `<dir>/.<vault file>.sync.json`

use lbx_core::{LockboxError, LockboxResult};
use lbx_storage::Credentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What `sync_vault` does when both sides changed at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Raise `SyncConflictError` and touch nothing
    #[default]
    Manual,
    LocalWins,
    RemoteWins,
    /// Currently uploads local; there is no per-secret merge
    Merge,
}

impl std::str::FromStr for ConflictResolution {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "local-wins" => Ok(Self::LocalWins),
            "remote-wins" => Ok(Self::RemoteWins),
            "merge" => Ok(Self::Merge),
            other => Err(LockboxError::Config(format!(
                "unknown conflict resolution '{other}' (expected manual, local-wins, remote-wins or merge)"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncConfig {
    pub enabled: bool,
    /// Registry name of the provider
    pub provider: String,
    /// Remote identifier of this vault within the provider
    pub vault_id: String,
    #[serde(default)]
    pub auto_sync: bool,
    /// Auto-sync period in seconds
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_sync_interval() -> u64 {
    300
}

impl std::fmt::Debug for VaultSyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSyncConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("vault_id", &self.vault_id)
            .field("auto_sync", &self.auto_sync)
            .field("sync_interval", &self.sync_interval)
            .field("conflict_resolution", &self.conflict_resolution)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VaultSyncConfig {
    pub fn new(provider: impl Into<String>, vault_id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            provider: provider.into(),
            vault_id: vault_id.into(),
            auto_sync: false,
            sync_interval: default_sync_interval(),
            conflict_resolution: ConflictResolution::default(),
            credentials: Credentials::new(),
        }
    }

    /// Sidecar location for the vault at `vault_path`.
    pub fn path_for(vault_path: &Path) -> PathBuf {
        sidecar_path(vault_path, "sync.json")
    }

    /// Read the sidecar; `None` when the vault has never had sync enabled.
    pub fn load(vault_path: &Path) -> LockboxResult<Option<Self>> {
        let path = Self::path_for(vault_path);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LockboxError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Atomically write the sidecar, readable by the owner only.
    pub fn save(&self, vault_path: &Path) -> LockboxResult<()> {
        let path = Self::path_for(vault_path);
        lbx_core::fs::atomic_write_private(&path, &serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Delete the sidecar. Returns whether one existed.
    pub fn remove(vault_path: &Path) -> LockboxResult<bool> {
        match std::fs::remove_file(Self::path_for(vault_path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// `<dir>/.<file name>.<suffix>`
pub(crate) fn sidecar_path(vault_path: &Path, suffix: &str) -> PathBuf {
    let name = vault_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "vault".to_string());
    vault_path.with_file_name(format!(".{name}.{suffix}"))
}
