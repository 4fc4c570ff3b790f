//! Sync engine: decide and execute upload / download / nothing for one vault.
//!
//! Steps run strictly in sequence: load sidecar → authenticate → existence
//! checks → metadata comparison → action. Every failure except a manual-mode
//! conflict is folded into a failed [`SyncResult`] so batch and background
//! callers keep going.

use chrono::{DateTime, Utc};
use lbx_core::{LockboxError, LockboxResult};
use lbx_storage::{CloudProvider, ProviderRegistry, RemoteMetadata, VersionInfo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{ConflictResolution, VaultSyncConfig};
use crate::conflict::{compare, Conflict, Resolution, SyncConflictError, SyncOutcome};
use crate::state::{SyncState, SyncStatusKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Upload,
    Download,
    None,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::None => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub action: SyncAction,
    /// Remote version number after the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    fn done(action: SyncAction, version: Option<u64>) -> Self {
        Self {
            success: true,
            action,
            version,
            error: None,
            timestamp: lbx_core::fs::now_millis(),
        }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            action: SyncAction::None,
            version: None,
            error: Some(error.to_string()),
            timestamp: lbx_core::fs::now_millis(),
        }
    }
}

/// Read-only sync summary for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub configured: bool,
    pub enabled: bool,
    pub provider: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub status: SyncStatusKind,
    pub last_error: Option<String>,
}

enum Reconciled {
    Applied {
        action: SyncAction,
        version: Option<u64>,
    },
    Conflict(Conflict),
}

/// A local sealed blob with its comparison metadata.
struct LocalBlob {
    data: Vec<u8>,
    metadata: RemoteMetadata,
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    registry: ProviderRegistry,
    author: Option<String>,
}

impl SyncEngine {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            author: None,
        }
    }

    /// Name recorded as `author` on every upload.
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Reconcile one vault with its remote copy.
    ///
    /// Returns `Err` only for a conflict under `manual` resolution; in that
    /// case neither the local file nor the remote blob has been touched.
    pub async fn sync_vault(&self, vault_path: &Path) -> Result<SyncResult, SyncConflictError> {
        let cfg = match VaultSyncConfig::load(vault_path) {
            Ok(Some(cfg)) if cfg.enabled => cfg,
            Ok(_) => {
                debug!(vault = %vault_path.display(), "sync not enabled, skipping");
                return Ok(SyncResult::done(SyncAction::None, None));
            }
            Err(e) => return Ok(SyncResult::failed(e)),
        };

        match self.reconcile(vault_path, &cfg, None).await {
            Ok(Reconciled::Applied { action, version }) => {
                self.record(vault_path, |s| s.record_success(lbx_core::fs::now_millis(), version));
                info!(vault = %vault_path.display(), %action, ?version, "vault synced");
                Ok(SyncResult::done(action, version))
            }
            Ok(Reconciled::Conflict(conflict)) => {
                self.record(vault_path, SyncState::record_conflict);
                warn!(
                    vault = %vault_path.display(),
                    vault_id = %conflict.vault_id,
                    "sync conflict: both copies changed, manual resolution required"
                );
                Err(SyncConflictError(Box::new(conflict)))
            }
            Err(e) => Ok(self.fail(vault_path, e)),
        }
    }

    /// Apply an explicit resolution chosen by the caller.
    pub async fn resolve_conflicts(&self, vault_path: &Path, strategy: Resolution) -> SyncResult {
        let cfg = match VaultSyncConfig::load(vault_path) {
            Ok(Some(cfg)) if cfg.enabled => cfg,
            Ok(_) => {
                return SyncResult::failed(LockboxError::NotConfigured(format!(
                    "sync is not enabled for {}",
                    vault_path.display()
                )))
            }
            Err(e) => return SyncResult::failed(e),
        };

        match self.reconcile(vault_path, &cfg, Some(strategy)).await {
            Ok(Reconciled::Applied { action, version }) => {
                self.record(vault_path, |s| s.record_success(lbx_core::fs::now_millis(), version));
                info!(vault = %vault_path.display(), ?strategy, %action, "conflict resolved");
                SyncResult::done(action, version)
            }
            // Forced resolutions never compare, so never conflict.
            Ok(Reconciled::Conflict(conflict)) => {
                SyncResult::failed(SyncConflictError(Box::new(conflict)))
            }
            Err(e) => self.fail(vault_path, e),
        }
    }

    /// Sync status from the sidecars and the local file's mtime. Never
    /// contacts the provider and never writes.
    pub fn sync_status(&self, vault_path: &Path) -> LockboxResult<SyncStatus> {
        let cfg = VaultSyncConfig::load(vault_path)?;
        let state = SyncState::load(vault_path)?;

        let status = match &cfg {
            None => SyncStatusKind::Disconnected,
            Some(c) if !c.enabled => SyncStatusKind::Disconnected,
            Some(_) => match state.last_status {
                Some(SyncStatusKind::Conflict) => SyncStatusKind::Conflict,
                Some(SyncStatusKind::Error) => SyncStatusKind::Error,
                _ => match state.last_sync {
                    None => SyncStatusKind::Pending,
                    Some(last) => match lbx_core::fs::modified_at(vault_path) {
                        Ok(mtime) if mtime <= last => SyncStatusKind::Synced,
                        _ => SyncStatusKind::Pending,
                    },
                },
            },
        };

        Ok(SyncStatus {
            configured: cfg.is_some(),
            enabled: cfg.as_ref().map(|c| c.enabled).unwrap_or(false),
            provider: cfg.map(|c| c.provider),
            last_sync: state.last_sync,
            status,
            last_error: state.last_error,
        })
    }

    /// Write the sidecar, enabling sync for the vault.
    pub fn enable_sync(&self, vault_path: &Path, mut config: VaultSyncConfig) -> LockboxResult<()> {
        if !self.registry.contains(&config.provider) {
            return Err(LockboxError::UnknownProvider(config.provider));
        }
        if config.vault_id.trim().is_empty() {
            return Err(LockboxError::Config("vaultId must not be empty".into()));
        }
        config.enabled = true;
        config.save(vault_path)?;
        info!(
            vault = %vault_path.display(),
            provider = %config.provider,
            vault_id = %config.vault_id,
            "sync enabled"
        );
        Ok(())
    }

    /// Remove both sidecars. The remote copy is left alone.
    pub fn disable_sync(&self, vault_path: &Path) -> LockboxResult<()> {
        let existed = VaultSyncConfig::remove(vault_path)?;
        SyncState::remove(vault_path)?;
        if existed {
            info!(vault = %vault_path.display(), "sync disabled");
        }
        Ok(())
    }

    /// Upload history of the vault's remote copy.
    pub async fn list_remote_versions(&self, vault_path: &Path) -> LockboxResult<Vec<VersionInfo>> {
        let cfg = VaultSyncConfig::load(vault_path)?.ok_or_else(|| {
            LockboxError::NotConfigured(format!("no sync config for {}", vault_path.display()))
        })?;
        let provider = self.connect(&cfg).await?;
        provider.list_versions(&cfg.vault_id).await
    }

    /// Sync several vaults one after another. A failure or conflict in one
    /// does not stop the rest.
    pub async fn sync_all(
        &self,
        vault_paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<SyncResult, SyncConflictError>)> {
        let mut results = Vec::with_capacity(vault_paths.len());
        for path in vault_paths {
            let result = self.sync_vault(path).await;
            results.push((path.clone(), result));
        }
        results
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn connect(&self, cfg: &VaultSyncConfig) -> LockboxResult<Box<dyn CloudProvider>> {
        let mut provider = self.registry.create(&cfg.provider)?;
        provider.authenticate(&cfg.credentials).await?;
        Ok(provider)
    }

    async fn reconcile(
        &self,
        vault_path: &Path,
        cfg: &VaultSyncConfig,
        forced: Option<Resolution>,
    ) -> LockboxResult<Reconciled> {
        let provider = self.connect(cfg).await?;
        let provider = provider.as_ref();
        let remote_id = cfg.vault_id.as_str();

        if let Some(strategy) = forced {
            return match strategy {
                Resolution::Local => self.push(provider, vault_path, remote_id).await,
                Resolution::Remote => self.pull(provider, vault_path, remote_id).await,
                Resolution::Merge => self.merge(provider, vault_path, remote_id).await,
            };
        }

        if !vault_path.exists() {
            return match self.pull(provider, vault_path, remote_id).await {
                Err(LockboxError::VaultNotFound(_)) => Err(LockboxError::VaultNotFound(
                    "vault not found locally or remotely".into(),
                )),
                other => other,
            };
        }

        if !provider.exists(remote_id).await? {
            debug!(remote_id, "remote vault missing, creating it");
            return self.push(provider, vault_path, remote_id).await;
        }

        let local = self.read_local(vault_path)?;
        let remote = provider.get_metadata(remote_id).await?;

        match compare(&local.metadata, &remote) {
            SyncOutcome::LocalNewer => self.upload(provider, remote_id, local).await,
            SyncOutcome::RemoteNewer => self.pull(provider, vault_path, remote_id).await,
            SyncOutcome::UpToDate => Ok(Reconciled::Applied {
                action: SyncAction::None,
                version: Some(remote.version),
            }),
            SyncOutcome::Conflict => match cfg.conflict_resolution {
                ConflictResolution::Manual => Ok(Reconciled::Conflict(Conflict::content(
                    remote_id,
                    local.metadata,
                    remote,
                ))),
                ConflictResolution::LocalWins => self.upload(provider, remote_id, local).await,
                ConflictResolution::RemoteWins => self.pull(provider, vault_path, remote_id).await,
                ConflictResolution::Merge => self.merge(provider, vault_path, remote_id).await,
            },
        }
    }

    fn read_local(&self, vault_path: &Path) -> LockboxResult<LocalBlob> {
        let data = match std::fs::read(vault_path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockboxError::VaultNotFound(vault_path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = lbx_core::fs::modified_at(vault_path)?;
        let metadata = RemoteMetadata::for_blob(&data, mtime).with_author(self.author.clone());
        Ok(LocalBlob { data, metadata })
    }

    async fn push(
        &self,
        provider: &dyn CloudProvider,
        vault_path: &Path,
        remote_id: &str,
    ) -> LockboxResult<Reconciled> {
        let local = self.read_local(vault_path)?;
        self.upload(provider, remote_id, local).await
    }

    /// Upload with the local mtime as the remote `lastModified`, so the next
    /// comparison sees equal timestamps and equal checksums.
    async fn upload(
        &self,
        provider: &dyn CloudProvider,
        remote_id: &str,
        local: LocalBlob,
    ) -> LockboxResult<Reconciled> {
        provider.upload(remote_id, &local.data, &local.metadata).await?;
        let remote = provider.get_metadata(remote_id).await?;
        Ok(Reconciled::Applied {
            action: SyncAction::Upload,
            version: Some(remote.version),
        })
    }

    /// Replace the local file with the remote blob, then stamp it with the
    /// remote `lastModified`.
    async fn pull(
        &self,
        provider: &dyn CloudProvider,
        vault_path: &Path,
        remote_id: &str,
    ) -> LockboxResult<Reconciled> {
        let remote = provider.download(remote_id).await?;
        lbx_core::fs::atomic_write(vault_path, &remote.data)?;
        lbx_core::fs::set_modified_at(vault_path, remote.metadata.last_modified)?;
        Ok(Reconciled::Applied {
            action: SyncAction::Download,
            version: Some(remote.metadata.version),
        })
    }

    // TODO: per-secret merge; needs both copies unlocked. Keeps the local blob.
    async fn merge(
        &self,
        provider: &dyn CloudProvider,
        vault_path: &Path,
        remote_id: &str,
    ) -> LockboxResult<Reconciled> {
        warn!(
            vault = %vault_path.display(),
            "merge is not implemented for sealed vaults; keeping the local copy"
        );
        self.push(provider, vault_path, remote_id).await
    }

    fn fail(&self, vault_path: &Path, error: LockboxError) -> SyncResult {
        warn!(
            vault = %vault_path.display(),
            retryable = error.is_retryable(),
            "sync failed: {error}"
        );
        let message = error.to_string();
        self.record(vault_path, |s| s.record_error(&message));
        SyncResult::failed(message)
    }

    /// Update the state sidecar. Failing to record state never fails the sync.
    fn record(&self, vault_path: &Path, update: impl FnOnce(&mut SyncState)) {
        let mut state = SyncState::load(vault_path).unwrap_or_else(|e| {
            warn!(vault = %vault_path.display(), "discarding unreadable sync state: {e}");
            SyncState::default()
        });
        update(&mut state);
        if let Err(e) = state.save(vault_path) {
            warn!(vault = %vault_path.display(), "failed to write sync state: {e}");
        }
    }
}
