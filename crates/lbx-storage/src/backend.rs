//! [`CloudProvider`] over any OpenDAL service.
//!
//! Remote layout, per vault id:
//!
//! ```text
//! <id>/blobs/<version-id>.json   sealed blob, byte-identical to the local file
//! <id>/metadata.json             RemoteMetadata of the current blob + its version id
//! <id>/versions.json             [VersionInfo], oldest first
//! ```
//!
//! An upload stages the new blob under its own key and then rewrites
//! `metadata.json`. Readers only reach blobs through `metadata.json`, so until
//! that single write lands the previous version stays fully visible.

use async_trait::async_trait;
use lbx_core::{LockboxError, LockboxResult};
use opendal::{ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::health;
use crate::operator::{build_operator, BackendConfig};
use crate::provider::{checksum, CloudProvider, Credentials, RemoteMetadata, RemoteVault, VersionInfo};

const BLOB_DIR: &str = "blobs";
const METADATA_FILE: &str = "metadata.json";
const VERSIONS_FILE: &str = "versions.json";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Head {
    version_id: String,
    #[serde(flatten)]
    metadata: RemoteMetadata,
}

#[derive(Debug)]
pub struct OpendalProvider {
    name: String,
    operator: Option<Operator>,
    /// Operator supplied by the caller; `authenticate` checks it instead of
    /// building a new one.
    injected: bool,
}

impl OpendalProvider {
    /// Unauthenticated provider for backend `name` (`s3`, `azblob`, `fs`, `memory`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator: None,
            injected: false,
        }
    }

    /// Provider over an existing operator, e.g. a shared in-memory store.
    pub fn with_operator(name: impl Into<String>, operator: Operator) -> Self {
        Self {
            name: name.into(),
            operator: Some(operator),
            injected: true,
        }
    }

    fn op(&self) -> LockboxResult<&Operator> {
        self.operator
            .as_ref()
            .ok_or_else(|| LockboxError::NotConfigured(self.name.clone()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> LockboxResult<T> {
        let buf = self
            .op()?
            .read(path)
            .await
            .map_err(|e| map_opendal_error(e, path))?;
        serde_json::from_slice(&buf.to_vec())
            .map_err(|e| LockboxError::Format(format!("{}: {path}: {e}", self.name)))
    }

    async fn write_json<T: serde::Serialize>(&self, path: &str, value: &T) -> LockboxResult<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.op()?
            .write(path, body)
            .await
            .map_err(|e| map_opendal_error(e, path))?;
        Ok(())
    }

    async fn read_head(&self, remote_id: &str) -> LockboxResult<Option<Head>> {
        match self.read_json(&key(remote_id, METADATA_FILE)?).await {
            Ok(head) => Ok(Some(head)),
            Err(LockboxError::VaultNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_versions(&self, remote_id: &str) -> LockboxResult<Vec<VersionInfo>> {
        match self.read_json(&key(remote_id, VERSIONS_FILE)?).await {
            Ok(v) => Ok(v),
            Err(LockboxError::VaultNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Write blob bytes under their version key. Not visible to readers
    /// until `metadata.json` names the version.
    async fn stage_blob(&self, path: &str, data: &[u8]) -> LockboxResult<()> {
        self.op()?
            .write(path, data.to_vec())
            .await
            .map_err(|e| map_opendal_error(e, path))?;
        Ok(())
    }

    /// Best-effort removal of a blob nothing points at any more.
    async fn discard_blob(&self, path: &str) {
        let Ok(op) = self.op() else { return };
        if let Err(e) = op.delete(path).await {
            warn!(provider = %self.name, path, "failed to remove unreferenced blob: {e}");
        }
    }
}

#[async_trait]
impl CloudProvider for OpendalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> LockboxResult<()> {
        if !self.injected {
            let cfg = BackendConfig::from_credentials(&self.name, credentials)?;
            self.operator = Some(build_operator(&cfg)?);
        }

        if let Err(e) = health::check_health(self.op()?).await {
            if !self.injected {
                self.operator = None;
            }
            return Err(e);
        }
        debug!(provider = %self.name, "provider authenticated");
        Ok(())
    }

    async fn is_configured(&self) -> bool {
        match &self.operator {
            Some(op) => health::is_healthy(op).await,
            None => false,
        }
    }

    async fn upload(
        &self,
        remote_id: &str,
        data: &[u8],
        metadata: &RemoteMetadata,
    ) -> LockboxResult<String> {
        let head_key = key(remote_id, METADATA_FILE)?;
        let previous = self.read_head(remote_id).await?;
        let mut history = self.read_versions(remote_id).await?;

        // The head is authoritative; history may lag it after a partial upload.
        let version = previous
            .as_ref()
            .map(|h| h.metadata.version)
            .into_iter()
            .chain(history.last().map(|v| v.version))
            .max()
            .unwrap_or(0)
            + 1;
        let version_id = uuid::Uuid::new_v4().to_string();
        let staged = blob_key(remote_id, &version_id)?;

        let head = Head {
            version_id,
            metadata: RemoteMetadata {
                version,
                last_modified: metadata.last_modified,
                checksum: checksum(data),
                size: data.len() as u64,
                author: metadata.author.clone(),
                description: metadata.description.clone(),
            },
        };

        self.stage_blob(&staged, data).await?;
        if let Err(e) = self.write_json(&head_key, &head).await {
            self.discard_blob(&staged).await;
            return Err(e);
        }

        history.push(VersionInfo {
            version_id: head.version_id.clone(),
            version,
            last_modified: head.metadata.last_modified,
            checksum: head.metadata.checksum.clone(),
            size: head.metadata.size,
            author: head.metadata.author.clone(),
        });
        if let Err(e) = self
            .write_json(&key(remote_id, VERSIONS_FILE)?, &history)
            .await
        {
            warn!(provider = %self.name, remote_id, version, "version history not updated: {e}");
        }

        if let Some(prev) = previous {
            if let Ok(prev_key) = blob_key(remote_id, &prev.version_id) {
                self.discard_blob(&prev_key).await;
            }
        }

        info!(
            provider = %self.name,
            remote_id,
            version,
            bytes = head.metadata.size,
            "uploaded vault"
        );
        Ok(head.version_id)
    }

    async fn download(&self, remote_id: &str) -> LockboxResult<RemoteVault> {
        let head = self
            .read_head(remote_id)
            .await?
            .ok_or_else(|| LockboxError::VaultNotFound(remote_id.to_string()))?;
        let path = blob_key(remote_id, &head.version_id)?;
        let data = self
            .op()?
            .read(&path)
            .await
            .map_err(|e| map_opendal_error(e, remote_id))?
            .to_vec();

        if head.metadata.checksum != checksum(&data) {
            return Err(LockboxError::Network(format!(
                "{remote_id}: downloaded blob does not match its metadata checksum"
            )));
        }

        info!(
            provider = %self.name,
            remote_id,
            version = head.metadata.version,
            bytes = data.len(),
            "downloaded vault"
        );
        Ok(RemoteVault {
            data,
            metadata: head.metadata,
        })
    }

    async fn exists(&self, remote_id: &str) -> LockboxResult<bool> {
        let head_key = key(remote_id, METADATA_FILE)?;
        self.op()?
            .exists(&head_key)
            .await
            .map_err(|e| map_opendal_error(e, remote_id))
    }

    async fn get_metadata(&self, remote_id: &str) -> LockboxResult<RemoteMetadata> {
        self.read_head(remote_id)
            .await?
            .map(|head| head.metadata)
            .ok_or_else(|| LockboxError::VaultNotFound(remote_id.to_string()))
    }

    async fn list_versions(&self, remote_id: &str) -> LockboxResult<Vec<VersionInfo>> {
        if !self.exists(remote_id).await? {
            return Err(LockboxError::VaultNotFound(remote_id.to_string()));
        }
        self.read_versions(remote_id).await
    }

    async fn delete(&self, remote_id: &str) -> LockboxResult<()> {
        let head = self
            .read_head(remote_id)
            .await?
            .ok_or_else(|| LockboxError::VaultNotFound(remote_id.to_string()))?;
        let history = self.read_versions(remote_id).await?;
        let op = self.op()?;

        // Unpublish first; leftovers after a failure are unreachable blobs.
        let mut paths = vec![key(remote_id, METADATA_FILE)?];
        paths.push(blob_key(remote_id, &head.version_id)?);
        for v in &history {
            if let Ok(path) = blob_key(remote_id, &v.version_id) {
                paths.push(path);
            }
        }
        paths.push(key(remote_id, VERSIONS_FILE)?);

        for path in &paths {
            op.delete(path)
                .await
                .map_err(|e| map_opendal_error(e, path))?;
        }
        info!(provider = %self.name, remote_id, "deleted remote vault");
        Ok(())
    }
}

/// Object key of one stored blob. The version id comes from remote JSON, so
/// it must parse as a UUID before it becomes part of a path.
fn blob_key(remote_id: &str, version_id: &str) -> LockboxResult<String> {
    let id = uuid::Uuid::parse_str(version_id).map_err(|_| {
        LockboxError::Format(format!("{remote_id}: invalid blob version id {version_id:?}"))
    })?;
    key(remote_id, &format!("{BLOB_DIR}/{id}.json"))
}

/// Object key for `file` under a vault id.
fn key(remote_id: &str, file: &str) -> LockboxResult<String> {
    let id = remote_id.trim_matches('/');
    if id.is_empty() || id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(LockboxError::Format(format!(
            "invalid remote vault id: {remote_id:?}"
        )));
    }
    Ok(format!("{id}/{file}"))
}

/// Classify an OpenDAL error into the retryable/terminal kinds the reconciler sees.
pub(crate) fn map_opendal_error(err: opendal::Error, what: &str) -> LockboxError {
    match err.kind() {
        ErrorKind::NotFound => LockboxError::VaultNotFound(what.to_string()),
        ErrorKind::PermissionDenied => LockboxError::Authentication(err.to_string()),
        ErrorKind::ConfigInvalid => LockboxError::Config(err.to_string()),
        _ => LockboxError::Network(err.to_string()),
    }
}
