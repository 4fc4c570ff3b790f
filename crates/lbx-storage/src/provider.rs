//! The capability set every remote vault backend provides.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lbx_core::LockboxResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Provider credentials as stored in a vault's sync sidecar.
pub type Credentials = BTreeMap<String, String>;

/// Comparison record for one copy of a sealed vault blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMetadata {
    /// Sequential upload number on the remote; 0 for a local copy
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the blob bytes
    pub checksum: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RemoteMetadata {
    /// Metadata describing `data` as last modified at `last_modified`.
    pub fn for_blob(data: &[u8], last_modified: DateTime<Utc>) -> Self {
        Self {
            version: 0,
            last_modified,
            checksum: checksum(data),
            size: data.len() as u64,
            author: None,
            description: None,
        }
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }
}

/// One entry of a remote vault's upload history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version_id: String,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub checksum: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A downloaded sealed blob plus its metadata record.
#[derive(Debug, Clone)]
pub struct RemoteVault {
    pub data: Vec<u8>,
    pub metadata: RemoteMetadata,
}

/// Hex SHA-256 of a sealed blob.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Remote blob storage for sealed vaults.
///
/// Implementations never see plaintext. Transport failures surface as
/// `LockboxError::Network`, rejected credentials as
/// `LockboxError::Authentication`, a missing remote vault as
/// `LockboxError::VaultNotFound`.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Registry name, e.g. `"s3"`.
    fn name(&self) -> &str;

    /// Validate and store credentials.
    async fn authenticate(&mut self, credentials: &Credentials) -> LockboxResult<()>;

    /// Authenticated and reachable right now. Checks the backend on every call.
    async fn is_configured(&self) -> bool;

    /// Store (or overwrite) the blob under `remote_id`. Returns the new version id.
    async fn upload(
        &self,
        remote_id: &str,
        data: &[u8],
        metadata: &RemoteMetadata,
    ) -> LockboxResult<String>;

    async fn download(&self, remote_id: &str) -> LockboxResult<RemoteVault>;

    async fn exists(&self, remote_id: &str) -> LockboxResult<bool>;

    /// Metadata only, without fetching the blob.
    async fn get_metadata(&self, remote_id: &str) -> LockboxResult<RemoteMetadata>;

    /// Upload history, oldest first.
    async fn list_versions(&self, remote_id: &str) -> LockboxResult<Vec<VersionInfo>>;

    async fn delete(&self, remote_id: &str) -> LockboxResult<()>;
}
