//! Secret records and the decrypted vault document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::envelope::VAULT_FORMAT_VERSION;

/// One named credential. The plaintext value is wiped when the record drops.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1, bumped by exactly one on every mutation
    pub version: u64,
}

impl SecretRecord {
    pub fn new(key: &str, value: &str, description: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Replace the value (and the description, when given) and bump the version.
    pub fn apply_update(&mut self, value: &str, description: Option<&str>, now: DateTime<Utc>) {
        self.value.zeroize();
        self.value = value.to_string();
        if let Some(d) = description {
            self.description = Some(d.to_string());
        }
        self.updated_at = now.max(self.created_at);
        self.version += 1;
    }

    pub fn summary(&self) -> SecretSummary {
        SecretSummary {
            key: self.key.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

impl Drop for SecretRecord {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .field("description", &self.description)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("version", &self.version)
            .finish()
    }
}

/// Record metadata without the value, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSummary {
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    /// Vault format version
    pub version: u32,
    /// Hex KDF salt; fixed for the lifetime of the vault
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of secrets at last save
    pub key_count: usize,
}

/// The full decrypted content of one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDocument {
    pub metadata: VaultMetadata,
    pub secrets: BTreeMap<String, SecretRecord>,
}

impl VaultDocument {
    pub fn new(salt_hex: String, now: DateTime<Utc>) -> Self {
        Self {
            metadata: VaultMetadata {
                version: VAULT_FORMAT_VERSION,
                salt: salt_hex,
                created_at: now,
                updated_at: now,
                key_count: 0,
            },
            secrets: BTreeMap::new(),
        }
    }

    /// Refresh `updatedAt` and `keyCount` ahead of sealing.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.updated_at = now.max(self.metadata.created_at);
        self.metadata.key_count = self.secrets.len();
    }
}
