//! Sealed vault envelope: the exact on-disk and on-cloud JSON shape.

use chrono::{DateTime, Utc};
use lbx_core::{LockboxError, LockboxResult};
use lbx_crypto::{KdfParams, SealedPayload, VaultKey, SALT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroizing;

use crate::record::VaultDocument;

/// Highest vault format version this build reads and the one it writes.
pub const VAULT_FORMAT_VERSION: u32 = 1;

/// Argon2id cost parameters of a vault format version.
///
/// The envelope records only the format version, so these are fixed per
/// version: every device derives the same key from the same password.
pub fn kdf_params(version: u32) -> LockboxResult<KdfParams> {
    match version {
        1 => Ok(KdfParams {
            mem_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }),
        other => Err(LockboxError::Format(format!(
            "unsupported vault format version {other}"
        ))),
    }
}

/// Unencrypted envelope metadata: everything needed to re-derive the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Hex KDF salt
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedVault {
    /// Hex AES-256-GCM ciphertext of the JSON vault document
    pub encrypted: String,
    /// Hex 96-bit IV, fresh for every save
    pub iv: String,
    /// Hex GCM tag
    pub auth_tag: String,
    pub metadata: EnvelopeMetadata,
}

impl SealedVault {
    /// Serialize and encrypt a document under `key`.
    pub fn seal(document: &VaultDocument, key: &VaultKey) -> LockboxResult<Self> {
        let plaintext = Zeroizing::new(serde_json::to_vec(document)?);
        let payload = lbx_crypto::encrypt(&plaintext, key)
            .map_err(|e| LockboxError::Other(anyhow::anyhow!("sealing vault: {e}")))?;
        let (encrypted, iv, auth_tag) = payload.to_hex();

        Ok(Self {
            encrypted,
            iv,
            auth_tag,
            metadata: EnvelopeMetadata {
                version: VAULT_FORMAT_VERSION,
                created_at: document.metadata.created_at,
                salt: document.metadata.salt.clone(),
            },
        })
    }

    /// Decrypt and parse the document.
    ///
    /// Every failure past the format check maps to [`LockboxError::InvalidKey`]:
    /// a plaintext that fails to parse, or whose salt disagrees with the
    /// envelope, is as untrustworthy as one that fails authentication.
    pub fn open(&self, key: &VaultKey) -> LockboxResult<VaultDocument> {
        let payload = SealedPayload::from_hex(&self.encrypted, &self.iv, &self.auth_tag)
            .map_err(|_| LockboxError::InvalidKey)?;
        let plaintext = Zeroizing::new(
            lbx_crypto::decrypt(&payload, key).map_err(|_| LockboxError::InvalidKey)?,
        );

        let document: VaultDocument =
            serde_json::from_slice(&plaintext).map_err(|_| LockboxError::InvalidKey)?;
        if document.metadata.salt != self.metadata.salt {
            return Err(LockboxError::InvalidKey);
        }
        Ok(document)
    }

    /// Decode the envelope salt.
    pub fn salt_bytes(&self) -> LockboxResult<[u8; SALT_SIZE]> {
        let raw = hex::decode(&self.metadata.salt).map_err(|_| LockboxError::InvalidKey)?;
        raw.try_into().map_err(|_| LockboxError::InvalidKey)
    }

    /// Key derivation parameters this envelope was sealed with.
    pub fn kdf_params(&self) -> LockboxResult<KdfParams> {
        kdf_params(self.metadata.version)
    }

    /// Read and parse a sealed vault file.
    pub fn read(path: &Path) -> LockboxResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockboxError::VaultNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> LockboxResult<Self> {
        let sealed: SealedVault =
            serde_json::from_slice(bytes).map_err(|_| LockboxError::InvalidKey)?;
        if sealed.metadata.version > VAULT_FORMAT_VERSION {
            return Err(LockboxError::Format(format!(
                "unsupported vault format version {} (this build reads up to {})",
                sealed.metadata.version, VAULT_FORMAT_VERSION
            )));
        }
        Ok(sealed)
    }

    /// Atomically write the envelope to `path`.
    pub fn write(&self, path: &Path) -> LockboxResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        lbx_core::fs::atomic_write(path, &json)?;
        Ok(())
    }

    /// Read only the unencrypted metadata of a vault file; no password needed.
    pub fn read_metadata(path: &Path) -> LockboxResult<EnvelopeMetadata> {
        Ok(Self::read(path)?.metadata)
    }
}
