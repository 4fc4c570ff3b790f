//! Vault lifecycle: initialize, unlock, CRUD, export/import, lock.
//!
//! ```text
//! Uninitialized ──initialize/load──▶ Unlocked ──clear_master_key──▶ Locked
//!                                       ▲                              │
//!                                       └────────────load──────────────┘
//! ```
//!
//! The derived key and decrypted document live in a single `Session` value.
//! Dropping the session (lock, failed load, store dropped) wipes both.

use lbx_core::{LockboxError, LockboxResult};
use lbx_crypto::{KdfParams, VaultKey};
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::envelope::{self, SealedVault, VAULT_FORMAT_VERSION};
use crate::interchange::{self, ExportFormat};
use crate::record::{SecretRecord, SecretSummary, VaultDocument, VaultMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Uninitialized,
    Unlocked,
    Locked,
}

struct Session {
    key: VaultKey,
    document: VaultDocument,
}

impl Session {
    /// Refresh metadata, seal, and atomically replace the vault file.
    fn persist(&mut self, path: &Path) -> LockboxResult<()> {
        self.document.touch(lbx_core::fs::now_millis());
        let sealed = SealedVault::seal(&self.document, &self.key)?;
        sealed.write(path)?;
        debug!(
            path = %path.display(),
            keys = self.document.metadata.key_count,
            "vault saved"
        );
        Ok(())
    }
}

pub struct VaultStore {
    path: PathBuf,
    /// KDF cost override; `None` uses the parameters of the vault's format version
    params: Option<KdfParams>,
    session: Option<Session>,
    state: VaultState,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}

impl VaultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            params: None,
            session: None,
            state: VaultState::Uninitialized,
        }
    }

    /// Store that derives keys with `params` instead of the format's pinned
    /// parameters. Vaults it writes open only with the same override.
    #[doc(hidden)]
    pub fn with_params(path: impl Into<PathBuf>, params: KdfParams) -> Self {
        Self {
            params: Some(params),
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Whether a sealed vault file is present at the store's path.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Create a new, empty vault sealed under `password`.
    ///
    /// Overwrites whatever is at the path; confirming that is the caller's job.
    pub fn initialize(&mut self, password: &SecretString) -> LockboxResult<()> {
        if self.session.take().is_some() {
            self.state = VaultState::Locked;
        }

        let params = match &self.params {
            Some(p) => p.clone(),
            None => envelope::kdf_params(VAULT_FORMAT_VERSION)?,
        };
        let salt = lbx_crypto::generate_salt();
        let key = lbx_crypto::derive_key(password, &salt, &params)
            .map_err(|e| LockboxError::Other(anyhow::anyhow!("{e}")))?;

        let mut session = Session {
            key,
            document: VaultDocument::new(hex::encode(salt), lbx_core::fs::now_millis()),
        };
        session.persist(&self.path)?;

        self.session = Some(session);
        self.state = VaultState::Unlocked;
        info!(path = %self.path.display(), "vault initialized");
        Ok(())
    }

    /// Unlock the vault file with `password`.
    ///
    /// Any failure to derive, authenticate or parse is reported as
    /// [`LockboxError::InvalidKey`] and leaves no partial state behind.
    pub fn load(&mut self, password: &SecretString) -> LockboxResult<()> {
        if self.session.take().is_some() {
            self.state = VaultState::Locked;
        }

        let sealed = SealedVault::read(&self.path)?;
        let salt = sealed.salt_bytes()?;
        let params = match &self.params {
            Some(p) => p.clone(),
            None => sealed.kdf_params()?,
        };
        let key = lbx_crypto::derive_key(password, &salt, &params)
            .map_err(|_| LockboxError::InvalidKey)?;
        let document = sealed.open(&key)?;

        info!(
            path = %self.path.display(),
            keys = document.secrets.len(),
            "vault unlocked"
        );
        self.session = Some(Session { key, document });
        self.state = VaultState::Unlocked;
        Ok(())
    }

    /// Re-seal and write the current document.
    pub fn save(&mut self) -> LockboxResult<()> {
        let path = self.path.clone();
        self.session_mut()?.persist(&path)
    }

    /// Wipe the key and the decrypted document. `save` fails until the next
    /// `load` or `initialize`.
    pub fn clear_master_key(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.key.wipe();
            session.document.secrets.clear();
            self.state = VaultState::Locked;
            info!(path = %self.path.display(), "vault locked");
        }
    }

    pub fn add_secret(
        &mut self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> LockboxResult<()> {
        validate_key(key)?;
        let path = self.path.clone();
        let session = self.session_mut()?;

        if session.document.secrets.contains_key(key) {
            return Err(LockboxError::SecretAlreadyExists(key.to_string()));
        }
        session.document.secrets.insert(
            key.to_string(),
            SecretRecord::new(key, value, description, lbx_core::fs::now_millis()),
        );

        if let Err(e) = session.persist(&path) {
            session.document.secrets.remove(key);
            return Err(e);
        }
        info!(key, "secret added");
        Ok(())
    }

    /// Owned copy of a record; mutating it does not touch the store.
    pub fn get_secret(&self, key: &str) -> LockboxResult<SecretRecord> {
        self.session()?
            .document
            .secrets
            .get(key)
            .cloned()
            .ok_or_else(|| LockboxError::SecretNotFound(key.to_string()))
    }

    pub fn update_secret(
        &mut self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> LockboxResult<u64> {
        let path = self.path.clone();
        let session = self.session_mut()?;

        let record = session
            .document
            .secrets
            .get_mut(key)
            .ok_or_else(|| LockboxError::SecretNotFound(key.to_string()))?;
        let previous = record.clone();
        record.apply_update(value, description, lbx_core::fs::now_millis());
        let version = record.version;

        if let Err(e) = session.persist(&path) {
            session.document.secrets.insert(key.to_string(), previous);
            return Err(e);
        }
        info!(key, version, "secret updated");
        Ok(version)
    }

    pub fn remove_secret(&mut self, key: &str) -> LockboxResult<()> {
        let path = self.path.clone();
        let session = self.session_mut()?;

        let removed = session
            .document
            .secrets
            .remove(key)
            .ok_or_else(|| LockboxError::SecretNotFound(key.to_string()))?;

        if let Err(e) = session.persist(&path) {
            session.document.secrets.insert(key.to_string(), removed);
            return Err(e);
        }
        info!(key, "secret removed");
        Ok(())
    }

    pub fn has_secret(&self, key: &str) -> LockboxResult<bool> {
        Ok(self.session()?.document.secrets.contains_key(key))
    }

    pub fn len(&self) -> LockboxResult<usize> {
        Ok(self.session()?.document.secrets.len())
    }

    pub fn is_empty(&self) -> LockboxResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Secret keys in sorted order.
    pub fn list_secrets(&self) -> LockboxResult<Vec<String>> {
        Ok(self.session()?.document.secrets.keys().cloned().collect())
    }

    /// Metadata for every secret, values excluded.
    pub fn get_all_secrets(&self) -> LockboxResult<Vec<SecretSummary>> {
        Ok(self
            .session()?
            .document
            .secrets
            .values()
            .map(SecretRecord::summary)
            .collect())
    }

    pub fn metadata(&self) -> LockboxResult<VaultMetadata> {
        Ok(self.session()?.document.metadata.clone())
    }

    /// Dump all secrets in plaintext. The caller owns what happens next.
    pub fn export_secrets(&self, format: ExportFormat) -> LockboxResult<Zeroizing<String>> {
        let session = self.session()?;
        warn!(
            format = %format,
            keys = session.document.secrets.len(),
            "exporting secrets in plaintext"
        );
        interchange::export(&session.document.secrets, format)
    }

    /// Import entries from an interchange payload.
    ///
    /// Absent keys are added; present keys are updated only when `overwrite`
    /// is set, otherwise skipped. Returns the number of entries written.
    pub fn import_secrets(
        &mut self,
        data: &str,
        format: ExportFormat,
        overwrite: bool,
    ) -> LockboxResult<usize> {
        let entries = interchange::parse(data, format)?;
        for entry in &entries {
            validate_key(&entry.key)?;
        }

        let path = self.path.clone();
        let session = self.session_mut()?;
        let snapshot: BTreeMap<String, SecretRecord> = session.document.secrets.clone();
        let now = lbx_core::fs::now_millis();

        let mut imported = 0;
        for entry in entries {
            match session.document.secrets.get_mut(&entry.key) {
                None => {
                    session.document.secrets.insert(
                        entry.key.clone(),
                        SecretRecord::new(&entry.key, &entry.value, entry.description.as_deref(), now),
                    );
                    imported += 1;
                }
                Some(existing) if overwrite => {
                    existing.apply_update(&entry.value, entry.description.as_deref(), now);
                    imported += 1;
                }
                Some(_) => debug!(key = %entry.key, "import: skipping existing secret"),
            }
        }

        if imported > 0 {
            if let Err(e) = session.persist(&path) {
                session.document.secrets = snapshot;
                return Err(e);
            }
        }
        info!(imported, format = %format, overwrite, "secrets imported");
        Ok(imported)
    }

    fn session(&self) -> LockboxResult<&Session> {
        self.session.as_ref().ok_or(LockboxError::VaultLocked)
    }

    fn session_mut(&mut self) -> LockboxResult<&mut Session> {
        self.session.as_mut().ok_or(LockboxError::VaultLocked)
    }
}

fn validate_key(key: &str) -> LockboxResult<()> {
    if key.is_empty() || key.contains('=') || key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LockboxError::Format(format!(
            "invalid secret key {key:?}: must be non-empty without whitespace or '='"
        )));
    }
    Ok(())
}
