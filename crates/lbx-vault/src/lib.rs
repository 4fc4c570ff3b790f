//! lbx-vault: the encrypted, file-backed secret store
//!
//! One vault is one JSON file holding a sealed [`VaultDocument`]:
//!
//! ```text
//! { "encrypted": hex, "iv": hex, "authTag": hex,
//!   "metadata": { "version": 1, "createdAt": ISO-8601, "salt": hex } }
//! ```
//!
//! [`VaultStore`] owns the decrypted document and the derived key while
//! unlocked. Every mutating call re-seals and atomically rewrites the file
//! before returning.

pub mod envelope;
pub mod interchange;
pub mod record;
pub mod store;

pub use envelope::{kdf_params, EnvelopeMetadata, SealedVault, VAULT_FORMAT_VERSION};
pub use interchange::ExportFormat;
pub use record::{SecretRecord, SecretSummary, VaultDocument, VaultMetadata};
pub use store::{VaultState, VaultStore};
