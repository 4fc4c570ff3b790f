//! lbx-sync: reconcile a local sealed vault file with its remote copy.
//!
//! The reconciler never opens a vault. It compares the sealed blob's SHA-256
//! and modification time against the remote metadata record and moves whole
//! blobs in one direction; both sides stay encrypted throughout.

pub mod auto;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod state;

pub use auto::AutoSync;
pub use config::{ConflictResolution, VaultSyncConfig};
pub use conflict::{Conflict, ConflictKind, Resolution, SyncConflictError, SyncOutcome};
pub use engine::{SyncAction, SyncEngine, SyncResult, SyncStatus};
pub use state::{SyncState, SyncStatusKind};
