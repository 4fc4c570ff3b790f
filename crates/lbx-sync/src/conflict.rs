//! Recency/checksum comparison between a local and a remote sealed blob.
//!
//! Newer `lastModified` wins. At equal timestamps, equal checksums mean the
//! copies are already in sync; different checksums are a genuine conflict
//! that no timestamp can settle.

use chrono::{DateTime, Utc};
use lbx_core::LockboxError;
use lbx_storage::RemoteMetadata;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ── Sync Outcome ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local copy is newer; upload.
    LocalNewer,
    /// Remote copy is newer; download.
    RemoteNewer,
    /// Same time, same bytes.
    UpToDate,
    /// Same time, different bytes.
    Conflict,
}

pub fn compare(local: &RemoteMetadata, remote: &RemoteMetadata) -> SyncOutcome {
    match local.last_modified.cmp(&remote.last_modified) {
        Ordering::Greater => SyncOutcome::LocalNewer,
        Ordering::Less => SyncOutcome::RemoteNewer,
        Ordering::Equal if local.checksum == remote.checksum => SyncOutcome::UpToDate,
        Ordering::Equal => SyncOutcome::Conflict,
    }
}

// ── Conflict ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both copies changed; blob contents differ.
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub vault_id: String,
    pub local_data: RemoteMetadata,
    pub remote_data: RemoteMetadata,
    pub timestamp: DateTime<Utc>,
}

impl Conflict {
    pub fn content(vault_id: &str, local: RemoteMetadata, remote: RemoteMetadata) -> Self {
        Self {
            kind: ConflictKind::Content,
            vault_id: vault_id.to_string(),
            local_data: local,
            remote_data: remote,
            timestamp: lbx_core::fs::now_millis(),
        }
    }
}

/// Both copies changed at the same instant and the vault is set to manual
/// resolution. Nothing was modified on either side.
#[derive(Debug, thiserror::Error)]
#[error(
    "sync conflict on '{}': local ({}) and remote ({}) both modified at {}; resolve with local, remote or merge",
    .0.vault_id,
    short(&.0.local_data.checksum),
    short(&.0.remote_data.checksum),
    .0.local_data.last_modified
)]
pub struct SyncConflictError(pub Box<Conflict>);

impl SyncConflictError {
    pub fn conflict(&self) -> &Conflict {
        &self.0
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Caller's explicit choice for `resolve_conflicts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Overwrite remote with the local blob.
    Local,
    /// Overwrite local with the remote blob.
    Remote,
    /// Placeholder: behaves as `Local`.
    Merge,
}

impl std::str::FromStr for Resolution {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            other => Err(LockboxError::Format(format!(
                "unknown resolution '{other}' (expected local, remote or merge)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn meta(ms: i64, checksum: &str) -> RemoteMetadata {
        RemoteMetadata {
            version: 1,
            last_modified: Utc.timestamp_millis_opt(ms).unwrap(),
            checksum: checksum.to_string(),
            size: 10,
            author: None,
            description: None,
        }
    }

    #[test]
    fn test_recency_wins() {
        assert_eq!(compare(&meta(2000, "a"), &meta(1000, "b")), SyncOutcome::LocalNewer);
        assert_eq!(compare(&meta(1000, "a"), &meta(2000, "b")), SyncOutcome::RemoteNewer);
    }

    #[test]
    fn test_equal_time_same_bytes_is_up_to_date() {
        assert_eq!(compare(&meta(1000, "a"), &meta(1000, "a")), SyncOutcome::UpToDate);
    }

    #[test]
    fn test_equal_time_different_bytes_is_conflict() {
        assert_eq!(compare(&meta(1000, "a"), &meta(1000, "b")), SyncOutcome::Conflict);
    }

    #[test]
    fn test_conflict_json_uses_type_field() {
        let c = Conflict::content("v", meta(1000, "a"), meta(1000, "b"));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["localData"]["checksum"], "a");
        assert_eq!(json["remoteData"]["checksum"], "b");
    }

    #[test]
    fn test_conflict_error_message_names_vault() {
        let err = SyncConflictError(Box::new(Conflict::content(
            "team/prod",
            meta(1000, "aaaaaaaaaaaaaaaaaaaa"),
            meta(1000, "bbbbbbbbbbbbbbbbbbbb"),
        )));
        let msg = err.to_string();
        assert!(msg.contains("team/prod"));
        assert!(msg.contains("aaaaaaaaaaaa"));
        assert!(!msg.contains("aaaaaaaaaaaaa"));
    }

    proptest! {
        /// Swapping sides swaps the direction and never changes agreement.
        #[test]
        fn prop_compare_is_antisymmetric(
            a in 0i64..1_000_000,
            b in 0i64..1_000_000,
            same_bytes in any::<bool>(),
        ) {
            let local = meta(a, "l");
            let remote = meta(b, if same_bytes { "l" } else { "r" });

            let expected_reverse = match compare(&local, &remote) {
                SyncOutcome::LocalNewer => SyncOutcome::RemoteNewer,
                SyncOutcome::RemoteNewer => SyncOutcome::LocalNewer,
                other => other,
            };
            prop_assert_eq!(compare(&remote, &local), expected_reverse);
        }

        /// Identical copies never conflict and never move bytes.
        #[test]
        fn prop_identical_is_up_to_date(ms in 0i64..1_000_000) {
            let m = meta(ms, "same");
            prop_assert_eq!(compare(&m, &m.clone()), SyncOutcome::UpToDate);
        }
    }

    #[test]
    fn test_millisecond_difference_is_not_a_tie() {
        let base = meta(1000, "a");
        let mut later = meta(1000, "b");
        later.last_modified += Duration::milliseconds(1);
        assert_eq!(compare(&base, &later), SyncOutcome::RemoteNewer);
    }

    #[test]
    fn test_short_checksum_tolerates_short_and_multibyte_input() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        // 12 bytes lands inside a multibyte char; fall back to the whole string.
        assert_eq!(short("aéééééé"), "aéééééé");
    }
}
