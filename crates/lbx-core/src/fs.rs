//! Crash-safe file replacement and millisecond mtime helpers.
//!
//! The vault store and the sync reconciler both replace the sealed vault file;
//! they must go through [`atomic_write`] so a save and a sync download can never
//! interleave into a torn file.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Atomically replace `path` with `data`.
///
/// Writes to a temp file in the same directory, fsyncs it, then renames over
/// the target. A crash at any point leaves either the old or the new content.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    replace_file(path, data, None)
}

/// [`atomic_write`] for credentials and plaintext secrets. The temp file is
/// created owner read/write only (0600 on unix) before any byte is written.
pub fn atomic_write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    replace_file(path, data, Some(0o600))
}

fn replace_file(path: &Path, data: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let tmp_path = temp_path_for(path);
    let result = (|| {
        let mut file = create_temp(&tmp_path, mode)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result?;

    // Persist the rename itself; best effort on platforms without dir fsync.
    if let Ok(dir) = std::fs::File::open(&parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn create_temp(tmp_path: &Path, mode: Option<u32>) -> std::io::Result<std::fs::File> {
    // A stale temp left by a crashed writer would keep its old permissions.
    match std::fs::remove_file(tmp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    opts.open(tmp_path)
}

/// Temp file sibling used by [`atomic_write`]: `.<name>.<pid>.tmp`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "lockbox".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Truncate a timestamp to millisecond precision.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Current UTC time at millisecond precision, the resolution every stored
/// timestamp uses.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Modification time of `path`, truncated to milliseconds.
pub fn modified_at(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(truncate_millis(DateTime::<Utc>::from(modified)))
}

/// Set the modification time of `path`.
pub fn set_modified_at(path: &Path, ts: DateTime<Utc>) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::from(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/vault.json");

        atomic_write(&path, b"first").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        assert!(!temp_path_for(&path).exists(), "temp file must be renamed away");
    }

    #[test]
    fn test_set_and_read_mtime_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("blob");
        std::fs::write(&path, b"x").unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        set_modified_at(&path, ts).unwrap();

        assert_eq!(modified_at(&path).unwrap(), ts);
    }

    #[test]
    fn test_truncate_millis_drops_sub_millisecond_part() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_500_999);
        let truncated = truncate_millis(ts);
        assert_eq!(truncated.timestamp_subsec_nanos(), 1_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_write_is_owner_only_even_over_looser_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("creds.json");
        std::fs::write(&path, b"old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        // A stale world-readable temp must not be reused.
        let stale = temp_path_for(&path);
        std::fs::write(&stale, b"stale").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        atomic_write_private(&path, b"secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"secret");
        assert!(!stale.exists());
    }
}
