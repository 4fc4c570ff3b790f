use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LockboxError, LockboxResult};

/// Top-level client configuration (loaded from lockbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockboxConfig {
    pub vault: VaultConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault file used when no path is given on the command line
    pub default_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name recorded as `author` on uploaded blobs (defaults to $USER)
    pub author: Option<String>,
    /// Provider used by `sync enable` when none is given
    pub default_provider: String,
    /// Conflict policy used by `sync enable` when none is given
    pub default_conflict_resolution: String,
    /// Auto-sync interval in seconds for newly enabled vaults
    pub default_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default_path: PathBuf::from("~/.lockbox/vault.json"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            author: None,
            default_provider: "s3".into(),
            default_conflict_resolution: "manual".into(),
            default_interval_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl LockboxConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> LockboxResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LockboxError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[vault]
default_path = "/srv/secrets/team.json"

[sync]
author = "ci-runner"
default_provider = "azblob"
default_conflict_resolution = "local-wins"
default_interval_secs = 60

[log]
level = "debug"
format = "json"
"#;
        let config: LockboxConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.vault.default_path, PathBuf::from("/srv/secrets/team.json"));
        assert_eq!(config.sync.author.as_deref(), Some("ci-runner"));
        assert_eq!(config.sync.default_provider, "azblob");
        assert_eq!(config.sync.default_interval_secs, 60);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: LockboxConfig = toml::from_str("").unwrap();

        assert_eq!(config.vault.default_path, PathBuf::from("~/.lockbox/vault.json"));
        assert_eq!(config.sync.default_conflict_resolution, "manual");
        assert!(config.sync.author.is_none());
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[sync]
default_interval_secs = 60
"#;
        let config: LockboxConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.sync.default_interval_secs, 60);
        assert_eq!(config.sync.default_provider, "s3");
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = LockboxConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[sync\ndefault_interval_secs = ").unwrap();

        let err = LockboxConfig::load(&path).unwrap_err();
        assert!(matches!(err, LockboxError::Config(_)));
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/.lockbox/vault.json")),
            PathBuf::from("/home/tester/.lockbox/vault.json")
        );
        assert_eq!(expand_tilde(Path::new("/abs/v.json")), PathBuf::from("/abs/v.json"));
    }
}
