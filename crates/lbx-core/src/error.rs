use thiserror::Error;

pub type LockboxResult<T> = Result<T, LockboxError>;

#[derive(Debug, Error)]
pub enum LockboxError {
    /// No sealed blob at the expected local path or remote identifier.
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("vault already exists: {0}")]
    VaultExists(String),

    /// Wrong password and corrupted data are deliberately indistinguishable.
    #[error("invalid password or corrupted vault")]
    InvalidKey,

    #[error("vault not initialized or loaded")]
    VaultLocked,

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("secret already exists: {0}")]
    SecretAlreadyExists(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LockboxError {
    /// Whether a caller may reasonably retry the operation unchanged.
    ///
    /// Only provider-side transport and token failures qualify; a missing
    /// vault or a bad password will not fix itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_message_is_opaque() {
        let msg = LockboxError::InvalidKey.to_string();
        assert_eq!(msg, "invalid password or corrupted vault");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(LockboxError::Network("timeout".into()).is_retryable());
        assert!(LockboxError::Authentication("token expired".into()).is_retryable());
        assert!(!LockboxError::VaultNotFound("team/prod".into()).is_retryable());
        assert!(!LockboxError::InvalidKey.is_retryable());
    }
}
