use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag did not verify. Covers wrong keys, tampered
    /// ciphertext and malformed envelopes alike.
    #[error("invalid password or corrupted vault")]
    Authentication,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("invalid hex encoding in field `{0}`")]
    Encoding(&'static str),
}
