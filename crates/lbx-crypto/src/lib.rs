//! lbx-crypto: password-based key derivation and authenticated sealing for Lockbox
//!
//! ```text
//! password ──Argon2id(salt)──▶ VaultKey (256-bit, zeroized on drop)
//! plaintext ──AES-256-GCM(VaultKey, random 96-bit IV)──▶ { ciphertext, iv, authTag }
//! ```
//!
//! The salt is generated once per vault and stored in the clear next to the
//! ciphertext; it is what lets any device re-derive the key from the password
//! alone.

pub mod aead;
pub mod error;
pub mod kdf;

pub use aead::{decrypt, encrypt, SealedPayload};
pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, KdfParams, VaultKey};

/// Size of a vault key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-vault KDF salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of an AES-GCM initialization vector (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Best-effort overwrite of sensitive bytes before the buffer is released.
pub fn secure_wipe(buf: &mut [u8]) {
    use zeroize::Zeroize;
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_wipe_zeroes_buffer() {
        let mut buf = *b"super-secret-key-material";
        secure_wipe(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
