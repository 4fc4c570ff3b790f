//! AES-256-GCM sealing of opaque payloads.
//!
//! Every call to [`encrypt`] draws a fresh 96-bit IV from the thread-local
//! CSPRNG. The IV and tag travel with the ciphertext as separate fields so the
//! sealed envelope can store each one hex-encoded.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::CryptoError;
use crate::kdf::VaultKey;
use crate::{IV_SIZE, TAG_SIZE};

/// Output of one authenticated encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_SIZE],
    pub auth_tag: [u8; TAG_SIZE],
}

impl SealedPayload {
    /// Rebuild a payload from hex fields as stored in the vault envelope.
    ///
    /// An IV or tag of the wrong length is reported as an authentication
    /// failure: a malformed envelope is just another untrustworthy blob.
    pub fn from_hex(ciphertext: &str, iv: &str, auth_tag: &str) -> Result<Self, CryptoError> {
        let ciphertext = hex::decode(ciphertext).map_err(|_| CryptoError::Encoding("encrypted"))?;
        let iv = hex::decode(iv).map_err(|_| CryptoError::Encoding("iv"))?;
        let auth_tag = hex::decode(auth_tag).map_err(|_| CryptoError::Encoding("authTag"))?;

        Ok(Self {
            ciphertext,
            iv: iv.try_into().map_err(|_| CryptoError::Authentication)?,
            auth_tag: auth_tag.try_into().map_err(|_| CryptoError::Authentication)?,
        })
    }

    /// Hex-encode `(ciphertext, iv, auth_tag)`.
    pub fn to_hex(&self) -> (String, String, String) {
        (
            hex::encode(&self.ciphertext),
            hex::encode(self.iv),
            hex::encode(self.auth_tag),
        )
    }
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &VaultKey) -> Result<SealedPayload, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    // aes-gcm appends the tag to the ciphertext
    let tag_start = sealed.len() - TAG_SIZE;
    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    Ok(SealedPayload {
        ciphertext: sealed,
        iv,
        auth_tag,
    })
}

/// Decrypt and authenticate a payload.
///
/// Fails with [`CryptoError::Authentication`] for a wrong key and for any
/// tampering with ciphertext, IV or tag, without saying which.
pub fn decrypt(payload: &SealedPayload, key: &VaultKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut combined = Vec::with_capacity(payload.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&payload.ciphertext);
    combined.extend_from_slice(&payload.auth_tag);

    cipher
        .decrypt(Nonce::from_slice(&payload.iv), combined.as_slice())
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;
    use std::collections::HashSet;

    fn key(byte: u8) -> VaultKey {
        VaultKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(1);
        let sealed = encrypt(b"{\"API_KEY\":\"abc123\"}", &k).unwrap();
        let opened = decrypt(&sealed, &k).unwrap();
        assert_eq!(opened, b"{\"API_KEY\":\"abc123\"}");
    }

    #[test]
    fn test_encrypt_empty_payload() {
        let k = key(1);
        let sealed = encrypt(b"", &k).unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert_eq!(decrypt(&sealed, &k).unwrap(), b"");
    }

    #[test]
    fn test_ciphertext_len_matches_plaintext() {
        let sealed = encrypt(&[0u8; 1000], &key(1)).unwrap();
        assert_eq!(sealed.ciphertext.len(), 1000);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let sealed = encrypt(b"secret data", &key(1)).unwrap();
        let result = decrypt(&sealed, &key(2));
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_tampered_ciphertext_every_byte() {
        let k = key(3);
        let sealed = encrypt(b"do not tamper with me", &k).unwrap();
        for i in 0..sealed.ciphertext.len() {
            let mut bad = sealed.clone();
            bad.ciphertext[i] ^= 0x01;
            assert!(decrypt(&bad, &k).is_err(), "flipped ciphertext byte {i} must fail");
        }
    }

    #[test]
    fn test_tampered_tag_every_byte() {
        let k = key(3);
        let sealed = encrypt(b"do not tamper with me", &k).unwrap();
        for i in 0..TAG_SIZE {
            let mut bad = sealed.clone();
            bad.auth_tag[i] ^= 0x80;
            assert!(decrypt(&bad, &k).is_err(), "flipped tag byte {i} must fail");
        }
    }

    #[test]
    fn test_tampered_iv() {
        let k = key(3);
        let mut sealed = encrypt(b"payload", &k).unwrap();
        sealed.iv[0] ^= 0xFF;
        assert!(decrypt(&sealed, &k).is_err());
    }

    #[test]
    fn test_iv_unique_across_10k_calls() {
        let k = key(9);
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let sealed = encrypt(b"x", &k).unwrap();
            assert!(seen.insert(sealed.iv), "IV reused");
        }
    }

    #[test]
    fn test_iv_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let k = key(9);
                    (0..1000)
                        .map(|_| encrypt(b"x", &k).unwrap().iv)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for iv in h.join().unwrap() {
                assert!(seen.insert(iv), "IV reused across threads");
            }
        }
    }

    #[test]
    fn test_hex_roundtrip() {
        let k = key(4);
        let sealed = encrypt(b"hex me", &k).unwrap();
        let (ct, iv, tag) = sealed.to_hex();
        assert_eq!(iv.len(), IV_SIZE * 2);
        assert_eq!(tag.len(), TAG_SIZE * 2);

        let parsed = SealedPayload::from_hex(&ct, &iv, &tag).unwrap();
        assert_eq!(parsed, sealed);
    }

    #[test]
    fn test_from_hex_bad_lengths_are_auth_failures() {
        let result = SealedPayload::from_hex("00", "0011", &"00".repeat(TAG_SIZE));
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_from_hex_invalid_chars() {
        let result = SealedPayload::from_hex("zz", "00", "00");
        assert!(matches!(result, Err(CryptoError::Encoding("encrypted"))));
    }
}
