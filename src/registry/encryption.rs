// SPDX-License-Identifier: MIT

//! Optional symmetric encryption of TXT ownership targets. The nonce is
//! retained alongside the ciphertext (prefixed, base64'd) so the encrypted
//! string stays stable between reconciliations rather than changing on
//! every re-encrypt.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::constants::ENCRYPTION_NONCE_BYTES;
use crate::errors::RegistryError;

pub struct TxtEncryption {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TxtEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxtEncryption").finish_non_exhaustive()
    }
}

impl TxtEncryption {
    pub fn new(key_bytes: &[u8]) -> Result<Self, RegistryError> {
        if key_bytes.len() != 32 {
            return Err(RegistryError::InvalidEncryptionKeyLength {
                expected: 32,
                actual: key_bytes.len(),
            });
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypts `plaintext` with a fresh nonce, returning
    /// `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str, nonce_bytes: &[u8; ENCRYPTION_NONCE_BYTES]) -> Result<String, RegistryError> {
        let nonce = Nonce::from_slice(nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| RegistryError::EncryptionFailed {
                reason: e.to_string(),
            })?;

        let mut combined = Vec::with_capacity(ENCRYPTION_NONCE_BYTES + ciphertext.len());
        combined.extend_from_slice(nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypts a `base64(nonce || ciphertext)` string produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, RegistryError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| RegistryError::DecryptionFailed {
                reason: e.to_string(),
            })?;
        if combined.len() < ENCRYPTION_NONCE_BYTES {
            return Err(RegistryError::DecryptionFailed {
                reason: "ciphertext shorter than nonce".to_string(),
            });
        }
        let (nonce_bytes, ciphertext) = combined.split_at(ENCRYPTION_NONCE_BYTES);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| RegistryError::DecryptionFailed {
                reason: e.to_string(),
            })?;
        String::from_utf8(plaintext).map_err(|e| RegistryError::DecryptionFailed {
            reason: e.to_string(),
        })
    }

    /// Extracts the nonce already embedded in a previously encrypted
    /// target, so re-encryption on update reuses it instead of rotating.
    pub fn extract_nonce(encoded: &str) -> Option<[u8; ENCRYPTION_NONCE_BYTES]> {
        let combined = BASE64.decode(encoded).ok()?;
        if combined.len() < ENCRYPTION_NONCE_BYTES {
            return None;
        }
        combined[..ENCRYPTION_NONCE_BYTES].try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let key = [7u8; 32];
        let encryption = TxtEncryption::new(&key).unwrap();
        let nonce = [1u8; ENCRYPTION_NONCE_BYTES];
        let encrypted = encryption
            .encrypt("heritage=external-dns,external-dns/owner=ownerA", &nonce)
            .unwrap();
        let decrypted = encryption.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, "heritage=external-dns,external-dns/owner=ownerA");
    }

    #[test]
    fn rejects_short_key() {
        let err = TxtEncryption::new(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEncryptionKeyLength { .. }));
    }

    #[test]
    fn reusing_extracted_nonce_keeps_ciphertext_stable_given_same_plaintext() {
        let key = [3u8; 32];
        let encryption = TxtEncryption::new(&key).unwrap();
        let nonce = [2u8; ENCRYPTION_NONCE_BYTES];
        let first = encryption.encrypt("same-plaintext", &nonce).unwrap();
        let extracted = TxtEncryption::extract_nonce(&first).unwrap();
        let second = encryption.encrypt("same-plaintext", &extracted).unwrap();
        assert_eq!(first, second);
    }
}
