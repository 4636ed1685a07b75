//! Encrypted payload envelope and sealed document fields.
//!
//! Document fields are stored as [`Sealed`] values: plaintext on public
//! documents, an [`EncryptedPayload`] of the CBOR-encoded value on private
//! ones.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::{EncryptionKey, EncryptionNonce};
use crate::error::{PermsError, Result};

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// An encrypted payload envelope.
///
/// This structure wraps encrypted data and provides the metadata
/// needed to decrypt it (assuming the holder has the key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt plaintext with the given key.
    pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the given key.
    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

/// A document field that is plaintext or ciphertext depending on visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sealed<T> {
    /// Stored as-is (public documents).
    Plain(T),
    /// CBOR encoding of the value, encrypted under the document key.
    Encrypted(EncryptedPayload),
}

impl<T> Sealed<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Seal `value` under `key`, or keep it plain when there is no key.
    pub fn seal(value: T, key: Option<&EncryptionKey>) -> Result<Self> {
        let Some(key) = key else {
            return Ok(Sealed::Plain(value));
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(Sealed::Encrypted(EncryptedPayload::encrypt(&buf, key)?))
    }

    /// Recover the value. Ciphertext without a key is [`PermsError::MissingKey`].
    pub fn open(&self, key: Option<&EncryptionKey>) -> Result<T> {
        match self {
            Sealed::Plain(value) => Ok(value.clone()),
            Sealed::Encrypted(payload) => {
                let key = key.ok_or(PermsError::MissingKey)?;
                let bytes = payload.decrypt(key)?;
                ciborium::from_reader(bytes.as_slice())
                    .map_err(|e| PermsError::DecryptionError(e.to_string()))
            }
        }
    }

    /// Open under `old` and seal again under `new`.
    pub fn reseal(&self, old: Option<&EncryptionKey>, new: Option<&EncryptionKey>) -> Result<Self> {
        Self::seal(self.open(old)?, new)
    }

    /// Whether the field is stored as ciphertext.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Sealed::Encrypted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let envelope = EncryptedPayload::encrypt(b"hello, encrypted world!", &key).unwrap();
        assert_eq!(envelope.decrypt(&key).unwrap(), b"hello, encrypted world!");
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let key = EncryptionKey::generate();
        let a = EncryptedPayload::encrypt(b"same", &key).unwrap();
        let b = EncryptedPayload::encrypt(b"same", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_sealed_plain_without_key() {
        let sealed = Sealed::seal("Spec".to_string(), None).unwrap();
        assert!(!sealed.is_encrypted());
        assert_eq!(sealed.open(None).unwrap(), "Spec");
    }

    #[test]
    fn test_sealed_tags_roundtrip() {
        let key = EncryptionKey::generate();
        let tags = vec!["draft".to_string(), "rfc".to_string()];
        let sealed = Sealed::seal(tags.clone(), Some(&key)).unwrap();
        assert!(sealed.is_encrypted());
        assert_eq!(sealed.open(Some(&key)).unwrap(), tags);
    }

    #[test]
    fn test_sealed_requires_key() {
        let key = EncryptionKey::generate();
        let sealed = Sealed::seal("secret".to_string(), Some(&key)).unwrap();
        assert!(matches!(sealed.open(None), Err(PermsError::MissingKey)));
        assert!(matches!(
            sealed.open(Some(&EncryptionKey::generate())),
            Err(PermsError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_reseal_between_keys_and_plain() {
        let old = EncryptionKey::generate();
        let new = EncryptionKey::generate();
        let sealed = Sealed::seal("body".to_string(), Some(&old)).unwrap();

        let rotated = sealed.reseal(Some(&old), Some(&new)).unwrap();
        assert!(rotated.open(Some(&old)).is_err());
        assert_eq!(rotated.open(Some(&new)).unwrap(), "body");

        let public = rotated.reseal(Some(&new), None).unwrap();
        assert_eq!(public, Sealed::Plain("body".to_string()));
    }
}
