//! Per-collaborator key wrapping via X25519 key agreement.
//!
//! The owner wraps the document key for a collaborator under a key derived
//! from their pairwise secret. Because agreement is commutative the
//! collaborator unwraps with their own secret and the owner's public key,
//! which travels with the wrapped key.

use serde::{Deserialize, Serialize};

use vellum_core::{DocumentId, UserId};

use crate::crypto::{EncryptionKey, KeyFingerprint, X25519PublicKey};
use crate::envelope::EncryptedPayload;
use crate::error::{PermsError, Result};
use crate::identity::KeyAgreement;

/// A document key sealed for one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Public key of the party that wrapped it (the document owner).
    pub wrapped_by: X25519PublicKey,

    /// The document key, encrypted under the derived wrapping key.
    pub encrypted_key: EncryptedPayload,

    /// Fingerprint of the wrapped document key.
    pub fingerprint: KeyFingerprint,
}

/// Derivation context binding a wrapped key to one document and one holder.
pub fn wrap_context(doc: &DocumentId, holder: &UserId) -> Vec<u8> {
    let mut context = Vec::with_capacity(16 + 1 + holder.as_str().len());
    context.extend_from_slice(doc.as_bytes());
    context.push(b':');
    context.extend_from_slice(holder.as_str().as_bytes());
    context
}

impl WrappedKey {
    /// Wrap `key` for the holder of `recipient`.
    ///
    /// # Arguments
    /// * `key` - The document key to share
    /// * `wrapper` - The owner's key agreement capability
    /// * `recipient` - Recipient's X25519 public key
    /// * `context` - See [`wrap_context`]
    pub fn wrap<A>(
        key: &EncryptionKey,
        wrapper: &A,
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Self>
    where
        A: KeyAgreement + ?Sized,
    {
        let shared = wrapper.derive_shared_secret(recipient)?;
        let wrap_key = shared.derive_encryption_key(context);
        let encrypted_key = EncryptedPayload::encrypt(key.as_bytes(), &wrap_key)?;

        Ok(Self {
            wrapped_by: wrapper.public_key(),
            encrypted_key,
            fingerprint: key.fingerprint(),
        })
    }

    /// Recover the document key with the holder's key agreement capability.
    pub fn unwrap<A>(&self, holder: &A, context: &[u8]) -> Result<EncryptionKey>
    where
        A: KeyAgreement + ?Sized,
    {
        let shared = holder.derive_shared_secret(&self.wrapped_by)?;
        let wrap_key = shared.derive_encryption_key(context);
        let key_bytes = self.encrypted_key.decrypt(&wrap_key)?;

        let arr: [u8; 32] = key_bytes.try_into().map_err(|bytes: Vec<u8>| {
            PermsError::DecryptionError(format!(
                "invalid key length: expected 32, got {}",
                bytes.len()
            ))
        })?;

        let key = EncryptionKey::from_bytes(arr);
        if key.fingerprint() != self.fingerprint {
            return Err(PermsError::DecryptionError(
                "wrapped key fingerprint mismatch".into(),
            ));
        }
        Ok(key)
    }
}
