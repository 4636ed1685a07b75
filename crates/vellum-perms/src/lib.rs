//! # Vellum Permissions
//!
//! Document key material and access control.
//!
//! ## Encryption Model
//!
//! Private documents use a two-layer key model:
//!
//! 1. **Document Key**: A symmetric key (ChaCha20-Poly1305) that seals the
//!    title, content and tags of a document and all of its branches
//! 2. **Wrapped Keys**: The document key is sealed once per collaborator under
//!    a key derived from the X25519 pairwise secret between owner and
//!    collaborator
//!
//! This allows:
//! - Adding collaborators without re-encrypting content
//! - Key rotation by re-sealing content and re-wrapping for current holders
//! - Revocation by deleting a wrapped key (already-fetched keys stay valid)
//!
//! ## Access Control
//!
//! [`access`] implements the `read < write < owner` lattice over a set of
//! [`Action`]s. Token and public grants bypass the per-user access list.
//!
//! ## Usage
//!
//! ```rust
//! use vellum_core::{DocumentId, UserId};
//! use vellum_perms::{generate_key, wrap_context, KeyAgreement, LocalIdentity, Sealed, WrappedKey};
//!
//! let owner = LocalIdentity::generate(UserId::new("alice").unwrap());
//! let bob = LocalIdentity::generate(UserId::new("bob").unwrap());
//! let doc = DocumentId::generate();
//!
//! let key = generate_key();
//! let title = Sealed::seal("Spec".to_string(), Some(&key)).unwrap();
//!
//! let context = wrap_context(&doc, bob.user_id());
//! let wrapped = WrappedKey::wrap(&key, &owner, &bob.public_key(), &context).unwrap();
//! let unwrapped = wrapped.unwrap(&bob, &context).unwrap();
//!
//! assert_eq!(title.open(Some(&unwrapped)).unwrap(), "Spec");
//! ```

pub mod access;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod wrap;

pub use access::{authorize, can_perform, AccessRequest, Action, Grant};
pub use crypto::{
    decrypt, derive_shared_secret, encrypt, generate_key, EncryptionKey, EncryptionNonce,
    KeyFingerprint, SharedKey, X25519PublicKey, X25519StaticSecret,
};
pub use envelope::{EncryptedPayload, EncryptionFormat, Sealed};
pub use error::{PermsError, Result};
pub use identity::{Identity, IdentityProvider, KeyAgreement, LocalIdentity, Session};
pub use wrap::{wrap_context, WrappedKey};
