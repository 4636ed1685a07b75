//! Identities and the key-agreement capability.
//!
//! The managers never see a private key. They hold an [`IdentityProvider`]
//! and only ask it two things: who is signed in, and what the pairwise secret
//! with some peer is.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use vellum_core::{now_millis, UserId};

use crate::crypto::{SharedKey, X25519PublicKey, X25519StaticSecret};
use crate::error::Result;

/// Ability to perform X25519 key agreement with the holder's private key.
pub trait KeyAgreement: Send + Sync {
    /// The holder's public encryption key.
    fn public_key(&self) -> X25519PublicKey;

    /// Derive the pairwise secret with `peer`.
    fn derive_shared_secret(&self, peer: &X25519PublicKey) -> Result<SharedKey>;
}

impl KeyAgreement for X25519StaticSecret {
    fn public_key(&self) -> X25519PublicKey {
        X25519StaticSecret::public_key(self)
    }

    fn derive_shared_secret(&self, peer: &X25519PublicKey) -> Result<SharedKey> {
        self.diffie_hellman(peer)
    }
}

/// The signed-in user, as seen by the managers.
pub trait IdentityProvider: KeyAgreement {
    /// Snapshot of the current identity and session.
    fn identity(&self) -> Identity;
}

/// Session validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    /// Signed in, optionally until a Unix-millisecond deadline.
    Active { expires_at: Option<i64> },
    /// Signed out; only capability-token reads are possible.
    SignedOut,
}

impl Session {
    /// Whether the session is usable at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        match self {
            Session::Active { expires_at: None } => true,
            Session::Active {
                expires_at: Some(deadline),
            } => now < *deadline,
            Session::SignedOut => false,
        }
    }
}

/// A tagged identity: alias, public key, session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The alias the user is known by.
    pub user_id: UserId,
    /// Published X25519 public key.
    pub public_key: X25519PublicKey,
    /// Session state at snapshot time.
    pub session: Session,
}

impl Identity {
    /// Whether this identity may perform authenticated operations now.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_active(now_millis())
    }
}

/// An identity backed by a locally held X25519 secret.
pub struct LocalIdentity {
    user_id: UserId,
    secret: X25519StaticSecret,
    session: RwLock<Session>,
}

impl LocalIdentity {
    /// Create a signed-in identity with a fresh random key.
    pub fn generate(user_id: UserId) -> Self {
        Self::with_secret(user_id, X25519StaticSecret::generate())
    }

    /// Create a signed-in identity from a 32-byte seed.
    pub fn from_seed(user_id: UserId, seed: [u8; 32]) -> Self {
        Self::with_secret(user_id, X25519StaticSecret::from_bytes(seed))
    }

    /// Create a signed-in identity from an existing secret.
    pub fn with_secret(user_id: UserId, secret: X25519StaticSecret) -> Self {
        Self {
            user_id,
            secret,
            session: RwLock::new(Session::Active { expires_at: None }),
        }
    }

    /// The alias of this identity.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Start a session, optionally expiring at a Unix-millisecond deadline.
    pub fn sign_in(&self, expires_at: Option<i64>) {
        *self.session.write() = Session::Active { expires_at };
    }

    /// End the session.
    pub fn sign_out(&self) {
        *self.session.write() = Session::SignedOut;
    }
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("user_id", &self.user_id)
            .field("session", &*self.session.read())
            .finish_non_exhaustive()
    }
}

impl KeyAgreement for LocalIdentity {
    fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    fn derive_shared_secret(&self, peer: &X25519PublicKey) -> Result<SharedKey> {
        self.secret.diffie_hellman(peer)
    }
}

impl IdentityProvider for LocalIdentity {
    fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            public_key: self.secret.public_key(),
            session: *self.session.read(),
        }
    }
}
