//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during key handling and permission checks.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Permission denied.
    #[error("{0}")]
    PermissionDenied(String),

    /// The session is signed out or expired.
    #[error("not authenticated")]
    Unauthenticated,

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error: wrong key, tampered ciphertext, or malformed plaintext.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Ciphertext was found but no key was supplied.
    #[error("no key available for encrypted field")]
    MissingKey,

    /// Key derivation error.
    #[error("key derivation error: {0}")]
    KeyDerivationError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] vellum_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
