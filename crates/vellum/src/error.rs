//! Error types for the managers.
//!
//! Every public operation returns [`VellumError`]: a stable kind, a stable
//! message, and (for diagnostics only) the lower-level cause.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use vellum_core::{CoreError, UserId};
use vellum_perms::PermsError;
use vellum_store::StoreError;

/// Error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input.
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Document, branch, user or token absent.
    NotFound,
    /// Unauthenticated, or insufficient permission.
    PermissionDenied,
    /// Illegal branch transition or visibility change.
    InvalidState,
    /// Wrong, missing or stale key; tampered ciphertext.
    #[serde(rename = "CRYPTO_ERROR")]
    Crypto,
    /// Store unreachable or timed out.
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// A multi-step operation could not complete for some users.
    PartialFailure,
    /// Local storage failure or undecodable record.
    #[serde(rename = "STORAGE_ERROR")]
    Storage,
}

impl ErrorKind {
    /// The wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Crypto => "CRYPTO_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::PartialFailure => "PARTIAL_FAILURE",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every manager operation.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct VellumError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    affected: Vec<UserId>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl VellumError {
    /// Create an error with a stable message.
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            affected: Vec::new(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn crypto(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Crypto, message)
    }

    /// A multi-step operation that could not complete for `affected`.
    pub fn partial_failure(message: impl Into<Cow<'static, str>>, affected: Vec<UserId>) -> Self {
        Self {
            affected,
            ..Self::new(ErrorKind::PartialFailure, message)
        }
    }

    /// The signed-out / expired session error.
    pub fn unauthenticated() -> Self {
        Self::permission_denied("Not authenticated")
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable message, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Users a partial failure applies to.
    pub fn affected(&self) -> &[UserId] {
        &self.affected
    }

    /// Whether this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<PermsError> for VellumError {
    fn from(err: PermsError) -> Self {
        match err {
            PermsError::PermissionDenied(message) => Self::permission_denied(message),
            PermsError::Unauthenticated => Self::unauthenticated(),
            PermsError::Core(core) => core.into(),
            PermsError::MissingKey => Self::crypto("Document key unavailable").with_source(err),
            PermsError::EncryptionError(_) | PermsError::KeyDerivationError(_) => {
                Self::crypto("Encryption failed").with_source(err)
            }
            PermsError::DecryptionError(_) => Self::crypto("Decryption failed").with_source(err),
            PermsError::SerializationError(_) => {
                Self::new(ErrorKind::Storage, "Failed to encode document field").with_source(err)
            }
        }
    }
}

impl From<CoreError> for VellumError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation(message) => Self::validation(message.clone()),
            CoreError::InvalidTransition { .. } => {
                Self::invalid_state("Invalid branch transition").with_source(err)
            }
            CoreError::InvalidId(_) => Self::validation("Invalid identifier").with_source(err),
        }
    }
}

impl From<StoreError> for VellumError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Timeout(_) => {
                Self::new(ErrorKind::Network, "Store request timed out").with_source(err)
            }
            StoreError::Unavailable(_) => {
                Self::new(ErrorKind::Network, "Store unavailable").with_source(err)
            }
            _ => Self::new(ErrorKind::Storage, "Storage failure").with_source(err),
        }
    }
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, VellumError>;
