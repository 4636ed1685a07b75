//! Error types for Vellum Core.

use thiserror::Error;

use crate::branch::BranchStatus;

/// Errors produced by core type construction and state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// A branch was asked to move along an edge the state machine does not have.
    #[error("cannot move branch from {from} to {to}")]
    InvalidTransition { from: BranchStatus, to: BranchStatus },

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
