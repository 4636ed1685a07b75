//! # Vellum Core
//!
//! Pure types shared by every Vellum crate: identifiers, the permission
//! lattice, the branch status state machine, and input validation.
//!
//! This crate contains no I/O, no storage, no cryptography. It is the
//! vocabulary the key manager, sharing manager and branch manager speak.
//!
//! ## Key Types
//!
//! - [`DocumentId`] - Random 16-byte identifier for documents and branches
//! - [`UserId`] - The alias a user is known by in the profile directory
//! - [`Permission`] - `read < write < owner`
//! - [`BranchStatus`] - `pending → submitted → {merged | rejected}`
//! - [`MergeSource`] - Where a working branch pulls content from

pub mod branch;
pub mod error;
pub mod permission;
pub mod types;
pub mod validation;

pub use branch::{BranchStatus, MergeSource};
pub use error::{CoreError, Result};
pub use permission::Permission;
pub use types::{now_millis, DocumentId, UserId};
pub use validation::{validate_content, validate_tags, validate_title, ValidationLimits};
