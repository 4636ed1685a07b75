//! # Vellum
//!
//! End-to-end encrypted documents over a replicated, eventually consistent
//! store: per-document keys, sharing with named collaborators, capability
//! links, and suggestion branches reviewed by the owner.
//!
//! ## Overview
//!
//! - **Documents**: private documents are sealed under a per-document key
//!   that never reaches the store in plaintext
//! - **Sharing**: the key is wrapped for each collaborator under an X25519
//!   pairwise secret; share tokens carry it sealed under the token
//! - **Branches**: collaborators never edit the canonical copy; they fork a
//!   branch, submit it, and the owner merges or rejects it
//! - **Access control**: every operation is checked against the
//!   `read < write < owner` lattice before anything is written
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vellum::{NewDocument, StoreDirectory, Vellum, VellumConfig};
//! use vellum::core::{MergeSource, UserId};
//! use vellum::perms::LocalIdentity;
//! use vellum::store::MemoryStore;
//!
//! async fn example() -> vellum::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let config = VellumConfig::default();
//!     let directory = Arc::new(StoreDirectory::new(store.clone(), config.clone()));
//!
//!     let alice = Arc::new(LocalIdentity::generate(UserId::new("alice")?));
//!     let client = Vellum::new(store, directory, alice, config);
//!
//!     let doc = client
//!         .documents()
//!         .create_document(NewDocument::new("Spec", "Hello").with_tags(["draft"]))
//!         .await?;
//!     let branch = client.branches().create_branch(&doc.id).await?;
//!     let preview = client
//!         .branches()
//!         .merge_from_branch(&branch.id, MergeSource::Main)
//!         .await?;
//!     assert!(preview.diff.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `vellum::core` - Identifiers, permissions, branch states, validation
//! - `vellum::perms` - Crypto, key wrapping, identity, access control
//! - `vellum::store` - The store trait and its implementations

pub mod branches;
pub mod client;
pub mod config;
pub mod diff;
pub mod directory;
pub mod documents;
pub mod error;
pub mod journal;
pub mod keyring;
pub mod records;
pub mod settle;
pub mod sharing;
pub mod views;

mod context;

// Re-export component crates
pub use vellum_core as core;
pub use vellum_perms as perms;
pub use vellum_store as store;

pub use branches::BranchManager;
pub use client::Vellum;
pub use config::VellumConfig;
pub use context::Context;
pub use diff::{ContentDiff, DiffLine, LineTag};
pub use directory::{ProfileDirectory, StoreDirectory};
pub use documents::{DocumentManager, DocumentUpdate, NewDocument};
pub use error::{ErrorKind, Result, VellumError};
pub use records::Profile;
pub use sharing::SharingManager;
pub use views::{
    AccessSummary, BranchView, Collaborator, DocumentMetadata, DocumentView, MergePreview,
    ShareToken, SharedDocument,
};
