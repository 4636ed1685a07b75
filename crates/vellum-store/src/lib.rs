//! # Vellum Store
//!
//! Storage abstraction for Vellum. Provides a trait-based interface to the
//! replicated path store with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The managers never talk to a concrete backend; they hold a handle to some
//! [`GraphStore`]. [`MemoryStore`] is the shared test network, [`SqliteStore`]
//! a durable local replica.
//!
//! ## Key Types
//!
//! - [`GraphStore`] - The async trait for all storage operations
//! - [`Node`] - A live value or a deletion tombstone
//! - [`CasOutcome`] - Result of a compare-and-swap
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage with fault injection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vellum_store::{codec, GraphStore, SqliteStore};
//!
//! async fn example() -> vellum_store::Result<()> {
//!     let store = SqliteStore::open("vellum.db")?;
//!     store.put("profiles/alice", codec::encode_node(&"Alice")?).await?;
//!     let node = store.get("profiles/alice").await?;
//!     assert!(node.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Tombstones**: deletion is a write, so "deleted" and "not yet synced"
//!   stay distinguishable
//! - **Compare-and-swap**: the only atomic primitive; there are no
//!   cross-path transactions

pub mod codec;
pub mod error;
pub mod memory;
pub mod migration;
pub mod paths;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CasOutcome, GraphStore, Node};
