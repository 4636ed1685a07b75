//! # Vellum Testkit
//!
//! Testing utilities for Vellum.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a shared test network that users join with deterministic
//!   keys and published profiles
//! - **Store doubles**: [`LaggyStore`], whose writes become visible late, for
//!   exercising settle-window reads, and [`GatedStore`], which holds one
//!   write so another writer can land first
//! - **Access vectors**: the expected decision for every action under every
//!   kind of grant
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use vellum::NewDocument;
//! use vellum_testkit::TestNetwork;
//!
//! async fn example() -> vellum::Result<()> {
//!     let network = TestNetwork::new();
//!     let alice = network.join("alice").await?;
//!     let doc = alice
//!         .client
//!         .documents()
//!         .create_document(NewDocument::new("Spec", "Hello"))
//!         .await?;
//!     assert_eq!(doc.owner, alice.user);
//!     Ok(())
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use vellum_perms::Sealed;
//! use vellum_testkit::generators::{content, encryption_key};
//!
//! proptest! {
//!     #[test]
//!     fn sealed_content_opens(key in encryption_key(), body in content()) {
//!         let sealed = Sealed::seal(body.clone(), Some(&key)).unwrap();
//!         prop_assert_eq!(sealed.open(Some(&key)).unwrap(), body);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod gated;
pub mod generators;
pub mod laggy;
pub mod vectors;

pub use fixtures::{init_tracing, Member, TestNetwork};
pub use gated::{GatedStore, Held};
pub use laggy::LaggyStore;
pub use vectors::{access_vectors, verify_access_vectors, AccessVector, Caller};
