//! The client: one signed-in user's view of the document store.
//!
//! Wires the injected store, profile directory and identity into a shared
//! [`Context`] and hands out the three managers over it.

use std::sync::Arc;

use vellum_perms::{Identity, IdentityProvider};
use vellum_store::GraphStore;

use crate::branches::BranchManager;
use crate::config::VellumConfig;
use crate::context::Context;
use crate::directory::ProfileDirectory;
use crate::documents::DocumentManager;
use crate::sharing::SharingManager;

/// Entry point for one identity.
///
/// Cheap to clone; clones share the key ring.
pub struct Vellum<S: GraphStore, D: ProfileDirectory> {
    ctx: Arc<Context<S, D>>,
    documents: DocumentManager<S, D>,
    sharing: SharingManager<S, D>,
    branches: BranchManager<S, D>,
}

impl<S: GraphStore, D: ProfileDirectory> Clone for Vellum<S, D> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            documents: self.documents.clone(),
            sharing: self.sharing.clone(),
            branches: self.branches.clone(),
        }
    }
}

impl<S: GraphStore, D: ProfileDirectory> Vellum<S, D> {
    /// Create a client over the given handles.
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        identity: Arc<dyn IdentityProvider>,
        config: VellumConfig,
    ) -> Self {
        let ctx = Arc::new(Context::new(store, directory, identity, config));
        Self {
            documents: DocumentManager::new(ctx.clone()),
            sharing: SharingManager::new(ctx.clone()),
            branches: BranchManager::new(ctx.clone()),
            ctx,
        }
    }

    /// Document key manager.
    pub fn documents(&self) -> &DocumentManager<S, D> {
        &self.documents
    }

    /// Sharing and key-distribution manager.
    pub fn sharing(&self) -> &SharingManager<S, D> {
        &self.sharing
    }

    /// Branch manager.
    pub fn branches(&self) -> &BranchManager<S, D> {
        &self.branches
    }

    /// Snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.ctx.identity()
    }

    pub fn store(&self) -> &Arc<S> {
        self.ctx.store()
    }

    pub fn config(&self) -> &VellumConfig {
        self.ctx.config()
    }
}
