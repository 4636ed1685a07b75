//! State shared by the managers, and the store helpers they build on.
//!
//! One [`Context`] per signed-in client: the injected store and directory
//! handles, the identity provider, configuration and the local key ring.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use vellum_core::{DocumentId, Permission, UserId};
use vellum_perms::{
    authorize, wrap_context, AccessRequest, Action, EncryptionKey, Grant, Identity,
    IdentityProvider, WrappedKey, X25519PublicKey,
};
use vellum_store::{codec, paths, CasOutcome, GraphStore, Node};

use crate::config::VellumConfig;
use crate::directory::ProfileDirectory;
use crate::error::{ErrorKind, Result, VellumError};
use crate::journal::WriteJournal;
use crate::keyring::KeyRing;
use crate::records::{AccessEntry, DocumentRecord};
use crate::settle::{bounded, read_settled, Slot};

/// How many times a compare-and-swap is retried against a fresh read.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 5;

/// A decoded record together with the exact node it was decoded from.
#[derive(Debug, Clone)]
pub(crate) struct Stored<T> {
    pub node: Node,
    pub record: T,
}

impl<T: DeserializeOwned> Stored<T> {
    pub fn decode(node: Node) -> Result<Option<Self>> {
        let record = codec::decode_node(&node)?;
        Ok(record.map(|record| Self { node, record }))
    }
}

/// Outcome of a settled lookup.
pub(crate) enum Lookup<T> {
    Found(T),
    Deleted,
    Absent,
}

impl<T> Lookup<T> {
    /// The value, or `NOT_FOUND` with `message`.
    pub fn require(self, message: &'static str) -> Result<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::Deleted | Lookup::Absent => Err(VellumError::not_found(message)),
        }
    }
}

/// Shared state of one client.
pub struct Context<S: GraphStore, D: ProfileDirectory> {
    store: Arc<S>,
    directory: Arc<D>,
    identity: Arc<dyn IdentityProvider>,
    config: VellumConfig,
    keyring: KeyRing,
}

impl<S: GraphStore, D: ProfileDirectory> Context<S, D> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        identity: Arc<dyn IdentityProvider>,
        config: VellumConfig,
    ) -> Self {
        Self {
            store,
            directory,
            identity,
            config,
            keyring: KeyRing::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    pub fn config(&self) -> &VellumConfig {
        &self.config
    }

    /// Snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.identity.identity()
    }

    /// The signed-in user, or `PERMISSION_DENIED: Not authenticated`.
    pub(crate) fn current_user(&self) -> Result<UserId> {
        let identity = self.identity.identity();
        if !identity.is_authenticated() {
            return Err(VellumError::unauthenticated());
        }
        Ok(identity.user_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bounded store access
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn get(&self, path: &str) -> Result<Option<Node>> {
        Ok(bounded(self.config.store_timeout, self.store.get(path)).await?)
    }

    pub(crate) async fn cas(&self, path: &str, expected: &Node, new: Node) -> Result<CasOutcome> {
        Ok(bounded(
            self.config.store_timeout,
            self.store.compare_and_swap(path, Some(expected), new),
        )
        .await?)
    }

    /// Decode every live node under `prefix`, skipping tombstones.
    pub(crate) async fn list_live<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Stored<T>)>> {
        let nodes = bounded(self.config.store_timeout, self.store.list(prefix)).await?;
        let mut out = Vec::with_capacity(nodes.len());
        for (path, node) in nodes {
            if let Some(stored) = Stored::decode(node)? {
                out.push((path, stored));
            }
        }
        Ok(out)
    }

    pub(crate) fn journal(&self) -> WriteJournal<'_, S> {
        WriteJournal::new(self.store.as_ref(), self.config.store_timeout)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a document or branch record, waiting out the settle window.
    pub(crate) async fn load_document(
        &self,
        id: &DocumentId,
    ) -> Result<Lookup<Stored<DocumentRecord>>> {
        let path = paths::document(id);
        match read_settled(self.store.as_ref(), &path, &self.config).await? {
            Slot::Present(bytes) => {
                let node = Node::Value(bytes);
                match Stored::decode(node)? {
                    Some(stored) => Ok(Lookup::Found(stored)),
                    None => Ok(Lookup::Absent),
                }
            }
            Slot::Deleted => Ok(Lookup::Deleted),
            Slot::Absent => Ok(Lookup::Absent),
        }
    }

    /// Read a record found through an index; no settle wait.
    pub(crate) async fn fetch_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<Stored<DocumentRecord>>> {
        match self.get(&paths::document(id)).await? {
            Some(node) => Stored::decode(node),
            None => Ok(None),
        }
    }

    /// Every live branch of `root`, oldest first.
    pub(crate) async fn branches_of(&self, root: &DocumentId) -> Result<Vec<Stored<DocumentRecord>>> {
        let index: Vec<(String, Stored<DocumentId>)> =
            self.list_live(&paths::branch_prefix(root)).await?;

        let mut branches = Vec::with_capacity(index.len());
        for (_, entry) in index {
            if let Some(branch) = self.fetch_document(&entry.record).await? {
                if branch.record.is_branch() && branch.record.root_id() == *root {
                    branches.push(branch);
                }
            }
        }
        branches.sort_by_key(|b| (b.record.created_at, b.record.id));
        Ok(branches)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn access_entries(&self, doc: &DocumentId) -> Result<Vec<Stored<AccessEntry>>> {
        let entries = self.list_live(&paths::access_prefix(doc)).await?;
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    pub(crate) async fn access_entry(
        &self,
        doc: &DocumentId,
        user: &UserId,
    ) -> Result<Option<Stored<AccessEntry>>> {
        match self.get(&paths::access(doc, user)).await? {
            Some(node) => Stored::decode(node),
            None => Ok(None),
        }
    }

    /// How `user` came to have access to `root`, if at all.
    pub(crate) async fn grant_for(&self, root: &DocumentRecord, user: &UserId) -> Result<Option<Grant>> {
        if root.owner == *user {
            return Ok(Some(Grant::Member(Permission::Owner)));
        }
        if let Some(entry) = self.access_entry(&root.id, user).await? {
            return Ok(Some(Grant::Member(entry.record.permission)));
        }
        if root.is_public {
            return Ok(Some(Grant::Public));
        }
        Ok(None)
    }

    /// Check `action` for a signed-in user.
    pub(crate) fn authorize(
        &self,
        action: Action,
        user: &UserId,
        grant: Option<Grant>,
        branch_creator: Option<&UserId>,
    ) -> Result<()> {
        let mut request = AccessRequest::member(user, grant);
        if let Some(creator) = branch_creator {
            request = request.on_branch(creator);
        }
        authorize(action, &request)?;
        Ok(())
    }

    /// Resolve the grant of `user` on `root` and check `action` against it.
    pub(crate) async fn require(
        &self,
        action: Action,
        root: &DocumentRecord,
        user: &UserId,
        branch_creator: Option<&UserId>,
    ) -> Result<Grant> {
        let grant = self.grant_for(root, user).await?;
        self.authorize(action, user, grant, branch_creator)?;
        // authorize never passes without a grant
        grant.ok_or_else(|| VellumError::permission_denied("Access denied"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// The key sealing `root` (and its branches), as unwrapped by `user`.
    ///
    /// `None` for public documents.
    pub(crate) async fn document_key(
        &self,
        root: &DocumentRecord,
        user: &UserId,
    ) -> Result<Option<EncryptionKey>> {
        if root.is_public {
            return Ok(None);
        }
        let expected = root.key_fingerprint.ok_or_else(|| {
            VellumError::new(ErrorKind::Storage, "Private document has no key fingerprint")
        })?;

        if let Some(key) = self.keyring.get(&root.id, &expected) {
            return Ok(Some(key));
        }

        let wrapped = self
            .access_entry(&root.id, user)
            .await?
            .and_then(|entry| entry.record.wrapped_key)
            .ok_or_else(|| VellumError::crypto("No document key has been shared with you"))?;

        if wrapped.fingerprint != expected {
            tracing::warn!(doc = %root.id, user = %user, "wrapped key does not match document key");
            return Err(VellumError::crypto("Document key is stale"));
        }

        let key = wrapped.unwrap(self.identity.as_ref(), &wrap_context(&root.id, user))?;
        self.keyring.insert(root.id, key.clone());
        tracing::debug!(doc = %root.id, fingerprint = %expected, "unwrapped document key");
        Ok(Some(key))
    }

    /// Record the current key of `root` locally, or forget it.
    pub(crate) fn remember_key(&self, root: DocumentId, key: Option<&EncryptionKey>) {
        match key {
            Some(key) => self.keyring.insert(root, key.clone()),
            None => self.keyring.evict(&root),
        }
    }

    /// Wrap `key` for `user` on `root`, looking up their public key.
    pub(crate) async fn wrap_for(
        &self,
        root: &DocumentId,
        user: &UserId,
        key: &EncryptionKey,
    ) -> Result<WrappedKey> {
        let me = self.identity.identity();
        let public_key = if me.user_id == *user {
            me.public_key
        } else {
            self.directory
                .profile(user)
                .await?
                .ok_or_else(|| VellumError::not_found("User not found"))?
                .public_key
        };
        self.wrap_to(root, user, &public_key, key)
    }

    /// Wrap `key` for `user` whose public key is already known.
    pub(crate) fn wrap_to(
        &self,
        root: &DocumentId,
        user: &UserId,
        public_key: &X25519PublicKey,
        key: &EncryptionKey,
    ) -> Result<WrappedKey> {
        Ok(WrappedKey::wrap(
            key,
            self.identity.as_ref(),
            public_key,
            &wrap_context(root, user),
        )?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Multi-record maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-seal every branch of `root` from `old` to `new` through `journal`.
    pub(crate) async fn reseal_branches(
        &self,
        root: &DocumentId,
        old: Option<&EncryptionKey>,
        new: Option<&EncryptionKey>,
        journal: &mut WriteJournal<'_, S>,
    ) -> Result<usize> {
        let mut resealed = 0;
        for branch in self.branches_of(root).await? {
            let path = paths::document(&branch.record.id);
            let mut current = branch;
            let mut attempts = 0;
            loop {
                attempts += 1;
                let next = reseal_record(&current.record, old, new)?;
                match journal
                    .compare_and_swap(&path, &current.node, codec::encode_node(&next)?)
                    .await?
                {
                    CasOutcome::Swapped => {
                        resealed += 1;
                        break;
                    }
                    CasOutcome::Mismatch { current: Some(node) } if attempts < MAX_CAS_ATTEMPTS => {
                        match Stored::decode(node)? {
                            Some(fresh) => current = fresh,
                            None => break,
                        }
                    }
                    CasOutcome::Mismatch { current: None } => break,
                    CasOutcome::Mismatch { .. } => {
                        return Err(VellumError::invalid_state(
                            "Branch changed concurrently, try again",
                        ));
                    }
                }
            }
        }
        Ok(resealed)
    }

    /// Tombstone every share token issued for `doc`.
    pub(crate) async fn revoke_document_tokens(
        &self,
        doc: &DocumentId,
        journal: &mut WriteJournal<'_, S>,
    ) -> Result<usize> {
        let index = bounded(
            self.config.store_timeout,
            self.store.list(&paths::doc_token_prefix(doc)),
        )
        .await?;

        let mut revoked = 0;
        for (path, node) in index {
            if node.is_tombstone() {
                continue;
            }
            let hash = paths::leaf(&path).to_string();
            journal.delete(&paths::token(&hash)).await?;
            journal.delete(&path).await?;
            revoked += 1;
        }
        if revoked > 0 {
            tracing::info!(doc = %doc, revoked, "revoked share tokens");
        }
        Ok(revoked)
    }
}

/// Re-seal the fields of a record under a new key (or in plaintext).
pub(crate) fn reseal_record(
    record: &DocumentRecord,
    old: Option<&EncryptionKey>,
    new: Option<&EncryptionKey>,
) -> Result<DocumentRecord> {
    Ok(DocumentRecord {
        title: record.title.reseal(old, new)?,
        content: record.content.reseal(old, new)?,
        tags: record.tags.reseal(old, new)?,
        is_public: new.is_none(),
        key_fingerprint: new.map(EncryptionKey::fingerprint),
        ..record.clone()
    })
}
