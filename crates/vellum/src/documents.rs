//! Document key manager.
//!
//! Owns the per-document symmetric key lifecycle: creation, the
//! public/private transitions, rotation, and reads that open sealed fields.
//! A private document has exactly one key at a time; every branch of it is
//! sealed under the same key.

use std::sync::Arc;

use vellum_core::{
    now_millis, validate_content, validate_tags, validate_title, DocumentId, Permission, UserId,
};
use vellum_perms::{generate_key, Action, EncryptionKey, Sealed};
use vellum_store::{codec, paths, CasOutcome, GraphStore, Node};

use crate::context::{reseal_record, Context, Lookup, Stored, MAX_CAS_ATTEMPTS};
use crate::directory::ProfileDirectory;
use crate::error::{Result, VellumError};
use crate::journal::WriteJournal;
use crate::records::{AccessEntry, DocumentRecord};
use crate::views::{AccessSummary, DocumentMetadata, DocumentView};

/// Input to [`DocumentManager::create_document`].
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    /// Required; `None` fails validation. An empty string is allowed.
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
}

impl NewDocument {
    /// A private document with no tags.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Some(content.into()),
            tags: Vec::new(),
            is_public: false,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }
}

/// Owner edits to a root document. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Document key manager.
pub struct DocumentManager<S: GraphStore, D: ProfileDirectory> {
    ctx: Arc<Context<S, D>>,
}

impl<S: GraphStore, D: ProfileDirectory> Clone for DocumentManager<S, D> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: GraphStore, D: ProfileDirectory> DocumentManager<S, D> {
    pub fn new(ctx: Arc<Context<S, D>>) -> Self {
        Self { ctx }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create / read
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a document owned by the current user.
    ///
    /// Private documents get a fresh key; the owner's access entry carries it
    /// wrapped for the owner.
    pub async fn create_document(&self, new: NewDocument) -> Result<DocumentView> {
        let user = self.ctx.current_user()?;
        let limits = self.ctx.config().limits();
        validate_title(&new.title, &limits)?;
        let content = validate_content(new.content.as_deref())?.to_string();
        validate_tags(&new.tags, &limits)?;

        let id = DocumentId::generate();
        let now = now_millis();
        let key = (!new.is_public).then(generate_key);

        let wrapped_key = match &key {
            Some(key) => Some(self.ctx.wrap_for(&id, &user, key).await?),
            None => None,
        };
        let owner_entry = AccessEntry {
            user_id: user.clone(),
            permission: Permission::Owner,
            wrapped_key,
            granted_at: now,
        };
        let record = DocumentRecord {
            id,
            owner: user.clone(),
            title: Sealed::seal(new.title.clone(), key.as_ref())?,
            content: Sealed::seal(content.clone(), key.as_ref())?,
            tags: Sealed::seal(new.tags.clone(), key.as_ref())?,
            is_public: new.is_public,
            key_fingerprint: key.as_ref().map(EncryptionKey::fingerprint),
            created_at: now,
            updated_at: now,
            branch: None,
        };

        let mut journal = self.ctx.journal();
        let written = async {
            journal
                .put_replacing(
                    &paths::access(&id, &user),
                    None,
                    codec::encode_node(&owner_entry)?,
                )
                .await?;
            journal
                .put_replacing(&paths::owned(&user, &id), None, codec::encode_node(&id)?)
                .await?;
            journal
                .put_replacing(&paths::document(&id), None, codec::encode_node(&record)?)
                .await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        self.ctx.remember_key(id, key.as_ref());
        tracing::info!(doc = %id, owner = %user, public = new.is_public, "created document");

        Ok(DocumentView {
            id,
            owner: user.clone(),
            title: new.title,
            content,
            tags: new.tags,
            is_public: new.is_public,
            created_at: now,
            updated_at: now,
            access: vec![AccessSummary {
                user_id: user,
                permission: Permission::Owner,
            }],
        })
    }

    /// Read and decrypt a document.
    ///
    /// `Ok(None)` when nothing arrived within the settle window;
    /// `NOT_FOUND` only when the document was deleted.
    pub async fn get_document(&self, id: &DocumentId) -> Result<Option<DocumentView>> {
        let Some(opened) = self.open(id).await? else {
            return Ok(None);
        };
        let record = &opened.record;
        Ok(Some(DocumentView {
            id: record.id,
            owner: record.owner.clone(),
            title: record.title.open(opened.key.as_ref())?,
            content: record.content.open(opened.key.as_ref())?,
            tags: record.tags.open(opened.key.as_ref())?,
            is_public: record.is_public,
            created_at: record.created_at,
            updated_at: record.updated_at,
            access: opened.access,
        }))
    }

    /// Like [`get_document`](Self::get_document), without the content.
    pub async fn get_document_metadata(&self, id: &DocumentId) -> Result<Option<DocumentMetadata>> {
        let Some(opened) = self.open(id).await? else {
            return Ok(None);
        };
        metadata(&opened.record, opened.key.as_ref(), opened.access).map(Some)
    }

    /// Root documents owned by the current user, most recently updated first.
    pub async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        let user = self.ctx.current_user()?;
        let owned: Vec<(String, Stored<DocumentId>)> =
            self.ctx.list_live(&paths::owned_prefix(&user)).await?;

        let mut out = Vec::with_capacity(owned.len());
        for (_, entry) in owned {
            let Some(stored) = self.ctx.fetch_document(&entry.record).await? else {
                continue;
            };
            let record = stored.record;
            let opened = async {
                let key = self.ctx.document_key(&record, &user).await?;
                let access = summaries(self.ctx.access_entries(&record.id).await?);
                metadata(&record, key.as_ref(), access)
            }
            .await;
            match opened {
                Ok(meta) => out.push(meta),
                Err(e) => tracing::warn!(doc = %record.id, error = %e, "skipping unreadable document"),
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Owner edit of a root document's title, content or tags.
    pub async fn update_document(&self, id: &DocumentId, update: DocumentUpdate) -> Result<DocumentView> {
        let user = self.ctx.current_user()?;
        let limits = self.ctx.config().limits();
        if let Some(title) = &update.title {
            validate_title(title, &limits)?;
        }
        if let Some(tags) = &update.tags {
            validate_tags(tags, &limits)?;
        }

        let mut stored = self.load_root(id).await?;
        self.ctx
            .require(Action::EditDocument, &stored.record, &user, None)
            .await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let key = self.ctx.document_key(&stored.record, &user).await?;
            let key = key.as_ref();
            let mut next = stored.record.clone();
            if let Some(title) = &update.title {
                next.title = Sealed::seal(title.clone(), key)?;
            }
            if let Some(content) = &update.content {
                next.content = Sealed::seal(content.clone(), key)?;
            }
            if let Some(tags) = &update.tags {
                next.tags = Sealed::seal(tags.clone(), key)?;
            }
            next.updated_at = now_millis();

            let path = paths::document(id);
            match self.ctx.cas(&path, &stored.node, codec::encode_node(&next)?).await? {
                CasOutcome::Swapped => {
                    tracing::info!(doc = %id, "updated document");
                    let access = summaries(self.ctx.access_entries(id).await?);
                    return Ok(DocumentView {
                        id: *id,
                        owner: next.owner.clone(),
                        title: next.title.open(key)?,
                        content: next.content.open(key)?,
                        tags: next.tags.open(key)?,
                        is_public: next.is_public,
                        created_at: next.created_at,
                        updated_at: next.updated_at,
                        access,
                    });
                }
                CasOutcome::Mismatch { current: Some(node) } => {
                    stored = Stored::decode(node)?
                        .ok_or_else(|| VellumError::not_found("Document not found"))?;
                    tracing::debug!(doc = %id, "document changed during update, retrying");
                }
                CasOutcome::Mismatch { current: None } => {
                    return Err(VellumError::not_found("Document not found"));
                }
            }
        }
        Err(VellumError::invalid_state(
            "Document changed concurrently, try again",
        ))
    }

    /// Make a document public: store plaintext, drop every wrapped key.
    ///
    /// Idempotent if the document is already public.
    pub async fn set_document_public(&self, id: &DocumentId) -> Result<()> {
        let user = self.ctx.current_user()?;
        let stored = self.load_root(id).await?;
        self.ctx
            .require(Action::ChangeVisibility, &stored.record, &user, None)
            .await?;

        if stored.record.is_public {
            tracing::debug!(doc = %id, "document already public");
            return Ok(());
        }

        let old = self.ctx.document_key(&stored.record, &user).await?;
        let mut next = reseal_record(&stored.record, old.as_ref(), None)?;
        next.updated_at = now_millis();

        let entries = self.ctx.access_entries(id).await?;
        let mut journal = self.ctx.journal();
        let written = async {
            for entry in &entries {
                if entry.record.wrapped_key.is_none() {
                    continue;
                }
                let cleared = AccessEntry {
                    wrapped_key: None,
                    ..entry.record.clone()
                };
                journal
                    .put_replacing(
                        &paths::access(id, &entry.record.user_id),
                        Some(entry.node.clone()),
                        codec::encode_node(&cleared)?,
                    )
                    .await?;
            }
            self.ctx
                .reseal_branches(id, old.as_ref(), None, &mut journal)
                .await?;
            swap_document(&mut journal, &stored, &next).await
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        self.ctx.remember_key(*id, None);
        tracing::info!(doc = %id, "document made public");
        Ok(())
    }

    /// Make a document private under `key` (or a fresh key).
    ///
    /// The key is wrapped for the owner and every existing collaborator.
    /// Idempotent when already private and no key is given; supplying a key
    /// for an already private document is `INVALID_STATE`.
    pub async fn set_document_private(&self, id: &DocumentId, key: Option<EncryptionKey>) -> Result<()> {
        let user = self.ctx.current_user()?;
        let stored = self.load_root(id).await?;
        self.ctx
            .require(Action::ChangeVisibility, &stored.record, &user, None)
            .await?;

        if !stored.record.is_public {
            if key.is_some() {
                return Err(VellumError::invalid_state(
                    "Document is already private; change its key instead",
                ));
            }
            tracing::debug!(doc = %id, "document already private");
            return Ok(());
        }

        let key = key.unwrap_or_else(generate_key);
        self.rekey(&user, stored, None, &key).await?;
        tracing::info!(doc = %id, fingerprint = %key.fingerprint(), "document made private");
        Ok(())
    }

    /// Rotate the key of a private document.
    ///
    /// Every field is re-sealed, every branch re-sealed, and the new key
    /// re-wrapped for every access entry. If the key cannot be wrapped for
    /// some collaborator nothing is written and `PARTIAL_FAILURE` names them.
    /// Entries shared under the old key while the rotation runs are re-wrapped
    /// after the root is swapped. Outstanding share tokens are revoked.
    pub async fn change_document_key(&self, id: &DocumentId, new_key: EncryptionKey) -> Result<()> {
        let user = self.ctx.current_user()?;
        let stored = self.load_root(id).await?;
        self.ctx
            .require(Action::RotateKey, &stored.record, &user, None)
            .await?;

        if stored.record.is_public {
            return Err(VellumError::invalid_state("Public documents have no key"));
        }

        let old = self.ctx.document_key(&stored.record, &user).await?;
        self.rekey(&user, stored, old.as_ref(), &new_key).await?;
        tracing::info!(doc = %id, fingerprint = %new_key.fingerprint(), "rotated document key");
        Ok(())
    }

    /// Delete a root document with its access entries, indexes, branches
    /// and share tokens.
    pub async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        let user = self.ctx.current_user()?;
        let stored = self.load_root(id).await?;
        self.ctx
            .require(Action::DeleteDocument, &stored.record, &user, None)
            .await?;

        let owner = stored.record.owner.clone();
        let entries = self.ctx.access_entries(id).await?;
        let branches = self.ctx.branches_of(id).await?;

        let mut journal = self.ctx.journal();
        let written = async {
            for branch in &branches {
                let branch_id = branch.record.id;
                journal.delete(&paths::document(&branch_id)).await?;
                journal.delete(&paths::branch_index(id, &branch_id)).await?;
            }
            for entry in &entries {
                let member = &entry.record.user_id;
                journal.delete(&paths::access(id, member)).await?;
                if *member != owner {
                    journal.delete(&paths::inbox(member, id)).await?;
                }
            }
            self.ctx.revoke_document_tokens(id, &mut journal).await?;
            journal.delete(&paths::owned(&owner, id)).await?;
            journal.delete(&paths::document(id)).await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        self.ctx.remember_key(*id, None);
        tracing::info!(doc = %id, branches = branches.len(), "deleted document");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a root document, failing `NOT_FOUND` if absent or deleted and
    /// `VALIDATION_ERROR` if `id` names a branch.
    async fn load_root(&self, id: &DocumentId) -> Result<Stored<DocumentRecord>> {
        let stored = self
            .ctx
            .load_document(id)
            .await?
            .require("Document not found")?;
        if stored.record.is_branch() {
            return Err(VellumError::validation(
                "Operation applies to root documents, not branches",
            ));
        }
        Ok(stored)
    }

    /// Seal a document under `new`, wrapping for every holder first.
    ///
    /// All wraps are prepared before anything is written; a user whose key
    /// cannot be wrapped aborts with `PARTIAL_FAILURE`. A failed write rolls
    /// back what was already written.
    async fn rekey(
        &self,
        user: &UserId,
        stored: Stored<DocumentRecord>,
        old: Option<&EncryptionKey>,
        new: &EncryptionKey,
    ) -> Result<()> {
        let id = stored.record.id;
        let entries = self.ctx.access_entries(&id).await?;

        let mut holders: Vec<(AccessEntry, Option<Node>)> = entries
            .into_iter()
            .map(|e| (e.record, Some(e.node)))
            .collect();
        if !holders.iter().any(|(e, _)| e.user_id == stored.record.owner) {
            holders.push((
                AccessEntry {
                    user_id: stored.record.owner.clone(),
                    permission: Permission::Owner,
                    wrapped_key: None,
                    granted_at: now_millis(),
                },
                None,
            ));
        }

        let mut prepared = Vec::with_capacity(holders.len());
        let mut failed = Vec::new();
        for (entry, previous) in holders {
            match self.ctx.wrap_for(&id, &entry.user_id, new).await {
                Ok(wrapped) => prepared.push((
                    AccessEntry {
                        wrapped_key: Some(wrapped),
                        ..entry
                    },
                    previous,
                )),
                Err(e) => {
                    tracing::warn!(doc = %id, user = %entry.user_id, error = %e, "cannot wrap key for collaborator");
                    failed.push(entry.user_id);
                }
            }
        }
        if !failed.is_empty() {
            return Err(unwrappable(failed));
        }

        let mut next = reseal_record(&stored.record, old, Some(new))?;
        next.updated_at = now_millis();

        let mut journal = self.ctx.journal();
        let written = async {
            for (entry, previous) in &prepared {
                journal
                    .put_replacing(
                        &paths::access(&id, &entry.user_id),
                        previous.clone(),
                        codec::encode_node(entry)?,
                    )
                    .await?;
            }
            self.ctx
                .reseal_branches(&id, old, Some(new), &mut journal)
                .await?;
            self.ctx.revoke_document_tokens(&id, &mut journal).await?;
            swap_document(&mut journal, &stored, &next).await?;
            self.rewrap_late_entries(&id, new, &mut journal).await
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        self.ctx.remember_key(id, Some(new));
        tracing::debug!(doc = %id, holders = prepared.len(), author = %user, "re-wrapped document key");
        Ok(())
    }

    /// Re-wrap access entries that were shared under the old key while the
    /// rotation ran.
    ///
    /// An entry that cannot be re-wrapped, or that changes again underneath,
    /// fails the rotation with `PARTIAL_FAILURE` naming its user.
    async fn rewrap_late_entries(
        &self,
        id: &DocumentId,
        key: &EncryptionKey,
        journal: &mut WriteJournal<'_, S>,
    ) -> Result<()> {
        let fingerprint = key.fingerprint();
        let mut failed = Vec::new();
        for entry in self.ctx.access_entries(id).await? {
            if entry.record.wrapped_key.as_ref().map(|w| w.fingerprint) == Some(fingerprint) {
                continue;
            }
            let user = entry.record.user_id.clone();
            tracing::debug!(doc = %id, user = %user, "access entry landed during rotation, re-wrapping");
            let wrapped = match self.ctx.wrap_for(id, &user, key).await {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    tracing::warn!(doc = %id, user = %user, error = %e, "cannot wrap key for collaborator");
                    failed.push(user);
                    continue;
                }
            };
            let rewrapped = AccessEntry {
                wrapped_key: Some(wrapped),
                ..entry.record
            };
            let outcome = journal
                .compare_and_swap(
                    &paths::access(id, &user),
                    &entry.node,
                    codec::encode_node(&rewrapped)?,
                )
                .await?;
            if let CasOutcome::Mismatch { .. } = outcome {
                failed.push(user);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(unwrappable(failed))
        }
    }

    /// Load any document or branch the current user may view, with its key.
    async fn open(&self, id: &DocumentId) -> Result<Option<Opened>> {
        let user = self.ctx.current_user()?;
        let stored = match self.ctx.load_document(id).await? {
            Lookup::Found(stored) => stored,
            Lookup::Deleted => return Err(VellumError::not_found("Document not found")),
            Lookup::Absent => {
                tracing::debug!(doc = %id, "document not present after settle window");
                return Ok(None);
            }
        };

        let root = if stored.record.is_branch() {
            self.ctx
                .load_document(&stored.record.root_id())
                .await?
                .require("Document not found")?
                .record
        } else {
            stored.record.clone()
        };

        self.ctx
            .require(Action::ViewDocument, &root, &user, None)
            .await?;
        let key = self.ctx.document_key(&root, &user).await?;
        let access = summaries(self.ctx.access_entries(&root.id).await?);
        tracing::debug!(doc = %id, "opened document");

        Ok(Some(Opened {
            record: stored.record,
            key,
            access,
        }))
    }
}

struct Opened {
    record: DocumentRecord,
    key: Option<EncryptionKey>,
    access: Vec<AccessSummary>,
}

/// CAS the root record from what was read to `next`.
async fn swap_document<S: GraphStore + ?Sized>(
    journal: &mut WriteJournal<'_, S>,
    stored: &Stored<DocumentRecord>,
    next: &DocumentRecord,
) -> Result<()> {
    let outcome = journal
        .compare_and_swap(
            &paths::document(&next.id),
            &stored.node,
            codec::encode_node(next)?,
        )
        .await?;
    match outcome {
        CasOutcome::Swapped => Ok(()),
        CasOutcome::Mismatch { .. } => Err(VellumError::invalid_state(
            "Document changed concurrently, try again",
        )),
    }
}

fn unwrappable(failed: Vec<UserId>) -> VellumError {
    let names: Vec<&str> = failed.iter().map(UserId::as_str).collect();
    VellumError::partial_failure(
        format!("Could not wrap the document key for: {}", names.join(", ")),
        failed,
    )
}

/// Access summaries, owner first.
pub(crate) fn summaries(entries: Vec<Stored<AccessEntry>>) -> Vec<AccessSummary> {
    let mut out: Vec<AccessSummary> = entries
        .into_iter()
        .map(|e| AccessSummary {
            user_id: e.record.user_id,
            permission: e.record.permission,
        })
        .collect();
    out.sort_by(|a, b| {
        b.permission
            .cmp(&a.permission)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    out
}

fn metadata(
    record: &DocumentRecord,
    key: Option<&EncryptionKey>,
    access: Vec<AccessSummary>,
) -> Result<DocumentMetadata> {
    Ok(DocumentMetadata {
        id: record.id,
        owner: record.owner.clone(),
        title: record.title.open(key)?,
        tags: record.tags.open(key)?,
        is_public: record.is_public,
        created_at: record.created_at,
        updated_at: record.updated_at,
        access,
    })
}
