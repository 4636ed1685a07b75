//! Branch manager: suggestion branches and their review.
//!
//! ```text
//! pending ──submit──▶ submitted ──merge──▶ merged
//!                         │
//!                         └────reject──▶ rejected
//! ```
//!
//! Branches are document records sealed under their root's key. Every status
//! change is a compare-and-swap against the record that was read, so two
//! reviewers racing on the same branch cannot both win.

use std::sync::Arc;

use vellum_core::{now_millis, validate_content, BranchStatus, DocumentId, MergeSource, UserId};
use vellum_perms::{Action, EncryptionKey, Sealed};
use vellum_store::{codec, paths, CasOutcome, GraphStore, Node};

use crate::context::{Context, Lookup, Stored, MAX_CAS_ATTEMPTS};
use crate::diff::ContentDiff;
use crate::directory::ProfileDirectory;
use crate::error::{Result, VellumError};
use crate::journal::WriteJournal;
use crate::records::{BranchInfo, DocumentRecord};
use crate::views::{BranchView, MergePreview};

/// A branch together with the root it belongs to.
struct Loaded {
    branch: Stored<DocumentRecord>,
    root: Stored<DocumentRecord>,
    creator: UserId,
}

fn info_of(record: &DocumentRecord) -> Result<&BranchInfo> {
    record
        .branch
        .as_ref()
        .ok_or_else(|| VellumError::not_found("Not a branch document"))
}

/// Move `record` to `next`, failing `INVALID_STATE` with `message`.
fn advance(record: &DocumentRecord, next: BranchStatus, message: &'static str) -> Result<DocumentRecord> {
    let info = info_of(record)?;
    let status = info
        .status
        .transition(next)
        .map_err(|e| VellumError::invalid_state(message).with_source(e))?;
    let mut out = record.clone();
    if let Some(info) = out.branch.as_mut() {
        info.status = status;
    }
    out.updated_at = now_millis();
    Ok(out)
}

fn digest(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Branch manager.
pub struct BranchManager<S: GraphStore, D: ProfileDirectory> {
    ctx: Arc<Context<S, D>>,
}

impl<S: GraphStore, D: ProfileDirectory> Clone for BranchManager<S, D> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: GraphStore, D: ProfileDirectory> BranchManager<S, D> {
    pub fn new(ctx: Arc<Context<S, D>>) -> Self {
        Self { ctx }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create / read
    // ─────────────────────────────────────────────────────────────────────────

    /// Fork `parent` (a root or another branch) into a new pending branch.
    ///
    /// The new branch always points at the root as its `original`, whatever
    /// depth it was forked at.
    pub async fn create_branch(&self, parent: &DocumentId) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let parent = self
            .ctx
            .load_document(parent)
            .await?
            .require("Parent document not found")?
            .record;
        let root = if parent.is_branch() {
            self.load_root(&parent.root_id()).await?.record
        } else {
            parent.clone()
        };

        self.ctx
            .require(Action::CreateBranch, &root, &me, None)
            .await?;
        let key = self.ctx.document_key(&root, &me).await?;
        let key = key.as_ref();

        let id = DocumentId::generate();
        let now = now_millis();
        let record = DocumentRecord {
            id,
            owner: root.owner.clone(),
            title: Sealed::seal(parent.title.open(key)?, key)?,
            content: Sealed::seal(parent.content.open(key)?, key)?,
            tags: Sealed::seal(parent.tags.open(key)?, key)?,
            is_public: root.is_public,
            key_fingerprint: root.key_fingerprint,
            created_at: now,
            updated_at: now,
            branch: Some(BranchInfo {
                original: root.id,
                parent: parent.id,
                status: BranchStatus::Pending,
                created_by: me.clone(),
                submitted_at: None,
                reviewed_at: None,
                reviewed_by: None,
                rejection_reason: None,
            }),
        };

        let mut journal = self.ctx.journal();
        let written = async {
            journal
                .put_replacing(
                    &paths::branch_index(&root.id, &id),
                    None,
                    codec::encode_node(&id)?,
                )
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

        tracing::info!(branch = %id, doc = %root.id, parent = %parent.id, user = %me, "created branch");
        view(&record, key)
    }

    /// Read and decrypt a branch.
    pub async fn get_branch(&self, id: &DocumentId) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(Action::ViewDocument, &loaded.root.record, &me, None)
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        tracing::debug!(branch = %id, "opened branch");
        view(&loaded.branch.record, key.as_ref())
    }

    /// Every branch of `root`, oldest first.
    pub async fn list_branches(&self, root: &DocumentId) -> Result<Vec<BranchView>> {
        let me = self.ctx.current_user()?;
        let root = self.load_root(root).await?.record;
        self.ctx
            .require(Action::ViewDocument, &root, &me, None)
            .await?;
        let key = self.ctx.document_key(&root, &me).await?;

        self.ctx
            .branches_of(&root.id)
            .await?
            .iter()
            .map(|b| view(&b.record, key.as_ref()))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the content of a pending branch.
    pub async fn update_branch(&self, id: &DocumentId, content: &str) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        validate_content(Some(content))?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(
                Action::EditBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        let key = key.as_ref();

        let mut journal = self.ctx.journal();
        let updated = self
            .swap_branch(&mut journal, loaded.branch, |record| {
                ensure_sealed_under(record, key)?;
                let info = info_of(record)?;
                if !info.status.is_editable() {
                    return Err(VellumError::invalid_state(
                        "Only pending branches can be edited",
                    ));
                }
                let mut next = record.clone();
                next.content = Sealed::seal(content.to_string(), key)?;
                next.updated_at = now_millis();
                Ok(next)
            })
            .await?;
        journal.commit();

        tracing::info!(branch = %id, user = %me, "updated branch");
        view(&updated, key)
    }

    /// Edit a shared document through the caller's pending branch of it,
    /// starting one if there is none.
    pub async fn edit_shared_document(&self, root: &DocumentId, content: &str) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        validate_content(Some(content))?;
        let root = self.load_root(root).await?.record;
        self.ctx
            .require(Action::CreateBranch, &root, &me, None)
            .await?;

        let existing = self
            .ctx
            .branches_of(&root.id)
            .await?
            .into_iter()
            .filter(|b| {
                b.record.branch.as_ref().is_some_and(|info| {
                    info.created_by == me && info.status == BranchStatus::Pending
                })
            })
            .last();

        let branch_id = match existing {
            Some(branch) => {
                tracing::debug!(branch = %branch.record.id, doc = %root.id, "reusing pending branch");
                branch.record.id
            }
            None => self.create_branch(&root.id).await?.id,
        };
        self.update_branch(&branch_id, content).await
    }

    /// Preview pulling `source` content into the `working` branch.
    ///
    /// Nothing is written; pass the preview to
    /// [`apply_merge`](Self::apply_merge) to confirm.
    pub async fn merge_from_branch(
        &self,
        working: &DocumentId,
        source: MergeSource,
    ) -> Result<MergePreview> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(working).await?;
        self.ctx
            .require(Action::ViewDiff, &loaded.root.record, &me, None)
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        let key = key.as_ref();

        let (source_id, source_content) = self.source_content(&loaded, source, key).await?;
        let working_content = loaded.branch.record.content.open(key)?;
        let diff = ContentDiff::compute(
            &working.to_string(),
            &working_content,
            &source_id.to_string(),
            &source_content,
        );

        tracing::debug!(branch = %working, source = %source_id, changes = diff.insertions + diff.deletions, "prepared merge preview");
        Ok(MergePreview {
            working_id: *working,
            source,
            source_id,
            diff,
            source_digest: digest(&source_content),
            source_content,
        })
    }

    /// Overwrite the working branch with the content of a confirmed preview.
    ///
    /// Fails `INVALID_STATE` if the source changed since the preview was made.
    pub async fn apply_merge(&self, preview: &MergePreview) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(&preview.working_id).await?;
        self.ctx
            .require(
                Action::EditBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        let key = key.as_ref();

        let (_, current) = self.source_content(&loaded, preview.source, key).await?;
        if digest(&current) != preview.source_digest {
            return Err(VellumError::invalid_state(
                "Merge source changed since the preview",
            ));
        }

        let mut journal = self.ctx.journal();
        let updated = self
            .swap_branch(&mut journal, loaded.branch, |record| {
                ensure_sealed_under(record, key)?;
                if !info_of(record)?.status.is_editable() {
                    return Err(VellumError::invalid_state(
                        "Only pending branches can be edited",
                    ));
                }
                let mut next = record.clone();
                next.content = Sealed::seal(current.clone(), key)?;
                next.updated_at = now_millis();
                Ok(next)
            })
            .await?;
        journal.commit();

        tracing::info!(branch = %preview.working_id, source = %preview.source_id, "applied merge");
        view(&updated, key)
    }

    /// Diff of the root's content against the branch's, for review.
    pub async fn branch_diff(&self, id: &DocumentId) -> Result<ContentDiff> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(Action::ViewDiff, &loaded.root.record, &me, None)
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        let key = key.as_ref();

        let root_content = loaded.root.record.content.open(key)?;
        let branch_content = loaded.branch.record.content.open(key)?;
        Ok(ContentDiff::compute(
            &loaded.root.record.id.to_string(),
            &root_content,
            &id.to_string(),
            &branch_content,
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Review
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand a pending branch to the owner for review. Its content is frozen
    /// from here on.
    pub async fn submit_branch(&self, id: &DocumentId) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(
                Action::SubmitBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;

        let mut journal = self.ctx.journal();
        let submitted = self
            .swap_branch(&mut journal, loaded.branch, |record| {
                let mut next = advance(
                    record,
                    BranchStatus::Submitted,
                    "Only pending branches can be submitted",
                )?;
                if let Some(info) = next.branch.as_mut() {
                    info.submitted_at = Some(next.updated_at);
                }
                Ok(next)
            })
            .await?;
        journal.commit();

        tracing::info!(branch = %id, user = %me, "submitted branch");
        view(&submitted, key.as_ref())
    }

    /// Merge a submitted branch into its root.
    ///
    /// The branch is claimed as merged first; if the root cannot then be
    /// written the claim is rolled back to submitted.
    pub async fn merge_branch(&self, id: &DocumentId) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(
                Action::MergeBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;
        let key = key.as_ref();

        let Loaded { branch, root, .. } = loaded;
        let mut journal = self.ctx.journal();
        let merged = async {
            let merged = self
                .swap_branch(&mut journal, branch, |record| {
                    ensure_sealed_under(record, key)?;
                    let mut next = advance(
                        record,
                        BranchStatus::Merged,
                        "Only submitted branches can be merged",
                    )?;
                    if let Some(info) = next.branch.as_mut() {
                        info.reviewed_at = Some(next.updated_at);
                        info.reviewed_by = Some(me.clone());
                    }
                    Ok(next)
                })
                .await?;
            let content = merged.content.open(key)?;
            self.write_root_content(&mut journal, root, &content, &me)
                .await?;
            Ok::<_, VellumError>(merged)
        }
        .await;

        let merged = match merged {
            Ok(merged) => merged,
            Err(e) => {
                if !journal.is_empty() {
                    tracing::warn!(branch = %id, error = %e, "merge failed, releasing claim");
                }
                journal.rollback().await;
                return Err(e);
            }
        };
        journal.commit();

        tracing::info!(branch = %id, doc = %merged.root_id(), user = %me, "merged branch");
        view(&merged, key)
    }

    /// Decline a submitted branch, optionally saying why.
    pub async fn reject_branch(&self, id: &DocumentId, reason: Option<String>) -> Result<BranchView> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(
                Action::RejectBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;
        let key = self.ctx.document_key(&loaded.root.record, &me).await?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let mut journal = self.ctx.journal();
        let rejected = self
            .swap_branch(&mut journal, loaded.branch, |record| {
                let mut next = advance(
                    record,
                    BranchStatus::Rejected,
                    "Only submitted branches can be rejected",
                )?;
                if let Some(info) = next.branch.as_mut() {
                    info.reviewed_at = Some(next.updated_at);
                    info.reviewed_by = Some(me.clone());
                    info.rejection_reason = reason.clone();
                }
                Ok(next)
            })
            .await?;
        journal.commit();

        tracing::info!(branch = %id, user = %me, "rejected branch");
        view(&rejected, key.as_ref())
    }

    /// Delete a pending or submitted branch. The root and its key are never
    /// touched.
    pub async fn delete_branch(&self, id: &DocumentId) -> Result<()> {
        let me = self.ctx.current_user()?;
        let loaded = self.load_branch(id).await?;
        self.ctx
            .require(
                Action::DeleteBranch,
                &loaded.root.record,
                &me,
                Some(&loaded.creator),
            )
            .await?;

        let root_id = loaded.root.record.id;
        let path = paths::document(id);
        let mut current = loaded.branch;
        let mut journal = self.ctx.journal();
        let deleted = async {
            for _ in 0..MAX_CAS_ATTEMPTS {
                if !info_of(&current.record)?.status.is_deletable() {
                    return Err(VellumError::invalid_state(
                        "Merged or rejected branches cannot be deleted",
                    ));
                }
                let tombstone = Node::Tombstone {
                    deleted_at: now_millis(),
                };
                match journal
                    .compare_and_swap(&path, &current.node, tombstone)
                    .await?
                {
                    CasOutcome::Swapped => {
                        journal.delete(&paths::branch_index(&root_id, id)).await?;
                        return Ok(());
                    }
                    CasOutcome::Mismatch { current: Some(node) } => {
                        current = Stored::decode(node)?
                            .ok_or_else(|| VellumError::not_found("Branch not found"))?;
                    }
                    CasOutcome::Mismatch { current: None } => {
                        return Err(VellumError::not_found("Branch not found"));
                    }
                }
            }
            Err(VellumError::invalid_state(
                "Branch changed concurrently, try again",
            ))
        }
        .await;
        if let Err(e) = deleted {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        tracing::info!(branch = %id, doc = %root_id, user = %me, "deleted branch");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

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

    async fn load_branch(&self, id: &DocumentId) -> Result<Loaded> {
        let branch = match self.ctx.load_document(id).await? {
            Lookup::Found(stored) if stored.record.is_branch() => stored,
            Lookup::Found(_) => return Err(VellumError::not_found("Not a branch document")),
            Lookup::Deleted | Lookup::Absent => {
                return Err(VellumError::not_found("Branch not found"))
            }
        };
        let creator = info_of(&branch.record)?.created_by.clone();
        let root = self.load_root(&branch.record.root_id()).await?;
        Ok(Loaded {
            branch,
            root,
            creator,
        })
    }

    /// The id and decrypted content a merge would pull from.
    async fn source_content(
        &self,
        working: &Loaded,
        source: MergeSource,
        key: Option<&EncryptionKey>,
    ) -> Result<(DocumentId, String)> {
        match source {
            MergeSource::Main => Ok((
                working.root.record.id,
                working.root.record.content.open(key)?,
            )),
            MergeSource::Branch(other) => {
                if other == working.branch.record.id {
                    return Err(VellumError::validation(
                        "Cannot merge a branch into itself",
                    ));
                }
                let other = self.load_branch(&other).await?;
                if other.root.record.id != working.root.record.id {
                    return Err(VellumError::validation(
                        "Branches belong to different documents",
                    ));
                }
                Ok((other.branch.record.id, other.branch.record.content.open(key)?))
            }
        }
    }

    /// Compare-and-swap a branch record through `change`, re-reading and
    /// re-applying on conflict.
    async fn swap_branch<F>(
        &self,
        journal: &mut WriteJournal<'_, S>,
        mut current: Stored<DocumentRecord>,
        mut change: F,
    ) -> Result<DocumentRecord>
    where
        F: FnMut(&DocumentRecord) -> Result<DocumentRecord>,
    {
        let path = paths::document(&current.record.id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let next = change(&current.record)?;
            match journal
                .compare_and_swap(&path, &current.node, codec::encode_node(&next)?)
                .await?
            {
                CasOutcome::Swapped => return Ok(next),
                CasOutcome::Mismatch { current: Some(node) } => {
                    current = Stored::decode(node)?
                        .ok_or_else(|| VellumError::not_found("Branch not found"))?;
                    tracing::debug!(branch = %current.record.id, "branch changed, retrying");
                }
                CasOutcome::Mismatch { current: None } => {
                    return Err(VellumError::not_found("Branch not found"));
                }
            }
        }
        Err(VellumError::invalid_state(
            "Branch changed concurrently, try again",
        ))
    }

    /// Replace the root's content, retrying against concurrent root edits.
    ///
    /// The key is resolved against every fresh read, so a visibility change
    /// or rotation that lands first is sealed for, not overwritten.
    async fn write_root_content(
        &self,
        journal: &mut WriteJournal<'_, S>,
        mut root: Stored<DocumentRecord>,
        content: &str,
        user: &UserId,
    ) -> Result<()> {
        let path = paths::document(&root.record.id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let key = self.ctx.document_key(&root.record, user).await?;
            let mut next = root.record.clone();
            next.content = Sealed::seal(content.to_string(), key.as_ref())?;
            next.updated_at = now_millis();
            match journal
                .compare_and_swap(&path, &root.node, codec::encode_node(&next)?)
                .await?
            {
                CasOutcome::Swapped => return Ok(()),
                CasOutcome::Mismatch { current: Some(node) } => {
                    root = Stored::decode(node)?
                        .ok_or_else(|| VellumError::not_found("Document not found"))?;
                    tracing::debug!(doc = %root.record.id, "root changed during merge, retrying");
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
}

/// Fail unless `record` is sealed under `key`, or in plaintext for `None`.
fn ensure_sealed_under(record: &DocumentRecord, key: Option<&EncryptionKey>) -> Result<()> {
    let fingerprint = key.map(EncryptionKey::fingerprint);
    if record.is_public == key.is_none() && record.key_fingerprint == fingerprint {
        return Ok(());
    }
    Err(VellumError::invalid_state(
        "Document key changed concurrently, try again",
    ))
}

/// Decrypted view of a branch record.
fn view(record: &DocumentRecord, key: Option<&EncryptionKey>) -> Result<BranchView> {
    let info = info_of(record)?;
    Ok(BranchView {
        id: record.id,
        original: info.original,
        parent: info.parent,
        title: record.title.open(key)?,
        content: record.content.open(key)?,
        status: info.status,
        created_by: info.created_by.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
        submitted_at: info.submitted_at,
        reviewed_at: info.reviewed_at,
        reviewed_by: info.reviewed_by.clone(),
        rejection_reason: info.rejection_reason.clone(),
    })
}
