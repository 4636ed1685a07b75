//! Sharing and key distribution.
//!
//! Collaborators get the document key wrapped under their pairwise secret
//! with the owner. Capability tokens carry the key sealed under a key derived
//! from the token itself; the store only ever sees the token's hash.
//!
//! Removing a collaborator deletes their access entry and nothing else. A
//! key they already unwrapped keeps decrypting what they fetched; call
//! [`DocumentManager::change_document_key`] to cut them off going forward.
//!
//! [`DocumentManager::change_document_key`]: crate::documents::DocumentManager::change_document_key

use std::sync::Arc;

use rand::RngCore;

use vellum_core::{now_millis, DocumentId, Permission, UserId};
use vellum_perms::{
    authorize, AccessRequest, Action, EncryptedPayload, EncryptionKey, X25519PublicKey,
};
use vellum_store::{codec, paths, GraphStore, Node};

use crate::context::{Context, Stored, MAX_CAS_ATTEMPTS};
use crate::directory::ProfileDirectory;
use crate::error::{Result, VellumError};
use crate::records::{AccessEntry, DocumentRecord, InboxEntry, TokenRecord};
use crate::settle::{read_settled, Slot};
use crate::views::{Collaborator, DocumentView, ShareToken, SharedDocument};

const TOKEN_BYTES: usize = 32;
const TOKEN_KEY_CONTEXT: &str = "vellum-token-v1 document key";

/// Store key of a share token.
pub(crate) fn token_hash(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Key that seals the document key inside a token record.
fn token_key(token: &str) -> EncryptionKey {
    EncryptionKey::derive(TOKEN_KEY_CONTEXT, token.as_bytes())
}

fn check_token_format(token: &str) -> Result<()> {
    match hex::decode(token) {
        Ok(bytes) if bytes.len() == TOKEN_BYTES => Ok(()),
        _ => Err(VellumError::validation("Invalid share token")),
    }
}

/// Sharing / key-distribution manager.
pub struct SharingManager<S: GraphStore, D: ProfileDirectory> {
    ctx: Arc<Context<S, D>>,
}

impl<S: GraphStore, D: ProfileDirectory> Clone for SharingManager<S, D> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: GraphStore, D: ProfileDirectory> SharingManager<S, D> {
    pub fn new(ctx: Arc<Context<S, D>>) -> Self {
        Self { ctx }
    }

    /// Share a document with `collaborator` at `permission`.
    ///
    /// Re-sharing updates the existing entry. For private documents the key
    /// is wrapped for the collaborator; public documents get an entry with no
    /// key. If a write fails the previous entry is restored.
    pub async fn share_document(
        &self,
        doc: &DocumentId,
        collaborator: &UserId,
        permission: Permission,
    ) -> Result<Collaborator> {
        let me = self.ctx.current_user()?;
        if permission == Permission::Owner {
            return Err(VellumError::validation("Ownership cannot be shared"));
        }

        let root = self.load_root(doc).await?;
        self.ctx
            .require(Action::ShareDocument, &root.record, &me, None)
            .await?;
        if *collaborator == root.record.owner {
            return Err(VellumError::validation(
                "Cannot share a document with its owner",
            ));
        }

        let profile = self
            .ctx
            .directory()
            .profile(collaborator)
            .await?
            .ok_or_else(|| VellumError::not_found("User not found"))?;

        let wrapped_key = match self.ctx.document_key(&root.record, &me).await? {
            Some(key) => Some(self.ctx.wrap_to(doc, collaborator, &profile.public_key, &key)?),
            None => None,
        };

        let existing = self.ctx.access_entry(doc, collaborator).await?;
        let now = now_millis();
        let entry = AccessEntry {
            user_id: collaborator.clone(),
            permission,
            wrapped_key,
            granted_at: existing.as_ref().map(|e| e.record.granted_at).unwrap_or(now),
        };
        let inbox = InboxEntry {
            doc_id: *doc,
            owner: root.record.owner.clone(),
            permission,
            shared_at: now,
        };

        let mut journal = self.ctx.journal();
        let written = async {
            journal
                .put_replacing(
                    &paths::access(doc, collaborator),
                    existing.map(|e| e.node),
                    codec::encode_node(&entry)?,
                )
                .await?;
            journal
                .put(&paths::inbox(collaborator, doc), codec::encode_node(&inbox)?)
                .await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();
        self.follow_rekey(doc, collaborator, &profile.public_key, &me)
            .await?;

        tracing::info!(doc = %doc, user = %collaborator, permission = %permission, "shared document");
        Ok(Collaborator {
            display_name: profile.display_name().to_string(),
            user_id: entry.user_id,
            permission,
            granted_at: entry.granted_at,
        })
    }

    /// Remove a collaborator's access entry. Idempotent; does not rotate the
    /// key.
    pub async fn unshare_document(&self, doc: &DocumentId, collaborator: &UserId) -> Result<()> {
        let me = self.ctx.current_user()?;
        let root = self.load_root(doc).await?;
        self.ctx
            .require(Action::RevokeAccess, &root.record, &me, None)
            .await?;
        if *collaborator == root.record.owner {
            return Err(VellumError::validation("The owner cannot be removed"));
        }

        let Some(existing) = self.ctx.access_entry(doc, collaborator).await? else {
            tracing::debug!(doc = %doc, user = %collaborator, "not a collaborator, nothing to remove");
            return Ok(());
        };

        let mut journal = self.ctx.journal();
        let written = async {
            journal
                .put_replacing(
                    &paths::access(doc, collaborator),
                    Some(existing.node),
                    Node::Tombstone {
                        deleted_at: now_millis(),
                    },
                )
                .await?;
            journal.delete(&paths::inbox(collaborator, doc)).await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        tracing::info!(doc = %doc, user = %collaborator, "removed collaborator");
        Ok(())
    }

    /// Issue a capability token granting `permission` on `doc`.
    ///
    /// Tokens only ever open the document for reading, so `permission` must
    /// be [`Permission::Read`]; anything else is `VALIDATION_ERROR`.
    pub async fn generate_share_token(
        &self,
        doc: &DocumentId,
        permission: Permission,
    ) -> Result<ShareToken> {
        let me = self.ctx.current_user()?;
        match permission {
            Permission::Read => {}
            Permission::Owner => {
                return Err(VellumError::validation(
                    "Share tokens cannot grant ownership",
                ))
            }
            Permission::Write => {
                return Err(VellumError::validation(
                    "Share tokens grant read access only",
                ))
            }
        }
        let root = self.load_root(doc).await?;
        self.ctx
            .require(Action::IssueShareToken, &root.record, &me, None)
            .await?;

        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let hash = token_hash(&token);

        let sealed_key = match self.ctx.document_key(&root.record, &me).await? {
            Some(key) => Some(EncryptedPayload::encrypt(key.as_bytes(), &token_key(&token))?),
            None => None,
        };
        let record = TokenRecord {
            doc_id: *doc,
            permission,
            sealed_key,
            created_by: me,
            created_at: now_millis(),
        };

        let mut journal = self.ctx.journal();
        let written = async {
            journal
                .put_replacing(&paths::token(&hash), None, codec::encode_node(&record)?)
                .await?;
            journal
                .put_replacing(
                    &paths::doc_token(doc, &hash),
                    None,
                    codec::encode_node(&hash)?,
                )
                .await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        tracing::info!(doc = %doc, permission = %permission, "issued share token");
        Ok(ShareToken {
            doc_id: *doc,
            permission,
            token,
        })
    }

    /// Open a document with a capability token. Needs no signed-in identity.
    ///
    /// The access list of the document is not revealed to token holders.
    pub async fn get_document_by_token(&self, token: &str) -> Result<DocumentView> {
        check_token_format(token)?;
        let record = self.load_token(token).await?;

        authorize(Action::ViewDocument, &AccessRequest::token(record.permission))?;

        let doc = self
            .ctx
            .load_document(&record.doc_id)
            .await?
            .require("Document not found")?
            .record;

        let key = if doc.is_public {
            None
        } else {
            let sealed = record
                .sealed_key
                .as_ref()
                .ok_or_else(|| VellumError::crypto("Share token carries no document key"))?;
            let bytes = sealed.decrypt(&token_key(token))?;
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| VellumError::crypto("Share token key is malformed"))?;
            let key = EncryptionKey::from_bytes(bytes);
            if Some(key.fingerprint()) != doc.key_fingerprint {
                return Err(VellumError::crypto("Document key is stale"));
            }
            Some(key)
        };

        tracing::debug!(doc = %doc.id, "opened document by token");
        Ok(DocumentView {
            id: doc.id,
            owner: doc.owner.clone(),
            title: doc.title.open(key.as_ref())?,
            content: doc.content.open(key.as_ref())?,
            tags: doc.tags.open(key.as_ref())?,
            is_public: doc.is_public,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            access: Vec::new(),
        })
    }

    /// Revoke a share token. Owner only.
    pub async fn revoke_share_token(&self, token: &str) -> Result<()> {
        let me = self.ctx.current_user()?;
        check_token_format(token)?;
        let record = self.load_token(token).await?;
        let root = self.load_root(&record.doc_id).await?;
        self.ctx
            .require(Action::IssueShareToken, &root.record, &me, None)
            .await?;

        let hash = token_hash(token);
        let mut journal = self.ctx.journal();
        let written = async {
            journal.delete(&paths::token(&hash)).await?;
            journal
                .delete(&paths::doc_token(&record.doc_id, &hash))
                .await?;
            Ok::<_, VellumError>(())
        }
        .await;
        if let Err(e) = written {
            journal.rollback().await;
            return Err(e);
        }
        journal.commit();

        tracing::info!(doc = %record.doc_id, "revoked share token");
        Ok(())
    }

    /// Everyone with an access entry on `doc`, joined with their profiles.
    /// Owner first.
    pub async fn get_collaborators(&self, doc: &DocumentId) -> Result<Vec<Collaborator>> {
        let me = self.ctx.current_user()?;
        let root = self.load_root(doc).await?;
        self.ctx
            .require(Action::ViewCollaborators, &root.record, &me, None)
            .await?;

        let mut out = Vec::new();
        for entry in self.ctx.access_entries(doc).await? {
            let entry = entry.record;
            let display_name = match self.ctx.directory().profile(&entry.user_id).await? {
                Some(profile) => profile.display_name().to_string(),
                None => entry.user_id.to_string(),
            };
            out.push(Collaborator {
                user_id: entry.user_id,
                display_name,
                permission: entry.permission,
                granted_at: entry.granted_at,
            });
        }
        out.sort_by(|a, b| {
            b.permission
                .cmp(&a.permission)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(out)
    }

    /// Documents shared with the current user, decrypted with their wrapped
    /// keys. Documents that cannot be opened are skipped with a warning.
    pub async fn get_shared_documents(&self) -> Result<Vec<SharedDocument>> {
        let me = self.ctx.current_user()?;
        let inbox: Vec<(String, Stored<InboxEntry>)> =
            self.ctx.list_live(&paths::inbox_prefix(&me)).await?;

        let mut out = Vec::with_capacity(inbox.len());
        for (_, entry) in inbox {
            let doc_id = entry.record.doc_id;
            let Some(stored) = self.ctx.fetch_document(&doc_id).await? else {
                tracing::debug!(doc = %doc_id, "shared document not present");
                continue;
            };
            match self.open_shared(&stored.record, &me).await {
                Ok(Some(shared)) => out.push(shared),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(doc = %doc_id, error = %e, "skipping unreadable shared document");
                }
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn open_shared(&self, record: &DocumentRecord, me: &UserId) -> Result<Option<SharedDocument>> {
        let Some(entry) = self.ctx.access_entry(&record.id, me).await? else {
            return Ok(None);
        };
        let key = self.ctx.document_key(record, me).await?;
        Ok(Some(SharedDocument {
            id: record.id,
            owner: record.owner.clone(),
            title: record.title.open(key.as_ref())?,
            tags: record.tags.open(key.as_ref())?,
            permission: entry.record.permission,
            is_public: record.is_public,
            updated_at: record.updated_at,
        }))
    }

    /// Re-wrap `collaborator`'s entry until it matches the key the root is
    /// sealed under.
    async fn follow_rekey(
        &self,
        doc: &DocumentId,
        collaborator: &UserId,
        public_key: &X25519PublicKey,
        me: &UserId,
    ) -> Result<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let root = self.load_root(doc).await?;
            let Some(current) = self.ctx.access_entry(doc, collaborator).await? else {
                return Ok(());
            };
            let wrapped_under = current.record.wrapped_key.as_ref().map(|w| w.fingerprint);
            if wrapped_under == root.record.key_fingerprint {
                return Ok(());
            }

            tracing::debug!(doc = %doc, user = %collaborator, "document re-keyed while sharing, re-wrapping");
            let wrapped_key = match self.ctx.document_key(&root.record, me).await? {
                Some(key) => Some(self.ctx.wrap_to(doc, collaborator, public_key, &key)?),
                None => None,
            };
            let rewrapped = AccessEntry {
                wrapped_key,
                ..current.record
            };
            self.ctx
                .cas(
                    &paths::access(doc, collaborator),
                    &current.node,
                    codec::encode_node(&rewrapped)?,
                )
                .await?;
        }
        Err(VellumError::invalid_state(
            "Document key changed concurrently, try again",
        ))
    }

    async fn load_root(&self, doc: &DocumentId) -> Result<Stored<DocumentRecord>> {
        let stored = self
            .ctx
            .load_document(doc)
            .await?
            .require("Document not found")?;
        if stored.record.is_branch() {
            return Err(VellumError::validation(
                "Branches cannot be shared; share the root document",
            ));
        }
        Ok(stored)
    }

    async fn load_token(&self, token: &str) -> Result<TokenRecord> {
        let path = paths::token(&token_hash(token));
        match read_settled(self.ctx.store().as_ref(), &path, self.ctx.config()).await? {
            Slot::Present(bytes) => Ok(codec::decode(&bytes)?),
            Slot::Deleted | Slot::Absent => Err(VellumError::not_found("Share token not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_stable_and_hides_token() {
        let token = hex::encode([7u8; TOKEN_BYTES]);
        assert_eq!(token_hash(&token), token_hash(&token));
        assert_ne!(token_hash(&token), token);
        assert_eq!(token_hash(&token).len(), 64);
    }

    #[test]
    fn test_token_format() {
        assert!(check_token_format(&hex::encode([1u8; TOKEN_BYTES])).is_ok());
        assert!(check_token_format("not-hex").is_err());
        assert!(check_token_format(&hex::encode([1u8; 8])).is_err());
    }

    #[test]
    fn test_token_key_depends_on_token() {
        let a = token_key(&hex::encode([1u8; TOKEN_BYTES]));
        let b = token_key(&hex::encode([2u8; TOKEN_BYTES]));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
