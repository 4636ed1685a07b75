//! Records as they are stored at each path.
//!
//! These are storage shapes, not views: sealed fields stay sealed here and
//! are only opened by the managers.

use serde::{Deserialize, Serialize};

use vellum_core::{BranchStatus, DocumentId, Permission, UserId};
use vellum_perms::{EncryptedPayload, KeyFingerprint, Sealed, WrappedKey, X25519PublicKey};

/// A root document or a branch, at `documents/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    /// Owner of the root document. Branches carry the root's owner.
    pub owner: UserId,
    pub title: Sealed<String>,
    pub content: Sealed<String>,
    pub tags: Sealed<Vec<String>>,
    pub is_public: bool,
    /// Fingerprint of the key the fields are sealed under; `None` when public.
    pub key_fingerprint: Option<KeyFingerprint>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Present iff this record is a branch.
    pub branch: Option<BranchInfo>,
}

impl DocumentRecord {
    /// Whether this record is a branch rather than a root document.
    pub fn is_branch(&self) -> bool {
        self.branch.is_some()
    }

    /// The root document this record belongs to (itself for roots).
    pub fn root_id(&self) -> DocumentId {
        self.branch.as_ref().map(|b| b.original).unwrap_or(self.id)
    }
}

/// Branch bookkeeping carried by branch records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// The root document. Never another branch.
    pub original: DocumentId,
    /// The root or the branch this one was forked from.
    pub parent: DocumentId,
    pub status: BranchStatus,
    pub created_by: UserId,
    pub submitted_at: Option<i64>,
    pub reviewed_at: Option<i64>,
    pub reviewed_by: Option<UserId>,
    pub rejection_reason: Option<String>,
}

/// One collaborator's access, at `access/<doc>/<user>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub user_id: UserId,
    pub permission: Permission,
    /// The document key wrapped for this user; `None` for public documents.
    pub wrapped_key: Option<WrappedKey>,
    pub granted_at: i64,
}

/// Reverse index entry at `inbox/<user>/<doc>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub doc_id: DocumentId,
    pub owner: UserId,
    pub permission: Permission,
    pub shared_at: i64,
}

/// Share token record at `tokens/<hash>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub doc_id: DocumentId,
    pub permission: Permission,
    /// The document key sealed under a key derived from the token itself.
    pub sealed_key: Option<EncryptedPayload>,
    pub created_by: UserId,
    pub created_at: i64,
}

/// Published profile at `profiles/<user>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub public_key: X25519PublicKey,
}

impl Profile {
    /// The name to show for this user.
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.user_id.as_str())
    }
}
