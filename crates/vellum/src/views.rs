//! Decrypted, presentation-ready views returned by the managers.

use serde::Serialize;

use vellum_core::{BranchStatus, DocumentId, MergeSource, Permission, UserId};

use crate::diff::ContentDiff;

/// One row of a document's access list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSummary {
    pub user_id: UserId,
    pub permission: Permission,
}

/// A decrypted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub access: Vec<AccessSummary>,
}

/// A decrypted document without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub access: Vec<AccessSummary>,
}

/// A decrypted branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchView {
    pub id: DocumentId,
    /// The root document.
    pub original: DocumentId,
    pub parent: DocumentId,
    pub title: String,
    pub content: String,
    pub status: BranchStatus,
    pub created_by: UserId,
    pub created_at: i64,
    pub updated_at: i64,
    pub submitted_at: Option<i64>,
    pub reviewed_at: Option<i64>,
    pub reviewed_by: Option<UserId>,
    pub rejection_reason: Option<String>,
}

/// A collaborator row, joined with their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collaborator {
    pub user_id: UserId,
    pub display_name: String,
    pub permission: Permission,
    pub granted_at: i64,
}

/// A document shared with the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedDocument {
    pub id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub tags: Vec<String>,
    pub permission: Permission,
    pub is_public: bool,
    pub updated_at: i64,
}

/// A newly issued share token. The token string is only ever shown here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareToken {
    pub doc_id: DocumentId,
    pub permission: Permission,
    pub token: String,
}

/// What applying a merge into a working branch would change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePreview {
    /// The branch that would be overwritten.
    pub working_id: DocumentId,
    pub source: MergeSource,
    /// The document the content comes from (the root for `Main`).
    pub source_id: DocumentId,
    /// Working content against source content.
    pub diff: ContentDiff,
    pub source_content: String,
    /// Digest of `source_content`, checked again when the merge is applied.
    pub source_digest: String,
}
