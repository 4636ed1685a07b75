//! Path layout of the store.
//!
//! ```text
//! documents/<doc>             document or branch record
//! access/<doc>/<user>         access entry
//! inbox/<user>/<doc>          documents shared with a user
//! owned/<user>/<doc>          root documents owned by a user
//! branches/<root>/<branch>    branches of a root document
//! tokens/<hash>               share token record
//! doc-tokens/<doc>/<hash>     tokens issued for a document
//! profiles/<user>             published profile
//! ```

use vellum_core::{DocumentId, UserId};

/// Path of a document or branch record.
pub fn document(doc: &DocumentId) -> String {
    format!("documents/{doc}")
}

/// Path of one access entry.
pub fn access(doc: &DocumentId, user: &UserId) -> String {
    format!("access/{doc}/{user}")
}

/// Prefix of every access entry of a document.
pub fn access_prefix(doc: &DocumentId) -> String {
    format!("access/{doc}/")
}

/// Path of an inbox index entry.
pub fn inbox(user: &UserId, doc: &DocumentId) -> String {
    format!("inbox/{user}/{doc}")
}

/// Prefix of a user's inbox.
pub fn inbox_prefix(user: &UserId) -> String {
    format!("inbox/{user}/")
}

/// Path of an owned-documents index entry.
pub fn owned(user: &UserId, doc: &DocumentId) -> String {
    format!("owned/{user}/{doc}")
}

/// Prefix of a user's owned documents.
pub fn owned_prefix(user: &UserId) -> String {
    format!("owned/{user}/")
}

/// Path of a branch index entry.
pub fn branch_index(root: &DocumentId, branch: &DocumentId) -> String {
    format!("branches/{root}/{branch}")
}

/// Prefix of the branch index of a root document.
pub fn branch_prefix(root: &DocumentId) -> String {
    format!("branches/{root}/")
}

/// Path of a share token record, keyed by the token's hash.
pub fn token(hash: &str) -> String {
    format!("tokens/{hash}")
}

/// Path of a document's token index entry.
pub fn doc_token(doc: &DocumentId, hash: &str) -> String {
    format!("doc-tokens/{doc}/{hash}")
}

/// Prefix of a document's token index.
pub fn doc_token_prefix(doc: &DocumentId) -> String {
    format!("doc-tokens/{doc}/")
}

/// Path of a published profile.
pub fn profile(user: &UserId) -> String {
    format!("profiles/{user}")
}

/// The last segment of a path.
pub fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let doc = DocumentId::from_bytes([0xab; 16]);
        let bob = UserId::new("bob").unwrap();

        assert_eq!(document(&doc), format!("documents/{}", "ab".repeat(16)));
        assert!(access(&doc, &bob).starts_with(&access_prefix(&doc)));
        assert!(inbox(&bob, &doc).starts_with(&inbox_prefix(&bob)));
        assert!(doc_token(&doc, "ff").starts_with(&doc_token_prefix(&doc)));
    }

    #[test]
    fn test_leaf() {
        let doc = DocumentId::from_bytes([1; 16]);
        let bob = UserId::new("bob").unwrap();
        assert_eq!(leaf(&access(&doc, &bob)), "bob");
        assert_eq!(leaf(&inbox(&bob, &doc)), doc.to_hex());
        assert_eq!(leaf("plain"), "plain");
    }
}
