//! Access control over the `read < write < owner` lattice.
//!
//! Every mutating manager call builds an [`AccessRequest`] and asks
//! [`authorize`] before touching the store. The enforcer is pure: it sees the
//! grant the caller resolved (access entry, token, or public visibility) and
//! never reads anything itself.

use serde::{Deserialize, Serialize};

use vellum_core::{Permission, UserId};

use crate::error::{PermsError, Result};

/// Something a caller may try to do to a document or branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    ViewDocument,
    ViewCollaborators,
    EditDocument,
    DeleteDocument,
    ChangeVisibility,
    RotateKey,
    ShareDocument,
    RevokeAccess,
    IssueShareToken,
    CreateBranch,
    EditBranch,
    SubmitBranch,
    ViewDiff,
    MergeBranch,
    RejectBranch,
    DeleteBranch,
}

impl Action {
    /// Human-readable verb phrase used in denial messages.
    pub fn describe(self) -> &'static str {
        match self {
            Action::ViewDocument => "view this document",
            Action::ViewCollaborators => "view collaborators",
            Action::EditDocument => "edit this document",
            Action::DeleteDocument => "delete this document",
            Action::ChangeVisibility => "change document visibility",
            Action::RotateKey => "change the document key",
            Action::ShareDocument => "share this document",
            Action::RevokeAccess => "revoke access",
            Action::IssueShareToken => "create share links",
            Action::CreateBranch => "create a branch",
            Action::EditBranch => "edit this branch",
            Action::SubmitBranch => "submit this branch",
            Action::ViewDiff => "view this diff",
            Action::MergeBranch => "merge branches",
            Action::RejectBranch => "reject branches",
            Action::DeleteBranch => "delete this branch",
        }
    }

    /// Whether only the document owner may perform this action.
    pub fn is_owner_only(self) -> bool {
        matches!(
            self,
            Action::EditDocument
                | Action::DeleteDocument
                | Action::ChangeVisibility
                | Action::RotateKey
                | Action::ShareDocument
                | Action::RevokeAccess
                | Action::IssueShareToken
                | Action::MergeBranch
                | Action::RejectBranch
        )
    }
}

/// How the caller came to have access to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grant {
    /// Named in the access list (or the owner).
    Member(Permission),
    /// Holder of a capability token.
    Token(Permission),
    /// The document is public.
    Public,
}

impl Grant {
    /// The effective permission level of this grant.
    pub fn permission(self) -> Permission {
        match self {
            Grant::Member(p) | Grant::Token(p) => p,
            Grant::Public => Permission::Read,
        }
    }
}

/// Everything the enforcer needs to decide one action.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessRequest<'a> {
    /// The signed-in user, if any.
    pub actor: Option<&'a UserId>,
    /// The caller's grant on the root document, if any.
    pub grant: Option<Grant>,
    /// Creator of the branch the action targets.
    pub branch_creator: Option<&'a UserId>,
}

impl<'a> AccessRequest<'a> {
    /// Request by a signed-in user.
    pub fn member(actor: &'a UserId, grant: Option<Grant>) -> Self {
        Self {
            actor: Some(actor),
            grant,
            branch_creator: None,
        }
    }

    /// Request by an anonymous token holder.
    pub fn token(permission: Permission) -> Self {
        Self {
            actor: None,
            grant: Some(Grant::Token(permission)),
            branch_creator: None,
        }
    }

    /// Attach the creator of the targeted branch.
    pub fn on_branch(mut self, creator: &'a UserId) -> Self {
        self.branch_creator = Some(creator);
        self
    }

    fn at_least(&self, required: Permission) -> bool {
        self.grant
            .map(|g| g.permission().satisfies(required))
            .unwrap_or(false)
    }

    fn is_owner(&self) -> bool {
        self.actor.is_some() && matches!(self.grant, Some(Grant::Member(Permission::Owner)))
    }

    fn is_branch_creator(&self) -> bool {
        match (self.actor, self.branch_creator) {
            (Some(actor), Some(creator)) => actor == creator,
            _ => false,
        }
    }
}

/// Decide whether `request` may perform `action`.
pub fn can_perform(action: Action, request: &AccessRequest<'_>) -> bool {
    if action.is_owner_only() {
        return request.is_owner();
    }

    match action {
        Action::ViewDocument | Action::ViewCollaborators | Action::ViewDiff => {
            request.at_least(Permission::Read)
        }
        Action::CreateBranch => request.actor.is_some() && request.at_least(Permission::Read),
        Action::EditBranch => request.is_branch_creator() && request.at_least(Permission::Read),
        Action::SubmitBranch | Action::DeleteBranch => {
            request.is_owner()
                || (request.is_branch_creator() && request.at_least(Permission::Read))
        }
        _ => false,
    }
}

/// Like [`can_perform`], but returns a stable denial message on failure.
pub fn authorize(action: Action, request: &AccessRequest<'_>) -> Result<()> {
    if can_perform(action, request) {
        return Ok(());
    }
    let message = if action.is_owner_only() {
        format!("Only the owner can {}", action.describe())
    } else {
        format!("Insufficient permission to {}", action.describe())
    };
    Err(PermsError::PermissionDenied(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(alias: &str) -> UserId {
        UserId::new(alias).unwrap()
    }

    const OWNER_ONLY: [Action; 9] = [
        Action::EditDocument,
        Action::DeleteDocument,
        Action::ChangeVisibility,
        Action::RotateKey,
        Action::ShareDocument,
        Action::RevokeAccess,
        Action::IssueShareToken,
        Action::MergeBranch,
        Action::RejectBranch,
    ];

    #[test]
    fn test_owner_only_actions() {
        let alice = user("alice");
        let owner = AccessRequest::member(&alice, Some(Grant::Member(Permission::Owner)));
        let writer = AccessRequest::member(&alice, Some(Grant::Member(Permission::Write)));

        for action in OWNER_ONLY {
            assert!(can_perform(action, &owner), "{action:?}");
            assert!(!can_perform(action, &writer), "{action:?}");
        }
    }

    #[test]
    fn test_token_never_owns() {
        let request = AccessRequest::token(Permission::Owner);
        for action in OWNER_ONLY {
            assert!(!can_perform(action, &request));
        }
    }

    #[test]
    fn test_read_actions() {
        let bob = user("bob");
        let reader = AccessRequest::member(&bob, Some(Grant::Member(Permission::Read)));
        let stranger = AccessRequest::member(&bob, None);

        assert!(can_perform(Action::ViewDocument, &reader));
        assert!(can_perform(Action::ViewDiff, &reader));
        assert!(can_perform(Action::CreateBranch, &reader));
        assert!(!can_perform(Action::ViewDocument, &stranger));
        assert!(!can_perform(Action::CreateBranch, &stranger));
    }

    #[test]
    fn test_public_and_token_grants_bypass_access_list() {
        let carol = user("carol");
        let public = AccessRequest::member(&carol, Some(Grant::Public));
        assert!(can_perform(Action::ViewDocument, &public));
        assert!(can_perform(Action::CreateBranch, &public));
        assert!(!can_perform(Action::EditDocument, &public));

        let token = AccessRequest::token(Permission::Read);
        assert!(can_perform(Action::ViewDocument, &token));
        // Anonymous holders cannot author branches.
        assert!(!can_perform(Action::CreateBranch, &token));
    }

    #[test]
    fn test_branch_creator_rules() {
        let bob = user("bob");
        let carol = user("carol");

        let own = AccessRequest::member(&bob, Some(Grant::Member(Permission::Read))).on_branch(&bob);
        assert!(can_perform(Action::EditBranch, &own));
        assert!(can_perform(Action::SubmitBranch, &own));
        assert!(can_perform(Action::DeleteBranch, &own));

        let other =
            AccessRequest::member(&carol, Some(Grant::Member(Permission::Read))).on_branch(&bob);
        assert!(!can_perform(Action::EditBranch, &other));
        assert!(!can_perform(Action::SubmitBranch, &other));
        assert!(!can_perform(Action::DeleteBranch, &other));

        let writer =
            AccessRequest::member(&carol, Some(Grant::Member(Permission::Write))).on_branch(&bob);
        assert!(!can_perform(Action::EditBranch, &writer));
        assert!(!can_perform(Action::DeleteBranch, &writer));
    }

    #[test]
    fn test_owner_may_delete_any_branch() {
        let alice = user("alice");
        let bob = user("bob");
        let owner =
            AccessRequest::member(&alice, Some(Grant::Member(Permission::Owner))).on_branch(&bob);
        assert!(can_perform(Action::DeleteBranch, &owner));
        assert!(can_perform(Action::SubmitBranch, &owner));
        assert!(!can_perform(Action::EditBranch, &owner));
    }

    #[test]
    fn test_denial_messages() {
        let bob = user("bob");
        let reader = AccessRequest::member(&bob, Some(Grant::Member(Permission::Read)));

        let err = authorize(Action::MergeBranch, &reader).unwrap_err();
        assert_eq!(err.to_string(), "Only the owner can merge branches");

        let err = authorize(Action::ViewDocument, &AccessRequest::member(&bob, None)).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient permission to view this document");
    }
}
