//! Golden access-control vectors.
//!
//! The expected decision of the enforcer for every action, for every kind of
//! caller, against one document whose branch was created by `bob`.

use vellum_core::{Permission, UserId};
use vellum_perms::{can_perform, AccessRequest, Action, Grant};

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Owner,
    Writer,
    Reader,
    /// A reader who created the branch in question.
    BranchCreator,
    /// Signed in, no entry, document is public.
    Public,
    /// Signed in, no entry, document is private.
    Stranger,
    WriteToken,
    ReadToken,
}

impl Caller {
    pub const ALL: [Caller; 8] = [
        Caller::Owner,
        Caller::Writer,
        Caller::Reader,
        Caller::BranchCreator,
        Caller::Public,
        Caller::Stranger,
        Caller::WriteToken,
        Caller::ReadToken,
    ];

    fn alias(self) -> Option<&'static str> {
        match self {
            Caller::Owner => Some("alice"),
            Caller::Writer => Some("carol"),
            Caller::Reader => Some("dave"),
            Caller::BranchCreator => Some("bob"),
            Caller::Public => Some("erin"),
            Caller::Stranger => Some("frank"),
            Caller::WriteToken | Caller::ReadToken => None,
        }
    }

    fn grant(self) -> Option<Grant> {
        match self {
            Caller::Owner => Some(Grant::Member(Permission::Owner)),
            Caller::Writer => Some(Grant::Member(Permission::Write)),
            Caller::Reader | Caller::BranchCreator => Some(Grant::Member(Permission::Read)),
            Caller::Public => Some(Grant::Public),
            Caller::Stranger => None,
            Caller::WriteToken => Some(Grant::Token(Permission::Write)),
            Caller::ReadToken => Some(Grant::Token(Permission::Read)),
        }
    }
}

/// One expected decision.
#[derive(Debug, Clone)]
pub struct AccessVector {
    pub action: Action,
    pub caller: Caller,
    pub allowed: bool,
}

impl AccessVector {
    /// Human-readable name for the vector.
    pub fn name(&self) -> String {
        format!("{:?} by {:?}", self.action, self.caller)
    }
}

// Columns follow `Caller::ALL`.
const O: bool = true;
const X: bool = false;

#[rustfmt::skip]
const TABLE: [(Action, [bool; 8]); 16] = [
    //                        own writ read crtr publ strg wtok rtok
    (Action::ViewDocument,      [O,   O,   O,   O,   O,   X,   O,   O]),
    (Action::ViewCollaborators, [O,   O,   O,   O,   O,   X,   O,   O]),
    (Action::ViewDiff,          [O,   O,   O,   O,   O,   X,   O,   O]),
    (Action::CreateBranch,      [O,   O,   O,   O,   O,   X,   X,   X]),
    (Action::EditBranch,        [X,   X,   X,   O,   X,   X,   X,   X]),
    (Action::SubmitBranch,      [O,   X,   X,   O,   X,   X,   X,   X]),
    (Action::DeleteBranch,      [O,   X,   X,   O,   X,   X,   X,   X]),
    (Action::EditDocument,      [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::DeleteDocument,    [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::ChangeVisibility,  [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::RotateKey,         [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::ShareDocument,     [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::RevokeAccess,      [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::IssueShareToken,   [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::MergeBranch,       [O,   X,   X,   X,   X,   X,   X,   X]),
    (Action::RejectBranch,      [O,   X,   X,   X,   X,   X,   X,   X]),
];

/// Get all access vectors.
pub fn access_vectors() -> Vec<AccessVector> {
    TABLE
        .iter()
        .flat_map(|(action, row)| {
            Caller::ALL
                .iter()
                .zip(row.iter())
                .map(move |(caller, allowed)| AccessVector {
                    action: *action,
                    caller: *caller,
                    allowed: *allowed,
                })
        })
        .collect()
}

/// Ask the enforcer about `vector`'s action on behalf of its caller.
pub fn decide(vector: &AccessVector) -> bool {
    let creator = UserId::new("bob").ok();
    let actor = vector.caller.alias().and_then(|alias| UserId::new(alias).ok());

    let mut request = match &actor {
        Some(actor) => AccessRequest::member(actor, vector.caller.grant()),
        None => AccessRequest {
            grant: vector.caller.grant(),
            ..AccessRequest::default()
        },
    };
    if let Some(creator) = &creator {
        request = request.on_branch(creator);
    }
    can_perform(vector.action, &request)
}

/// Check every vector; returns `(name, passed, detail)` per vector.
pub fn verify_access_vectors() -> Vec<(String, bool, String)> {
    access_vectors()
        .iter()
        .map(|vector| {
            let got = decide(vector);
            let detail = if got == vector.allowed {
                String::new()
            } else {
                format!("expected allowed={}, got {}", vector.allowed, got)
            };
            (vector.name(), got == vector.allowed, detail)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        let failures: Vec<_> = verify_access_vectors()
            .into_iter()
            .filter(|(_, passed, _)| !passed)
            .collect();
        assert!(failures.is_empty(), "{failures:#?}");
    }

    #[test]
    fn test_table_covers_every_action_once() {
        let vectors = access_vectors();
        assert_eq!(vectors.len(), 16 * Caller::ALL.len());

        let mut actions: Vec<_> = TABLE.iter().map(|(a, _)| format!("{a:?}")).collect();
        actions.sort();
        actions.dedup();
        assert_eq!(actions.len(), TABLE.len());
    }

    #[test]
    fn test_owner_only_rows_match_enforcer() {
        for (action, row) in TABLE {
            if action.is_owner_only() {
                assert_eq!(row, [O, X, X, X, X, X, X, X], "{action:?}");
            }
        }
    }
}
