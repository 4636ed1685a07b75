//! Branch status state machine.
//!
//! ```text
//! pending ──submit──▶ submitted ──merge──▶ merged
//!                         │
//!                         └────reject──▶ rejected
//! ```
//!
//! Merged and rejected are terminal. Content is only editable while pending.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::DocumentId;

/// Lifecycle state of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    /// Being edited by its creator.
    Pending,
    /// Awaiting owner review. Content is frozen.
    Submitted,
    /// Folded into the root document.
    Merged,
    /// Declined by the owner.
    Rejected,
}

impl BranchStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, BranchStatus::Merged | BranchStatus::Rejected)
    }

    /// Whether branch content may still be changed.
    pub fn is_editable(self) -> bool {
        self == BranchStatus::Pending
    }

    /// Whether the branch may still be deleted by its creator.
    pub fn is_deletable(self) -> bool {
        !self.is_terminal()
    }

    /// Check if `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: BranchStatus) -> bool {
        matches!(
            (self, next),
            (BranchStatus::Pending, BranchStatus::Submitted)
                | (BranchStatus::Submitted, BranchStatus::Merged)
                | (BranchStatus::Submitted, BranchStatus::Rejected)
        )
    }

    /// Move to `next`, or fail with [`CoreError::InvalidTransition`].
    pub fn transition(self, next: BranchStatus) -> Result<BranchStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            BranchStatus::Pending => "pending",
            BranchStatus::Submitted => "submitted",
            BranchStatus::Merged => "merged",
            BranchStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a working branch pulls content from when syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeSource {
    /// The root document.
    Main,
    /// Another branch of the same root.
    Branch(DocumentId),
}

impl Default for MergeSource {
    fn default() -> Self {
        MergeSource::Main
    }
}
