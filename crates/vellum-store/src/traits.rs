//! GraphStore trait: the abstract interface to the replicated path store.
//!
//! The store is a flat namespace of `/`-separated paths. Each path holds a
//! [`Node`]: opaque bytes, or a tombstone recording that the value was
//! deleted. A read that returns `None` means nothing has arrived at this
//! replica yet, which is not the same as deleted.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// What a path currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A live value.
    Value(Bytes),
    /// The value was explicitly deleted at the given time (Unix ms).
    Tombstone {
        /// When the deletion was written.
        deleted_at: i64,
    },
}

impl Node {
    /// The live bytes, if any.
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            Node::Value(bytes) => Some(bytes),
            Node::Tombstone { .. } => None,
        }
    }

    /// Whether this node records a deletion.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Node::Tombstone { .. })
    }
}

/// Result of a compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected node was present and has been replaced.
    Swapped,
    /// Someone else wrote first; `current` is what the path holds now.
    Mismatch {
        /// The node found instead of the expected one.
        current: Option<Node>,
    },
}

impl CasOutcome {
    /// Whether the swap happened.
    pub fn is_swapped(&self) -> bool {
        matches!(self, CasOutcome::Swapped)
    }
}

/// The GraphStore trait: async interface to the replicated store.
///
/// All methods are async so that networked and local backends share one
/// interface. For SQLite, `spawn_blocking` keeps the runtime free.
///
/// # Design Notes
///
/// - **No cross-path transactions**: every call touches one path, except
///   `list`, which is a snapshot of one prefix.
/// - **Tombstones**: deletion writes a [`Node::Tombstone`] so that readers can
///   tell "deleted" from "not yet synced".
/// - **Compare-and-swap**: the one primitive that is atomic against
///   concurrent writers; status transitions are built on it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Write a node, replacing whatever the path held.
    async fn put(&self, path: &str, node: Node) -> Result<()>;

    /// Read a node. `None` means nothing has arrived at this path.
    async fn get(&self, path: &str) -> Result<Option<Node>>;

    /// List `(path, node)` pairs whose path starts with `prefix`, in path
    /// order. Tombstones are included.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Node)>>;

    /// Replace the node at `path` with `new` only if it currently equals
    /// `expected` (`None` meaning the path is empty).
    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Node>,
        new: Node,
    ) -> Result<CasOutcome>;

    /// Write a tombstone at `path`.
    async fn delete(&self, path: &str, deleted_at: i64) -> Result<()> {
        self.put(path, Node::Tombstone { deleted_at }).await
    }
}
