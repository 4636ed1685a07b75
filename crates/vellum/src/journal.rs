//! Write journal for multi-path operations.
//!
//! The store has no cross-path transactions. Operations that touch several
//! paths record what each path held before writing it, and on failure put it
//! back so that holders of existing access keep it. A path that someone else
//! has written since is left alone.

use std::time::Duration;

use vellum_core::now_millis;
use vellum_store::{CasOutcome, GraphStore, Node};

use crate::settle::bounded;

/// One write made through the journal.
struct Undo {
    path: String,
    previous: Option<Node>,
    written: Node,
}

/// Previous contents of every path written through the journal.
pub struct WriteJournal<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    timeout: Duration,
    undo: Vec<Undo>,
}

impl<'a, S: GraphStore + ?Sized> WriteJournal<'a, S> {
    pub fn new(store: &'a S, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            undo: Vec::new(),
        }
    }

    /// Write `node` at `path`, remembering what it replaced.
    pub async fn put(&mut self, path: &str, node: Node) -> vellum_store::Result<()> {
        let previous = bounded(self.timeout, self.store.get(path)).await?;
        self.put_replacing(path, previous, node).await
    }

    /// Write `node` at `path` when the caller already knows the previous node.
    pub async fn put_replacing(
        &mut self,
        path: &str,
        previous: Option<Node>,
        node: Node,
    ) -> vellum_store::Result<()> {
        self.undo.push(Undo {
            path: path.to_string(),
            previous,
            written: node.clone(),
        });
        bounded(self.timeout, self.store.put(path, node)).await
    }

    /// Compare-and-swap `path`, remembering `expected` if the swap happens.
    pub async fn compare_and_swap(
        &mut self,
        path: &str,
        expected: &Node,
        new: Node,
    ) -> vellum_store::Result<CasOutcome> {
        let outcome = bounded(
            self.timeout,
            self.store.compare_and_swap(path, Some(expected), new.clone()),
        )
        .await?;
        if outcome.is_swapped() {
            self.undo.push(Undo {
                path: path.to_string(),
                previous: Some(expected.clone()),
                written: new,
            });
        }
        Ok(outcome)
    }

    /// Tombstone `path`, remembering what it held.
    pub async fn delete(&mut self, path: &str) -> vellum_store::Result<()> {
        self.put(path, Node::Tombstone { deleted_at: now_millis() })
            .await
    }

    /// Number of writes recorded so far.
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// Keep every write.
    pub fn commit(self) {
        tracing::trace!(writes = self.undo.len(), "journal committed");
    }

    /// Restore every written path, newest first.
    ///
    /// Each restore is a compare-and-swap against what the journal wrote, so
    /// a path changed by someone else in the meantime keeps their value.
    /// Paths that were empty before are tombstoned. A failed restore is
    /// logged and the rest are still attempted.
    pub async fn rollback(self) {
        let total = self.undo.len();
        for undo in self.undo.into_iter().rev() {
            let node = undo.previous.unwrap_or(Node::Tombstone {
                deleted_at: now_millis(),
            });
            let restored = bounded(
                self.timeout,
                self.store
                    .compare_and_swap(&undo.path, Some(&undo.written), node),
            )
            .await;
            match restored {
                Ok(CasOutcome::Swapped) => {}
                Ok(CasOutcome::Mismatch { .. }) => {
                    tracing::warn!(path = %undo.path, "path changed since it was written, not restoring");
                }
                Err(e) => {
                    tracing::warn!(path = %undo.path, error = %e, "rollback could not restore path");
                }
            }
        }
        tracing::warn!(writes = total, "rolled back partial operation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use vellum_store::MemoryStore;

    fn value(s: &'static str) -> Node {
        Node::Value(Bytes::from_static(s.as_bytes()))
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_values() {
        let store = MemoryStore::new();
        store.put("access/d/alice", value("old")).await.unwrap();

        let mut journal = WriteJournal::new(&store, Duration::from_secs(1));
        journal.put("access/d/alice", value("new")).await.unwrap();
        journal.put("access/d/bob", value("new")).await.unwrap();
        assert_eq!(journal.len(), 2);
        journal.rollback().await;

        assert_eq!(store.get("access/d/alice").await.unwrap(), Some(value("old")));
        assert!(store.get("access/d/bob").await.unwrap().unwrap().is_tombstone());
    }

    #[tokio::test]
    async fn test_rollback_keeps_later_writes_by_others() {
        let store = MemoryStore::new();
        store.put("documents/b", value("v1")).await.unwrap();

        let mut journal = WriteJournal::new(&store, Duration::from_secs(1));
        let outcome = journal
            .compare_and_swap("documents/b", &value("v1"), value("v2"))
            .await
            .unwrap();
        assert!(outcome.is_swapped());
        journal.put("access/d/bob", value("new")).await.unwrap();

        // Another writer replaces the document before the rollback.
        store.put("documents/b", value("v3")).await.unwrap();
        journal.rollback().await;

        assert_eq!(store.get("documents/b").await.unwrap(), Some(value("v3")));
        assert!(store.get("access/d/bob").await.unwrap().unwrap().is_tombstone());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let store = MemoryStore::new();
        let mut journal = WriteJournal::new(&store, Duration::from_secs(1));
        journal.put("k", value("v")).await.unwrap();
        journal.commit();
        assert_eq!(store.get("k").await.unwrap(), Some(value("v")));
    }
}
