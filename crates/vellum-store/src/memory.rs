//! In-memory implementation of the GraphStore trait.
//!
//! This is primarily for testing. Several managers can share one
//! `Arc<MemoryStore>` to simulate users on a fully synced network. Fault
//! injection lets tests take the store offline or fail writes under a prefix.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::traits::{CasOutcome, GraphStore, Node};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    nodes: BTreeMap<String, Node>,

    /// When set, every call fails with `Unavailable`.
    offline: bool,

    /// Writes to paths under these prefixes fail with `Unavailable`.
    failing_prefixes: Vec<String>,
}

impl MemoryStoreInner {
    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn check_writable(&self, path: &str) -> Result<()> {
        self.check_online()?;
        if self.failing_prefixes.iter().any(|p| path.starts_with(p)) {
            return Err(StoreError::Unavailable(format!("write to {path} rejected")));
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Take the store offline (or bring it back).
    pub fn set_offline(&self, offline: bool) {
        self.inner.write().offline = offline;
    }

    /// Make every write under `prefix` fail until [`clear_failures`] is called.
    ///
    /// [`clear_failures`]: MemoryStore::clear_failures
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.inner.write().failing_prefixes.push(prefix.into());
    }

    /// Remove all injected write failures.
    pub fn clear_failures(&self) {
        self.inner.write().failing_prefixes.clear();
    }

    /// Number of paths holding a node, tombstones included.
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn put(&self, path: &str, node: Node) -> Result<()> {
        let mut inner = self.inner.write();
        inner.check_writable(path)?;
        inner.nodes.insert(path.to_string(), node);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Node>> {
        let inner = self.inner.read();
        inner.check_online()?;
        Ok(inner.nodes.get(path).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Node)>> {
        let inner = self.inner.read();
        inner.check_online()?;
        Ok(inner
            .nodes
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, node)| (path.clone(), node.clone()))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Node>,
        new: Node,
    ) -> Result<CasOutcome> {
        let mut inner = self.inner.write();
        inner.check_writable(path)?;

        let current = inner.nodes.get(path);
        if current != expected {
            return Ok(CasOutcome::Mismatch {
                current: current.cloned(),
            });
        }

        inner.nodes.insert(path.to_string(), new);
        Ok(CasOutcome::Swapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn value(s: &'static str) -> Node {
        Node::Value(Bytes::from_static(s.as_bytes()))
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a/b").await.unwrap(), None);

        store.put("a/b", value("one")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(value("one")));
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let store = MemoryStore::new();
        store.put("a/b", value("one")).await.unwrap();
        store.delete("a/b", 42).await.unwrap();

        assert_eq!(
            store.get("a/b").await.unwrap(),
            Some(Node::Tombstone { deleted_at: 42 })
        );
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let store = MemoryStore::new();
        store.put("access/d1/alice", value("a")).await.unwrap();
        store.put("access/d1/bob", value("b")).await.unwrap();
        store.put("access/d10/carol", value("c")).await.unwrap();
        store.put("documents/d1", value("d")).await.unwrap();

        let listed = store.list("access/d1/").await.unwrap();
        let paths: Vec<_> = listed.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["access/d1/alice", "access/d1/bob"]);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();

        let outcome = store.compare_and_swap("k", None, value("v1")).await.unwrap();
        assert!(outcome.is_swapped());

        // Stale expectation loses.
        let outcome = store.compare_and_swap("k", None, value("v2")).await.unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Mismatch {
                current: Some(value("v1"))
            }
        );

        let outcome = store
            .compare_and_swap("k", Some(&value("v1")), value("v2"))
            .await
            .unwrap();
        assert!(outcome.is_swapped());
        assert_eq!(store.get("k").await.unwrap(), Some(value("v2")));
    }

    #[tokio::test]
    async fn test_offline() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_prefix() {
        let store = MemoryStore::new();
        store.fail_writes_under("access/");

        assert!(store.put("access/d/bob", value("x")).await.is_err());
        assert!(store.put("documents/d", value("x")).await.is_ok());

        store.clear_failures();
        assert!(store.put("access/d/bob", value("x")).await.is_ok());
    }
}
