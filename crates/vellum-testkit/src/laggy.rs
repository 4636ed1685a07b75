//! A store whose writes reach readers late.
//!
//! Models a replica that has not yet received a peer's writes: `put` returns
//! at once but the node only lands in the inner store after the lag.
//! Compare-and-swap is not delayed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use vellum_store::{CasOutcome, GraphStore, Node, Result};

/// Wraps a store and delays every `put`.
pub struct LaggyStore<S> {
    inner: Arc<S>,
    lag: Duration,
}

impl<S: GraphStore + 'static> LaggyStore<S> {
    pub fn new(inner: Arc<S>, lag: Duration) -> Self {
        Self { inner, lag }
    }

    /// The store writes eventually land in.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<S: GraphStore + 'static> GraphStore for LaggyStore<S> {
    async fn put(&self, path: &str, node: Node) -> Result<()> {
        let inner = self.inner.clone();
        let path = path.to_string();
        let lag = self.lag;
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            if let Err(e) = inner.put(&path, node).await {
                tracing::warn!(path = %path, error = %e, "delayed write failed");
            }
        });
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Node>> {
        self.inner.get(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Node)>> {
        self.inner.list(prefix).await
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Node>,
        new: Node,
    ) -> Result<CasOutcome> {
        self.inner.compare_and_swap(path, expected, new).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_store::{codec, MemoryStore};

    fn value(s: &str) -> Node {
        codec::encode_node(&s).unwrap()
    }

    #[tokio::test]
    async fn test_put_lands_after_lag() {
        let store = LaggyStore::new(Arc::new(MemoryStore::new()), Duration::from_millis(30));
        store.put("a", value("x")).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("a").await.unwrap(), Some(value("x")));
    }
}
