//! A store that can hold one write until the test lets it go.
//!
//! Used to land another writer's change between an operation's read and its
//! write, deterministically.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use vellum_store::{CasOutcome, GraphStore, Node, Result};

struct Gate {
    path: String,
    arrived: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// The test's handle on a held write.
pub struct Held {
    arrived: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl Held {
    /// Resolves once the held call reaches the store.
    pub async fn arrived(&mut self) {
        let _ = (&mut self.arrived).await;
    }

    /// Let the held call through.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Wraps a store; everything but the armed write passes straight through.
pub struct GatedStore<S> {
    inner: Arc<S>,
    gate: Mutex<Option<Gate>>,
}

impl<S: GraphStore + 'static> GatedStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Hold the next `put` or compare-and-swap on `path`. Later writes are
    /// not held.
    pub fn hold_next_write(&self, path: impl Into<String>) -> Held {
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock() = Some(Gate {
            path: path.into(),
            arrived: arrived_tx,
            release: release_rx,
        });
        Held {
            arrived: arrived_rx,
            release: release_tx,
        }
    }

    async fn pass(&self, path: &str) {
        let gate = {
            let mut slot = self.gate.lock();
            match slot.as_ref() {
                Some(gate) if gate.path == path => slot.take(),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            tracing::debug!(path, "holding write");
            let _ = gate.arrived.send(());
            let _ = gate.release.await;
        }
    }
}

#[async_trait]
impl<S: GraphStore + 'static> GraphStore for GatedStore<S> {
    async fn put(&self, path: &str, node: Node) -> Result<()> {
        self.pass(path).await;
        self.inner.put(path, node).await
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
        self.pass(path).await;
        self.inner.compare_and_swap(path, expected, new).await
    }
}
