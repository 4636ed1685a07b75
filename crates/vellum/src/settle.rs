//! Bounded store calls and settle-window reads.
//!
//! A replica may not have received a path yet. An empty first read is
//! therefore re-polled for a short window before it is believed.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use vellum_store::{GraphStore, Node, StoreError};

use crate::config::VellumConfig;

/// What a settled read found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A live value.
    Present(Bytes),
    /// A tombstone: the value was explicitly deleted.
    Deleted,
    /// Nothing arrived within the settle window.
    Absent,
}

/// Run a store call, failing with [`StoreError::Timeout`] if it takes longer
/// than `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> vellum_store::Result<T>
where
    F: Future<Output = vellum_store::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Read `path`, polling until it is present, tombstoned, or the settle window
/// elapses.
pub async fn read_settled<S>(
    store: &S,
    path: &str,
    config: &VellumConfig,
) -> vellum_store::Result<Slot>
where
    S: GraphStore + ?Sized,
{
    let deadline = Instant::now() + config.settle_window;
    let mut polls = 0u32;

    loop {
        polls += 1;
        match bounded(config.store_timeout, store.get(path)).await? {
            Some(Node::Value(bytes)) => return Ok(Slot::Present(bytes)),
            Some(Node::Tombstone { .. }) => return Ok(Slot::Deleted),
            None => {}
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(path, polls, "nothing arrived within settle window");
            return Ok(Slot::Absent);
        }
        tokio::time::sleep(config.settle_poll_interval.min(deadline - now)).await;
    }
}
