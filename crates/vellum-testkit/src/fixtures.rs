//! Test fixtures and helpers.
//!
//! A [`TestNetwork`] is one shared store that several users join, each with
//! their own client. Keys are derived from the alias so runs are repeatable.

use std::sync::Arc;
use std::time::Duration;

use vellum::{Profile, StoreDirectory, Vellum, VellumConfig};
use vellum_core::UserId;
use vellum_perms::{KeyAgreement, LocalIdentity, X25519PublicKey};
use vellum_store::{GraphStore, MemoryStore};

use crate::laggy::LaggyStore;

/// Configuration with a short settle window so absent reads stay fast.
pub fn test_config() -> VellumConfig {
    VellumConfig::default()
        .with_settle_window(Duration::from_millis(100))
        .with_settle_poll_interval(Duration::from_millis(10))
        .with_store_timeout(Duration::from_secs(2))
}

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Deterministic identity seed for an alias.
pub fn seed_for(alias: &str) -> [u8; 32] {
    blake3::derive_key("vellum-testkit identity seed", alias.as_bytes())
}

/// One user on a test network.
pub struct Member<S: GraphStore = MemoryStore> {
    pub user: UserId,
    pub identity: Arc<LocalIdentity>,
    pub client: Vellum<S, StoreDirectory<S>>,
}

/// A shared store plus the profile directory over it.
pub struct TestNetwork<S: GraphStore = MemoryStore> {
    pub store: Arc<S>,
    pub directory: Arc<StoreDirectory<S>>,
    pub config: VellumConfig,
}

impl TestNetwork<MemoryStore> {
    /// A fully synced in-memory network.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), test_config())
    }
}

impl Default for TestNetwork<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork<LaggyStore<MemoryStore>> {
    /// A network whose writes take `lag` to become visible.
    pub fn laggy(lag: Duration) -> Self {
        let store = LaggyStore::new(Arc::new(MemoryStore::new()), lag);
        Self::with_store(Arc::new(store), test_config())
    }
}

impl<S: GraphStore> TestNetwork<S> {
    pub fn with_store(store: Arc<S>, config: VellumConfig) -> Self {
        let directory = Arc::new(StoreDirectory::new(store.clone(), config.clone()));
        Self {
            store,
            directory,
            config,
        }
    }

    /// Sign `alias` in with a deterministic key and publish their profile.
    pub async fn join(&self, alias: &str) -> vellum::Result<Member<S>> {
        let user = UserId::new(alias)?;
        let identity = Arc::new(LocalIdentity::from_seed(user.clone(), seed_for(alias)));

        self.directory
            .publish(&Profile {
                user_id: user.clone(),
                display_name: Some(display_name(alias)),
                public_key: identity.public_key(),
            })
            .await?;

        Ok(Member {
            client: self.client_for(identity.clone()),
            user,
            identity,
        })
    }

    /// Another client (device) for an existing identity, with its own key ring.
    pub fn client_for(&self, identity: Arc<LocalIdentity>) -> Vellum<S, StoreDirectory<S>> {
        Vellum::new(
            self.store.clone(),
            self.directory.clone(),
            identity,
            self.config.clone(),
        )
    }

    /// Replace the public key `alias` advertises.
    pub async fn republish_key(&self, alias: &str, public_key: X25519PublicKey) -> vellum::Result<()> {
        let user = UserId::new(alias)?;
        self.directory
            .publish(&Profile {
                display_name: Some(display_name(alias)),
                user_id: user,
                public_key,
            })
            .await
    }
}

fn display_name(alias: &str) -> String {
    let mut chars = alias.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
