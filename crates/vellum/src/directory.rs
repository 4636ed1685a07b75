//! Profile directory: `user id -> public encryption key`.

use std::sync::Arc;

use async_trait::async_trait;

use vellum_core::UserId;
use vellum_store::{codec, paths, GraphStore};

use crate::config::VellumConfig;
use crate::error::Result;
use crate::records::Profile;
use crate::settle::{bounded, read_settled, Slot};

/// Looks up the published profile of a user.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// The profile of `user`, or `None` if they have not published one.
    async fn profile(&self, user: &UserId) -> Result<Option<Profile>>;
}

/// A directory backed by `profiles/<user>` in the graph store.
pub struct StoreDirectory<S: GraphStore> {
    store: Arc<S>,
    config: VellumConfig,
}

impl<S: GraphStore> StoreDirectory<S> {
    pub fn new(store: Arc<S>, config: VellumConfig) -> Self {
        Self { store, config }
    }

    /// Publish (or replace) a profile.
    pub async fn publish(&self, profile: &Profile) -> Result<()> {
        let node = codec::encode_node(profile)?;
        bounded(
            self.config.store_timeout,
            self.store.put(&paths::profile(&profile.user_id), node),
        )
        .await?;
        tracing::info!(user = %profile.user_id, "published profile");
        Ok(())
    }
}

#[async_trait]
impl<S: GraphStore> ProfileDirectory for StoreDirectory<S> {
    async fn profile(&self, user: &UserId) -> Result<Option<Profile>> {
        let path = paths::profile(user);
        match read_settled(self.store.as_ref(), &path, &self.config).await? {
            Slot::Present(bytes) => Ok(Some(codec::decode(&bytes)?)),
            Slot::Deleted | Slot::Absent => {
                tracing::debug!(user = %user, "no profile published");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vellum_perms::{KeyAgreement, LocalIdentity};
    use vellum_store::MemoryStore;

    #[tokio::test]
    async fn test_publish_and_lookup() {
        let config = VellumConfig::default().with_settle_window(Duration::from_millis(20));
        let directory = StoreDirectory::new(Arc::new(MemoryStore::new()), config);

        let bob = UserId::new("bob").unwrap();
        let identity = LocalIdentity::generate(bob.clone());
        directory
            .publish(&Profile {
                user_id: bob.clone(),
                display_name: Some("Bob".into()),
                public_key: identity.public_key(),
            })
            .await
            .unwrap();

        let found = directory.profile(&bob).await.unwrap().unwrap();
        assert_eq!(found.public_key, identity.public_key());
        assert_eq!(found.display_name(), "Bob");

        let nobody = UserId::new("nobody").unwrap();
        assert!(directory.profile(&nobody).await.unwrap().is_none());
    }
}
