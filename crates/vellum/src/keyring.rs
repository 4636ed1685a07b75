//! Local cache of unwrapped document keys.
//!
//! Unwrapping costs a key agreement. Keys are cached per root document and a
//! cached key is only handed out while its fingerprint still matches the
//! record, so a rotation elsewhere invalidates it.

use std::collections::HashMap;

use parking_lot::RwLock;

use vellum_core::DocumentId;
use vellum_perms::{EncryptionKey, KeyFingerprint};

#[derive(Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<DocumentId, EncryptionKey>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached key for `root`, if it matches `expected`.
    pub fn get(&self, root: &DocumentId, expected: &KeyFingerprint) -> Option<EncryptionKey> {
        let keys = self.keys.read();
        keys.get(root)
            .filter(|key| key.fingerprint() == *expected)
            .cloned()
    }

    pub fn insert(&self, root: DocumentId, key: EncryptionKey) {
        self.keys.write().insert(root, key);
    }

    /// Forget the key for `root`.
    pub fn evict(&self, root: &DocumentId) {
        self.keys.write().remove(root);
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
