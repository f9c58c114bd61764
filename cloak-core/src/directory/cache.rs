use std::sync::Arc;

use dashmap::DashMap;

use crate::utils::normalize_username;

/// Session-scoped map from username to that user's public key.
///
/// Keys are stored under the normalized username; clones share entries.
#[derive(Debug, Clone, Default)]
pub struct RecipientKeyCache {
    entries: Arc<DashMap<String, String>>,
}

impl RecipientKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<String> {
        self.entries
            .get(&normalize_username(username))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, username: &str, public_key: String) {
        self.entries.insert(normalize_username(username), public_key);
    }

    pub fn remove(&self, username: &str) -> bool {
        self.entries.remove(&normalize_username(username)).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
