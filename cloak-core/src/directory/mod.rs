//! Public-key directory: remote lookups with a session cache in front.

mod cache;
mod http;

pub use cache::RecipientKeyCache;
pub use http::{HttpDirectory, DEFAULT_DIRECTORY_URL};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::crypto::fingerprint;
use crate::error::DirectoryError;
use crate::utils::normalize_username;

/// Directory's answer to a publish
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_first_setup: bool,
}

/// Remote service mapping usernames to public keys
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn fetch_key(&self, username: &str) -> Result<String, DirectoryError>;

    /// Batch lookup; users without a key map to `None`
    async fn fetch_keys(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, Option<String>>, DirectoryError>;

    /// Publish (or replace) the caller's own public key
    async fn publish_key(&self, public_key: &str) -> Result<PublishReceipt, DirectoryError>;
}

/// Resolves recipient keys through the cache, falling back to the directory
pub struct KeyDirectoryClient {
    directory: Arc<dyn KeyDirectory>,
    cache: RecipientKeyCache,
}

impl KeyDirectoryClient {
    pub fn new(directory: Arc<dyn KeyDirectory>) -> Self {
        Self::with_cache(directory, RecipientKeyCache::new())
    }

    pub fn with_cache(directory: Arc<dyn KeyDirectory>, cache: RecipientKeyCache) -> Self {
        Self { directory, cache }
    }

    pub fn cache(&self) -> &RecipientKeyCache {
        &self.cache
    }

    pub fn cached(&self, username: &str) -> Option<String> {
        self.cache.get(username)
    }

    /// A cache hit never reaches the directory.
    pub async fn resolve(&self, username: &str) -> Result<String, DirectoryError> {
        let username = normalize_username(username);

        if let Some(key) = self.cache.get(&username) {
            debug!(username = %username, "Recipient key cache hit");
            return Ok(key);
        }

        let key = self.directory.fetch_key(&username).await?;
        debug!(
            username = %username,
            fingerprint = %fingerprint(&key),
            "Resolved recipient key"
        );
        self.cache.insert(&username, key.clone());
        Ok(key)
    }

    /// Warm the cache for users not already in it. Returns how many keys were added.
    pub async fn prefetch(&self, usernames: &[String]) -> Result<usize, DirectoryError> {
        let mut missing: Vec<String> = usernames
            .iter()
            .map(|u| normalize_username(u))
            .filter(|u| !u.is_empty() && self.cache.get(u).is_none())
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            return Ok(0);
        }

        let keys = self.directory.fetch_keys(&missing).await?;
        let mut added = 0;
        for (username, key) in keys {
            if let Some(key) = key {
                self.cache.insert(&username, key);
                added += 1;
            }
        }

        debug!(requested = missing.len(), added, "Prefetched recipient keys");
        Ok(added)
    }

    pub fn invalidate(&self, username: &str) -> bool {
        self.cache.remove(username)
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Publish our own public key. Safe to repeat with the same key.
    pub async fn publish(&self, own_public_key: &str) -> Result<PublishReceipt, DirectoryError> {
        let receipt = self.directory.publish_key(own_public_key).await?;
        info!(
            fingerprint = %fingerprint(own_public_key),
            first_setup = receipt.is_first_setup,
            "Published public key"
        );
        Ok(receipt)
    }
}
