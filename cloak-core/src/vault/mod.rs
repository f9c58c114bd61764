//! Local persistence of the identity key pair.

mod storage;

pub use storage::{KeyRole, KeySlot, KeyStore, KeyringStore, MemoryStore, SqliteStore};

use std::sync::Arc;

use tracing::{debug, info};

use crate::crypto::{fingerprint, KeyPair};
use crate::error::StorageError;

/// Owns the key pair of one local identity.
///
/// Entries are namespaced by the identity, so several identities can share a
/// device (and a store) without colliding.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn KeyStore>,
    owner: String,
}

impl KeyVault {
    pub fn new(store: Arc<dyn KeyStore>, identity: &str) -> Self {
        Self {
            store,
            owner: identity.trim().to_lowercase(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.owner
    }

    fn slot(&self, role: KeyRole) -> KeySlot {
        KeySlot::new(role, &self.owner)
    }

    pub fn has_key_pair(&self) -> Result<bool, StorageError> {
        Ok(self.get_key_pair()?.is_some())
    }

    /// Load the pair. A store holding only one half is an error, not "no key".
    pub fn get_key_pair(&self) -> Result<Option<KeyPair>, StorageError> {
        let public_key = self.store.get(&self.slot(KeyRole::Public))?;
        let private_key = self.store.get(&self.slot(KeyRole::Private))?;

        match (public_key, private_key) {
            (Some(public_key), Some(private_key)) => Ok(Some(KeyPair {
                public_key,
                private_key,
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(StorageError::Incomplete {
                owner: self.owner.clone(),
                missing: "private",
            }),
            (None, Some(_)) => Err(StorageError::Incomplete {
                owner: self.owner.clone(),
                missing: "public",
            }),
        }
    }

    pub fn save_key_pair(&self, public_key: &str, private_key: &str) -> Result<(), StorageError> {
        if public_key.trim().is_empty() || private_key.trim().is_empty() {
            return Err(StorageError::Corrupt("refusing to store an empty key".to_string()));
        }

        // Private half is written first; an interrupted save reads back as Incomplete.
        self.store.put(&self.slot(KeyRole::Private), private_key)?;
        self.store.put(&self.slot(KeyRole::Public), public_key)?;

        info!(
            identity = %self.owner,
            fingerprint = %fingerprint(public_key),
            "Stored identity key pair"
        );
        Ok(())
    }

    pub fn clear_keys(&self) -> Result<(), StorageError> {
        self.store.delete(&self.slot(KeyRole::Private))?;
        self.store.delete(&self.slot(KeyRole::Public))?;
        debug!(identity = %self.owner, "Cleared identity key pair");
        Ok(())
    }
}
