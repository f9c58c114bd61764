use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use keyring::Entry;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;

const KEYRING_SERVICE: &str = "cloak-chat";

/// Which half of the identity key pair an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Public,
    Private,
}

impl KeyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyRole::Public => "public",
            KeyRole::Private => "private",
        }
    }
}

/// Composite address of one stored key: `(role, owner)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySlot {
    pub role: KeyRole,
    pub owner: String,
}

impl KeySlot {
    pub fn new(role: KeyRole, owner: &str) -> Self {
        Self {
            role,
            owner: owner.trim().to_lowercase(),
        }
    }

    fn entry_name(&self) -> String {
        format!("{}-key-{}", self.role.as_str(), self.owner)
    }
}

/// Local persistent key-value store for key material
pub trait KeyStore: Send + Sync {
    fn get(&self, slot: &KeySlot) -> Result<Option<String>, StorageError>;

    fn put(&self, slot: &KeySlot, value: &str) -> Result<(), StorageError>;

    /// Deleting a missing entry is not an error
    fn delete(&self, slot: &KeySlot) -> Result<(), StorageError>;
}

/// OS keyring (Windows Credential Manager, macOS Keychain, Linux Secret Service)
#[derive(Debug, Default, Clone)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(slot: &KeySlot) -> Result<Entry, StorageError> {
        Entry::new(KEYRING_SERVICE, &slot.entry_name())
            .map_err(|e| StorageError::Backend(format!("Failed to access keyring: {}", e)))
    }
}

impl KeyStore for KeyringStore {
    fn get(&self, slot: &KeySlot) -> Result<Option<String>, StorageError> {
        match Self::entry(slot)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => Err(StorageError::Corrupt(format!(
                "{} key is not valid UTF-8",
                slot.role.as_str()
            ))),
            Err(e) => Err(StorageError::Backend(format!("Failed to retrieve key: {}", e))),
        }
    }

    fn put(&self, slot: &KeySlot, value: &str) -> Result<(), StorageError> {
        Self::entry(slot)?
            .set_password(value)
            .map_err(|e| StorageError::Backend(format!("Failed to store key: {}", e)))
    }

    fn delete(&self, slot: &KeySlot) -> Result<(), StorageError> {
        match Self::entry(slot)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(StorageError::Backend(format!("Failed to delete key: {}", e))),
        }
    }
}

/// SQLite-backed store, one row per `(role, owner)`
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Backend(format!("Failed to open key database: {}", e)))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Backend(format!("Failed to open key database: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS key_entries (
                role TEXT CHECK(role IN ('public', 'private')) NOT NULL,
                owner TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (role, owner)
            );
            ",
        )
        .map_err(|e| StorageError::Backend(format!("Failed to create key table: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock poisoned: {}", e)))
    }
}

impl KeyStore for SqliteStore {
    fn get(&self, slot: &KeySlot) -> Result<Option<String>, StorageError> {
        self.lock()?
            .query_row(
                "SELECT value FROM key_entries WHERE role = ?1 AND owner = ?2",
                (slot.role.as_str(), &slot.owner),
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| StorageError::Backend(format!("Failed to load key: {}", e)))
    }

    fn put(&self, slot: &KeySlot, value: &str) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp_millis();

        self.lock()?
            .execute(
                "INSERT INTO key_entries (role, owner, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(role, owner) DO UPDATE SET
                 value = ?3, updated_at = ?4",
                (slot.role.as_str(), &slot.owner, value, now),
            )
            .map_err(|e| StorageError::Backend(format!("Failed to store key: {}", e)))?;

        Ok(())
    }

    fn delete(&self, slot: &KeySlot) -> Result<(), StorageError> {
        self.lock()?
            .execute(
                "DELETE FROM key_entries WHERE role = ?1 AND owner = ?2",
                (slot.role.as_str(), &slot.owner),
            )
            .map_err(|e| StorageError::Backend(format!("Failed to delete key: {}", e)))?;

        Ok(())
    }
}

/// Process-local store; keys vanish with the process
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<KeySlot, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryStore {
    fn get(&self, slot: &KeySlot) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(slot).cloned())
    }

    fn put(&self, slot: &KeySlot, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock poisoned: {}", e)))?
            .insert(slot.clone(), value.to_string());
        Ok(())
    }

    fn delete(&self, slot: &KeySlot) -> Result<(), StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock poisoned: {}", e)))?
            .remove(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::{Arc, Once};

    use keyring::credential::{Credential, CredentialApi, CredentialBuilder, CredentialBuilderApi};

    type Secrets = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

    /// In-process keyring where every `Entry` for the same service/user sees
    /// the same secret, like a real platform store.
    #[derive(Debug)]
    struct SharedCredential {
        secrets: Secrets,
        key: (String, String),
    }

    impl CredentialApi for SharedCredential {
        fn set_password(&self, password: &str) -> keyring::Result<()> {
            self.set_secret(password.as_bytes())
        }

        fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
            self.secrets
                .lock()
                .unwrap()
                .insert(self.key.clone(), secret.to_vec());
            Ok(())
        }

        fn get_password(&self) -> keyring::Result<String> {
            let secret = self.get_secret()?;
            String::from_utf8(secret.clone()).map_err(|_| keyring::Error::BadEncoding(secret))
        }

        fn get_secret(&self) -> keyring::Result<Vec<u8>> {
            self.secrets
                .lock()
                .unwrap()
                .get(&self.key)
                .cloned()
                .ok_or(keyring::Error::NoEntry)
        }

        fn delete_credential(&self) -> keyring::Result<()> {
            self.secrets
                .lock()
                .unwrap()
                .remove(&self.key)
                .map(|_| ())
                .ok_or(keyring::Error::NoEntry)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct SharedBuilder {
        secrets: Secrets,
    }

    impl CredentialBuilderApi for SharedBuilder {
        fn build(
            &self,
            _target: Option<&str>,
            service: &str,
            user: &str,
        ) -> keyring::Result<Box<Credential>> {
            Ok(Box::new(SharedCredential {
                secrets: self.secrets.clone(),
                key: (service.to_string(), user.to_string()),
            }))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn install_shared_keyring() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            let builder: Box<CredentialBuilder> = Box::new(SharedBuilder {
                secrets: Secrets::default(),
            });
            keyring::set_default_credential_builder(builder);
        });
    }

    #[test]
    fn test_keyring_put_get_delete() {
        install_shared_keyring();
        let slot = KeySlot::new(KeyRole::Public, "keyring-frank");

        // Separate store values share the platform entries
        KeyringStore::new().put(&slot, "value").unwrap();
        assert_eq!(KeyringStore::new().get(&slot).unwrap().as_deref(), Some("value"));

        KeyringStore::new().delete(&slot).unwrap();
        assert_eq!(KeyringStore::new().get(&slot).unwrap(), None);
        // Deleting a missing entry is fine
        KeyringStore::new().delete(&slot).unwrap();
    }

    #[test]
    fn test_keyring_backed_vault_keeps_pair() {
        install_shared_keyring();
        let vault = crate::vault::KeyVault::new(Arc::new(KeyringStore::new()), "keyring-grace");

        vault.save_key_pair("pub-g", "priv-g").unwrap();
        assert!(vault.has_key_pair().unwrap());
        let reopened = crate::vault::KeyVault::new(Arc::new(KeyringStore::new()), "keyring-grace");
        assert_eq!(reopened.get_key_pair().unwrap().unwrap().private_key, "priv-g");

        vault.clear_keys().unwrap();
        assert!(!reopened.has_key_pair().unwrap());
    }

    #[test]
    fn test_slot_owner_is_normalized() {
        let slot = KeySlot::new(KeyRole::Private, "  Alice ");
        assert_eq!(slot.owner, "alice");
        assert_eq!(slot.entry_name(), "private-key-alice");
    }

    #[test]
    fn test_sqlite_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let slot = KeySlot::new(KeyRole::Public, "alice");

        assert_eq!(store.get(&slot).unwrap(), None);
        store.put(&slot, "first").unwrap();
        store.put(&slot, "second").unwrap();
        assert_eq!(store.get(&slot).unwrap().as_deref(), Some("second"));

        store.delete(&slot).unwrap();
        assert_eq!(store.get(&slot).unwrap(), None);
        // Deleting again is fine
        store.delete(&slot).unwrap();
    }

    #[test]
    fn test_sqlite_roles_are_separate_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&KeySlot::new(KeyRole::Public, "bob"), "pub").unwrap();
        store.put(&KeySlot::new(KeyRole::Private, "bob"), "priv").unwrap();

        assert_eq!(
            store.get(&KeySlot::new(KeyRole::Public, "bob")).unwrap().as_deref(),
            Some("pub")
        );
        assert_eq!(
            store.get(&KeySlot::new(KeyRole::Private, "bob")).unwrap().as_deref(),
            Some("priv")
        );
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        let slot = KeySlot::new(KeyRole::Private, "carol");

        SqliteStore::open(&path).unwrap().put(&slot, "secret").unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(&slot).unwrap().as_deref(), Some("secret"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let slot = KeySlot::new(KeyRole::Public, "dave");
        store.put(&slot, "k").unwrap();
        assert_eq!(store.get(&slot).unwrap().as_deref(), Some("k"));
        store.delete(&slot).unwrap();
        assert!(store.get(&slot).unwrap().is_none());
    }
}
