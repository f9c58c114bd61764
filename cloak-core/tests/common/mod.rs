//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cloak_core::crypto::{CipherEngine, EncryptedPayload, KeyPair, MessageCipher};
use cloak_core::directory::{KeyDirectory, KeyDirectoryClient, PublishReceipt};
use cloak_core::error::{DecryptionError, DirectoryError, EncryptionError, TransportError};
use cloak_core::vault::{KeyVault, MemoryStore};
use cloak_core::websocket::{Transport, WsEvent};
use cloak_core::MessageDispatcher;

/// In-memory key directory shared by every test client
#[derive(Default)]
pub struct MemoryDirectory {
    keys: Mutex<HashMap<String, String>>,
    pub lookups: AtomicUsize,
    pub publishes: AtomicUsize,
    pub fail_publish: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn key_of(&self, username: &str) -> Option<String> {
        self.keys.lock().unwrap().get(username).cloned()
    }

    pub fn set_key(&self, username: &str, key: &str) {
        self.keys
            .lock()
            .unwrap()
            .insert(username.to_string(), key.to_string());
    }

    /// A view of the directory authenticated as `username`
    pub fn as_user(self: &Arc<Self>, username: &str) -> Arc<dyn KeyDirectory> {
        Arc::new(UserDirectory {
            shared: self.clone(),
            username: username.to_string(),
        })
    }
}

struct UserDirectory {
    shared: Arc<MemoryDirectory>,
    username: String,
}

#[async_trait]
impl KeyDirectory for UserDirectory {
    async fn fetch_key(&self, username: &str) -> Result<String, DirectoryError> {
        self.shared.lookups.fetch_add(1, Ordering::SeqCst);
        self.shared
            .key_of(username)
            .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))
    }

    async fn fetch_keys(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, Option<String>>, DirectoryError> {
        Ok(usernames
            .iter()
            .map(|u| (u.clone(), self.shared.key_of(u)))
            .collect())
    }

    async fn publish_key(&self, public_key: &str) -> Result<PublishReceipt, DirectoryError> {
        if self.shared.fail_publish.load(Ordering::SeqCst) {
            return Err(DirectoryError::Http("directory offline".to_string()));
        }
        self.shared.publishes.fetch_add(1, Ordering::SeqCst);
        let previous = self
            .shared
            .keys
            .lock()
            .unwrap()
            .insert(self.username.clone(), public_key.to_string());
        Ok(PublishReceipt {
            message: "Public key updated".to_string(),
            is_first_setup: previous.is_none(),
        })
    }
}

/// Transport that records every emitted event
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<WsEvent>>,
    pub offline: AtomicBool,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<WsEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<WsEvent> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn emit(&self, event: WsEvent) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().unwrap().push(event);
        Ok(())
    }
}

/// Real cipher that counts encrypt/decrypt calls
pub struct CountingCipher {
    inner: CipherEngine,
    pub encrypts: AtomicUsize,
    pub decrypts: AtomicUsize,
}

impl CountingCipher {
    pub fn new(inner: CipherEngine) -> Arc<Self> {
        Arc::new(Self {
            inner,
            encrypts: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
        })
    }

    pub fn encrypt_count(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }
}

impl MessageCipher for CountingCipher {
    fn generate_key_pair(&self) -> Result<KeyPair, EncryptionError> {
        self.inner.generate_key_pair()
    }

    fn encrypt(&self, plaintext: &str, key: &str) -> Result<EncryptedPayload, EncryptionError> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt(plaintext, key)
    }

    fn decrypt(&self, payload: &EncryptedPayload, key: &str) -> Result<String, DecryptionError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(payload, key)
    }

    fn is_valid_public_key(&self, key: &str) -> bool {
        self.inner.is_valid_public_key(key)
    }

    fn is_valid_private_key(&self, key: &str) -> bool {
        self.inner.is_valid_private_key(key)
    }
}

/// One local identity wired to shared test doubles
pub struct TestClient {
    pub dispatcher: MessageDispatcher,
    pub vault: KeyVault,
    pub transport: Arc<RecordingTransport>,
    pub cipher: Arc<CountingCipher>,
}

impl TestClient {
    pub fn new(username: &str, directory: &Arc<MemoryDirectory>) -> Self {
        Self::with_cipher(username, directory, CipherEngine::new())
    }

    pub fn with_cipher(
        username: &str,
        directory: &Arc<MemoryDirectory>,
        engine: CipherEngine,
    ) -> Self {
        let vault = KeyVault::new(Arc::new(MemoryStore::new()), username);
        let transport = Arc::new(RecordingTransport::default());
        let cipher = CountingCipher::new(engine);
        let client = Arc::new(KeyDirectoryClient::new(directory.as_user(username)));

        let dispatcher =
            MessageDispatcher::new(vault.clone(), cipher.clone(), client, transport.clone());

        Self {
            dispatcher,
            vault,
            transport,
            cipher,
        }
    }
}

/// What the relay delivers to the recipient for the last outbound event
pub fn relay_last(transport: &RecordingTransport) -> WsEvent {
    match transport.last().expect("nothing was sent") {
        WsEvent::SendDirectMessage {
            username,
            recipient,
            message,
            encrypted,
            timestamp,
        } => WsEvent::ReceiveDirectMessage {
            username,
            recipient,
            message,
            encrypted,
            timestamp: Some(timestamp),
        },
        WsEvent::SendMessage {
            username,
            message,
            encrypted,
            timestamp,
            ..
        } => WsEvent::ReceiveMessage {
            username,
            message,
            encrypted,
            timestamp: Some(timestamp),
            from_peer: None,
            peer_id: None,
        },
        other => panic!("cannot relay {:?}", other),
    }
}
