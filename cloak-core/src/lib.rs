//! End-to-end encrypted messaging core.
//!
//! A [`session::Session`] owns one [`dispatch::MessageDispatcher`], which in
//! turn combines the local [`vault::KeyVault`], a [`crypto::MessageCipher`],
//! the remote key directory and the relay transport.

pub mod config;
pub mod connectivity;
pub mod crypto;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod session;
pub mod utils;
pub mod vault;
pub mod websocket;

pub use config::{ClientConfig, KeyStoreBackend};
pub use connectivity::{ConnectivityWatcher, RepublishOutcome};
pub use crypto::{CipherEngine, EncryptedPayload, KeyPair, MessageCipher, PayloadVersion};
pub use directory::{HttpDirectory, KeyDirectory, KeyDirectoryClient, RecipientKeyCache};
pub use dispatch::{Envelope, KeyReadiness, MessageDispatcher, ReceiveOutcome, SendOutcome};
pub use models::{Message, MessageLog};
pub use session::{Session, SessionHandle, SessionStatus};
pub use vault::KeyVault;
pub use websocket::{Transport, TransportOptions, WebSocketTransport, WsEvent};
