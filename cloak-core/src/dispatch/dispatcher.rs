use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::readiness::{KeyReadiness, ReadinessEvent};
use crate::crypto::{fingerprint, EncryptedPayload, MessageCipher};
use crate::directory::{KeyDirectoryClient, PublishReceipt};
use crate::error::{DecryptionError, DirectoryError, DispatchError, StorageError, TransportError};
use crate::models::input::{SendInput, ValidateExt};
use crate::models::{Message, MessageLog, UNDECRYPTABLE_PLACEHOLDER};
use crate::utils::{normalize_username, now_timestamp, parse_timestamp};
use crate::vault::KeyVault;
use crate::websocket::{Transport, WsEvent};

/// An inbound chat message, independent of which relay event carried it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub body: String,
    pub encrypted: bool,
    pub is_directed: bool,
    pub recipient: Option<String>,
    pub timestamp: Option<String>,
    pub origin_peer: Option<String>,
}

impl Envelope {
    /// `None` for events that do not carry a chat message
    pub fn from_event(event: &WsEvent) -> Option<Envelope> {
        match event {
            WsEvent::ReceiveMessage {
                username,
                message,
                encrypted,
                timestamp,
                from_peer,
                peer_id,
            } => Some(Envelope {
                sender: username.clone(),
                body: message.clone(),
                encrypted: *encrypted,
                is_directed: false,
                recipient: None,
                timestamp: timestamp.clone(),
                origin_peer: peer_id.clone().filter(|_| from_peer.unwrap_or(true)),
            }),
            WsEvent::ReceiveDirectMessage {
                username,
                recipient,
                message,
                encrypted,
                timestamp,
            } => Some(Envelope {
                sender: username.clone(),
                body: message.clone(),
                encrypted: *encrypted,
                is_directed: true,
                recipient: Some(recipient.clone()),
                timestamp: timestamp.clone(),
                origin_peer: None,
            }),
            _ => None,
        }
    }
}

/// A directed message went out in plaintext because no usable key was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedSendWarning {
    pub recipient: String,
    pub reason: DirectoryError,
}

impl fmt::Display for DegradedSendWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not encrypt message for {} ({}). Message sent unencrypted.",
            self.recipient, self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// The envelope left encrypted
    pub encrypted: bool,
    pub warning: Option<DegradedSendWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndecryptableReason {
    #[error("no local key pair")]
    NoLocalKey,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Decryption(#[from] DecryptionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Appended with readable text
    Delivered { encrypted: bool },
    /// Appended as a placeholder
    Undecryptable(UndecryptableReason),
    /// Relay echo of our own directed message; nothing appended
    Suppressed,
}

/// Coordinates send and receive for one local identity.
///
/// Owns the readiness state and the message log. Every mutating operation
/// takes `&mut self`, so a single task drives it (see [`crate::session`]).
pub struct MessageDispatcher {
    identity: String,
    vault: KeyVault,
    cipher: Arc<dyn MessageCipher>,
    directory: Arc<KeyDirectoryClient>,
    transport: Arc<dyn Transport>,
    readiness: KeyReadiness,
    storage_fault: Option<StorageError>,
    log: MessageLog,
}

impl MessageDispatcher {
    pub fn new(
        vault: KeyVault,
        cipher: Arc<dyn MessageCipher>,
        directory: Arc<KeyDirectoryClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identity: vault.identity().to_string(),
            vault,
            cipher,
            directory,
            transport,
            readiness: KeyReadiness::Loading,
            storage_fault: None,
            log: MessageLog::new(),
        }
    }

    pub fn with_log(mut self, log: MessageLog) -> Self {
        self.log = log;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn readiness(&self) -> KeyReadiness {
        self.readiness
    }

    /// Last storage failure seen while loading keys, if any
    pub fn storage_fault(&self) -> Option<&StorageError> {
        self.storage_fault.as_ref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn directory(&self) -> &Arc<KeyDirectoryClient> {
        &self.directory
    }

    fn transition(&mut self, event: ReadinessEvent) {
        match self.readiness.next(event) {
            Some(next) => {
                if next != self.readiness {
                    info!(from = %self.readiness, to = %next, "Key readiness changed");
                }
                self.readiness = next;
            }
            None => {
                warn!(state = %self.readiness, ?event, "Ignoring illegal readiness transition");
            }
        }
    }

    /// Consult the vault and leave `Loading`.
    ///
    /// A storage failure keeps the state at `Loading` and is returned; it is
    /// never read as "no keys".
    pub fn initialize(&mut self) -> Result<KeyReadiness, StorageError> {
        if self.readiness != KeyReadiness::Loading {
            return Ok(self.readiness);
        }

        match self.vault.get_key_pair() {
            Ok(Some(pair)) => {
                self.storage_fault = None;
                if self.cipher.is_valid_public_key(&pair.public_key)
                    && self.cipher.is_valid_private_key(&pair.private_key)
                {
                    debug!(fingerprint = %fingerprint(&pair.public_key), "Loaded key pair");
                    self.transition(ReadinessEvent::KeysFound);
                } else {
                    warn!(
                        identity = %self.identity,
                        "Stored key pair is not usable with the current cipher, setup required"
                    );
                    self.transition(ReadinessEvent::KeysAbsent);
                }
                Ok(self.readiness)
            }
            Ok(None) => {
                self.storage_fault = None;
                self.transition(ReadinessEvent::KeysAbsent);
                Ok(self.readiness)
            }
            Err(e) => {
                error!(error = %e, identity = %self.identity, "Failed to load key pair");
                self.storage_fault = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Generate, persist and publish a fresh key pair.
    ///
    /// Readiness becomes `Ready` only after both the vault write and the
    /// directory publish succeed. A failed publish removes the stored pair.
    pub async fn setup_keys(&mut self) -> Result<(), DispatchError> {
        if self.readiness == KeyReadiness::Loading {
            self.initialize()?;
        }
        if self.readiness == KeyReadiness::Ready {
            debug!("Key pair already set up");
            return Ok(());
        }

        let pair = self.cipher.generate_key_pair()?;
        self.vault.save_key_pair(&pair.public_key, &pair.private_key)?;

        if let Err(e) = self.directory.publish(&pair.public_key).await {
            error!(error = %e, "Failed to publish new public key, discarding it");
            if let Err(clear_err) = self.vault.clear_keys() {
                error!(error = %clear_err, "Failed to discard unpublished key pair");
            }
            return Err(e.into());
        }

        self.transition(ReadinessEvent::SetupCompleted);
        Ok(())
    }

    /// Drive readiness to `Ready`, running key setup if needed
    pub async fn ensure_ready(&mut self) -> Result<KeyReadiness, DispatchError> {
        self.initialize()?;
        if self.readiness == KeyReadiness::NotSetup {
            self.setup_keys().await?;
        }
        Ok(self.readiness)
    }

    pub fn clear_keys(&mut self) -> Result<(), StorageError> {
        self.vault.clear_keys()?;
        self.transition(ReadinessEvent::Cleared);
        Ok(())
    }

    /// Replace the key pair: clear, then set up again. Cached recipient keys
    /// are dropped too and re-resolved on the next send.
    pub async fn reset_keys(&mut self) -> Result<(), DispatchError> {
        self.clear_keys()?;
        self.directory.invalidate_all();
        self.setup_keys().await
    }

    /// Own public key, only while `Ready`
    pub fn announceable_key(&self) -> Option<String> {
        if !self.readiness.is_ready() {
            return None;
        }
        match self.vault.get_key_pair() {
            Ok(pair) => pair.map(|p| p.public_key),
            Err(e) => {
                warn!(error = %e, "Could not read own public key");
                None
            }
        }
    }

    /// Republish our key so the directory converges after restarts
    pub async fn announce_own_key(&self) -> Result<Option<PublishReceipt>, DirectoryError> {
        match self.announceable_key() {
            Some(key) => self.directory.publish(&key).await.map(Some),
            None => Ok(None),
        }
    }

    /// Ask the relay for its current peer list
    pub async fn request_peers(&self) -> Result<(), TransportError> {
        self.transport.emit(WsEvent::GetP2pInfo).await
    }

    /// Send a broadcast (`recipient` = `None`) or directed message.
    ///
    /// Broadcasts always travel in plaintext and are not echoed locally; the
    /// relay delivers them back. Directed messages are encrypted when the
    /// recipient's key resolves and degrade to plaintext with a warning when
    /// it does not. An encryption failure aborts the send.
    pub async fn send(
        &mut self,
        body: &str,
        recipient: Option<&str>,
    ) -> Result<SendOutcome, DispatchError> {
        let input = SendInput {
            body: body.to_string(),
            recipient: recipient.map(String::from),
        };
        input.validate_input().map_err(DispatchError::Validation)?;

        let timestamp = now_timestamp();

        let Some(recipient) = input.recipient.as_deref().map(normalize_username) else {
            self.transport
                .emit(WsEvent::SendMessage {
                    username: self.identity.clone(),
                    message: input.body,
                    encrypted: false,
                    is_dm: false,
                    timestamp,
                })
                .await?;
            debug!("Broadcast sent");
            return Ok(SendOutcome {
                encrypted: false,
                warning: None,
            });
        };

        let resolved = match self.directory.resolve(&recipient).await {
            Ok(key) if self.cipher.is_valid_public_key(&key) => Ok(key),
            Ok(_) => {
                self.directory.invalidate(&recipient);
                Err(DirectoryError::InvalidKey(recipient.clone()))
            }
            Err(e) => Err(e),
        };

        let (wire_body, encrypted, warning) = match resolved {
            Ok(key) => {
                let payload = self.cipher.encrypt(&input.body, &key)?;
                (payload.to_json(), true, None)
            }
            Err(reason) => {
                let warning = DegradedSendWarning {
                    recipient: recipient.clone(),
                    reason,
                };
                warn!(recipient = %recipient, reason = %warning.reason, "Sending direct message unencrypted");
                (input.body.clone(), false, Some(warning))
            }
        };

        self.transport
            .emit(WsEvent::SendDirectMessage {
                username: self.identity.clone(),
                recipient: recipient.clone(),
                message: wire_body,
                encrypted,
                timestamp: timestamp.clone(),
            })
            .await?;

        let mut echo = Message::new(&self.identity, input.body, parse_timestamp(Some(&timestamp)));
        echo.is_directed = true;
        echo.recipient = Some(recipient.clone());
        echo.encrypted = encrypted;
        self.log.append(echo);

        debug!(recipient = %recipient, encrypted, "Direct message sent");
        Ok(SendOutcome { encrypted, warning })
    }

    /// Append an inbound message to the log.
    ///
    /// Never fails: anything that cannot be decrypted becomes exactly one
    /// placeholder entry.
    pub fn receive(&mut self, envelope: Envelope) -> ReceiveOutcome {
        if envelope.is_directed && normalize_username(&envelope.sender) == self.identity {
            debug!("Suppressing relay echo of own direct message");
            return ReceiveOutcome::Suppressed;
        }

        let mut message = Message::new(
            &envelope.sender,
            String::new(),
            parse_timestamp(envelope.timestamp.as_deref()),
        );
        message.is_directed = envelope.is_directed;
        message.recipient = envelope.recipient.clone();
        message.origin_peer = envelope.origin_peer.clone();
        message.encrypted = envelope.encrypted;

        if !envelope.encrypted {
            message.body = envelope.body;
            self.log.append(message);
            return ReceiveOutcome::Delivered { encrypted: false };
        }

        match self.open(&envelope.body) {
            Ok(plaintext) => {
                message.body = plaintext;
                self.log.append(message);
                ReceiveOutcome::Delivered { encrypted: true }
            }
            Err(reason) => {
                warn!(sender = %envelope.sender, reason = %reason, "Could not decrypt message");
                message.body = UNDECRYPTABLE_PLACEHOLDER.to_string();
                message.undecryptable = true;
                self.log.append(message);
                ReceiveOutcome::Undecryptable(reason)
            }
        }
    }

    fn open(&mut self, body: &str) -> Result<String, UndecryptableReason> {
        let private_key = match self.vault.get_key_pair() {
            Ok(Some(pair)) => pair.private_key,
            Ok(None) => return Err(UndecryptableReason::NoLocalKey),
            Err(e) => {
                self.storage_fault = Some(e.clone());
                return Err(e.into());
            }
        };

        let payload = EncryptedPayload::from_json(body)?;
        Ok(self.cipher.decrypt(&payload, &private_key)?)
    }
}
