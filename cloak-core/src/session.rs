//! Single event loop that owns the dispatcher.
//!
//! Inbound relay events and user commands are funnelled through one channel
//! and handled one at a time, so readiness, the message log and the peer set
//! never see concurrent mutation.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityWatcher;
use crate::crypto::fingerprint;
use crate::dispatch::{Envelope, KeyReadiness, MessageDispatcher, SendOutcome};
use crate::error::DispatchError;
use crate::utils::normalize_username;
use crate::websocket::WsEvent;

type Reply<T> = oneshot::Sender<Result<T, DispatchError>>;

pub enum SessionEvent {
    Inbound(WsEvent),
    Send {
        body: String,
        recipient: Option<String>,
        reply: Reply<SendOutcome>,
    },
    ClearKeys {
        reply: Reply<()>,
    },
    ResetKeys {
        reply: Reply<()>,
    },
    /// Drop one cached recipient key
    Forget {
        username: String,
    },
    RequestPeers,
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Shutdown,
}

/// Snapshot of session state for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub identity: String,
    pub readiness: KeyReadiness,
    pub fingerprint: Option<String>,
    pub online: Vec<String>,
    pub peers: Vec<String>,
    pub cached_keys: usize,
    pub messages: usize,
}

/// Cloneable front door to a running [`Session`]
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    fn submit(&self, event: SessionEvent) -> Result<(), DispatchError> {
        self.tx.send(event).map_err(|_| DispatchError::SessionClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionEvent,
    ) -> Result<T, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.submit(build(reply))?;
        rx.await.map_err(|_| DispatchError::SessionClosed)?
    }

    pub fn inbound(&self, event: WsEvent) -> Result<(), DispatchError> {
        self.submit(SessionEvent::Inbound(event))
    }

    pub async fn send(
        &self,
        body: &str,
        recipient: Option<&str>,
    ) -> Result<SendOutcome, DispatchError> {
        let body = body.to_string();
        let recipient = recipient.map(String::from);
        self.request(|reply| SessionEvent::Send {
            body,
            recipient,
            reply,
        })
        .await
    }

    pub async fn clear_keys(&self) -> Result<(), DispatchError> {
        self.request(|reply| SessionEvent::ClearKeys { reply }).await
    }

    pub async fn reset_keys(&self) -> Result<(), DispatchError> {
        self.request(|reply| SessionEvent::ResetKeys { reply }).await
    }

    pub fn forget(&self, username: &str) -> Result<(), DispatchError> {
        self.submit(SessionEvent::Forget {
            username: username.to_string(),
        })
    }

    pub fn request_peers(&self) -> Result<(), DispatchError> {
        self.submit(SessionEvent::RequestPeers)
    }

    pub async fn status(&self) -> Result<SessionStatus, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.submit(SessionEvent::Status { reply })?;
        rx.await.map_err(|_| DispatchError::SessionClosed)
    }

    pub fn shutdown(&self) -> Result<(), DispatchError> {
        self.submit(SessionEvent::Shutdown)
    }

    /// Forward transport events into the session until either side closes
    pub fn forward_inbound(&self, mut inbound: mpsc::UnboundedReceiver<WsEvent>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                if handle.inbound(event).is_err() {
                    break;
                }
            }
            debug!("Inbound forwarding stopped");
        })
    }
}

pub struct Session {
    dispatcher: MessageDispatcher,
    watcher: ConnectivityWatcher,
    online: BTreeSet<String>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Session {
    pub fn new(dispatcher: MessageDispatcher, watcher: ConnectivityWatcher) -> (Self, SessionHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let session = Self {
            dispatcher,
            watcher,
            online: BTreeSet::new(),
            events,
        };
        (session, SessionHandle { tx })
    }

    /// Bring keys up, then process events until shutdown or until every
    /// handle is dropped. Returns the dispatcher for inspection.
    pub async fn run(mut self) -> MessageDispatcher {
        self.start().await;

        while let Some(event) = self.events.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                info!("Session shutting down");
                break;
            }
            self.handle_event(event).await;
        }

        self.dispatcher
    }

    async fn start(&mut self) {
        let readiness = match self.dispatcher.initialize() {
            Ok(readiness) => readiness,
            Err(e) => {
                error!(error = %e, "Key store unavailable, continuing without encryption");
                return;
            }
        };

        // Existing keys are republished; fresh keys are published by setup.
        let result = match readiness {
            KeyReadiness::Ready => self
                .dispatcher
                .announce_own_key()
                .await
                .map(|_| ())
                .map_err(DispatchError::from),
            _ => self.dispatcher.setup_keys().await,
        };
        if let Err(e) = result {
            warn!(
                error = %e,
                readiness = %self.dispatcher.readiness(),
                "Key publication failed at startup"
            );
        }

        info!(
            identity = %self.dispatcher.identity(),
            readiness = %self.dispatcher.readiness(),
            "Session started"
        );
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Inbound(event) => self.handle_inbound(event).await,
            SessionEvent::Send {
                body,
                recipient,
                reply,
            } => {
                let result = self.dispatcher.send(&body, recipient.as_deref()).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Send failed");
                }
                let _ = reply.send(result);
            }
            SessionEvent::ClearKeys { reply } => {
                let result = self.dispatcher.clear_keys().map_err(DispatchError::from);
                let _ = reply.send(result);
            }
            SessionEvent::ResetKeys { reply } => {
                let result = self.dispatcher.reset_keys().await;
                let _ = reply.send(result);
            }
            SessionEvent::Forget { username } => {
                self.dispatcher.directory().invalidate(&username);
            }
            SessionEvent::RequestPeers => {
                if let Err(e) = self.dispatcher.request_peers().await {
                    warn!(error = %e, "Failed to request peer info");
                }
            }
            SessionEvent::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionEvent::Shutdown => {}
        }
    }

    async fn handle_inbound(&mut self, event: WsEvent) {
        match event {
            WsEvent::ReceiveMessage { .. } | WsEvent::ReceiveDirectMessage { .. } => {
                if let Some(envelope) = Envelope::from_event(&event) {
                    self.dispatcher.receive(envelope);
                }
            }
            WsEvent::PeerConnected { peer_id } => {
                let key = self.dispatcher.announceable_key();
                self.watcher.on_peer_connected(&peer_id, key.as_deref()).await;
            }
            WsEvent::PeerDisconnected { peer_id } => {
                self.watcher.on_peer_disconnected(&peer_id);
            }
            WsEvent::P2pInfo {
                node_info,
                known_peers,
                ..
            } => {
                debug!(node = %node_info.peer_id, "Received peer info");
                let key = self.dispatcher.announceable_key();
                self.watcher.on_p2p_info(&known_peers, key.as_deref()).await;
            }
            WsEvent::UserJoined { username } => {
                self.online.insert(normalize_username(&username));
            }
            WsEvent::UserLeft { username } => {
                self.online.remove(&normalize_username(&username));
            }
            WsEvent::OnlineUsers { usernames } => {
                self.online = usernames.iter().map(|u| normalize_username(u)).collect();
                if let Err(e) = self.dispatcher.directory().prefetch(&usernames).await {
                    debug!(error = %e, "Key prefetch failed");
                }
            }
            WsEvent::KeyAnnounce { username, public_key } => {
                // Announcements are unauthenticated; only drop the cached key.
                debug!(
                    username = %username,
                    fingerprint = %fingerprint(&public_key),
                    "Key announced, invalidating cached key"
                );
                self.dispatcher.directory().invalidate(&username);
            }
            WsEvent::Error { message } => {
                warn!(message = %message, "Relay reported an error");
            }
            other => {
                debug!(event = other.name(), "Ignoring outbound-only event from relay");
            }
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            identity: self.dispatcher.identity().to_string(),
            readiness: self.dispatcher.readiness(),
            fingerprint: self.dispatcher.announceable_key().map(|k| fingerprint(&k)),
            online: self.online.iter().cloned().collect(),
            peers: self.watcher.peers().map(String::from).collect(),
            cached_keys: self.dispatcher.directory().cache().len(),
            messages: self.dispatcher.log().len(),
        }
    }
}
