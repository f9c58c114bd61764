use super::messages::WsEvent;
use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:9001";

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// Connection settings for [`WebSocketTransport`]
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub server_url: String,
    /// Consecutive failed connection attempts tolerated before giving up
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
        }
    }
}

/// WebSocket connection to the relay.
///
/// `connect` spawns a task that owns the socket, re-joins after every
/// reconnect and forwards decoded events to the returned receiver. The
/// receiver closes once the task stops for good.
pub struct WebSocketTransport {
    options: TransportOptions,
    write_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<TokioMutex<bool>>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketTransport {
    pub fn new(options: TransportOptions) -> Self {
        info!(url = %options.server_url, "Using relay URL");

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            options,
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(TokioMutex::new(false)),
            shutdown_tx,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.options.server_url
    }

    /// Check if connected to the relay
    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    /// Connect to the relay as `username` and start receiving events
    pub fn connect(&self, username: &str) -> mpsc::UnboundedReceiver<WsEvent> {
        let options = self.options.clone();
        let username = username.to_string();
        let write_tx = self.write_tx.clone();
        let connected = self.connected.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut failures: u32 = 0;

            loop {
                // Check for shutdown before attempting connection
                if shutdown_rx.try_recv().is_ok() {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }

                info!(url = %options.server_url, "Connecting to relay");

                match connect_async(options.server_url.as_str()).await {
                    Ok((ws_stream, _)) => {
                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        let join = match encode(&WsEvent::Join {
                            username: username.clone(),
                        }) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(error = %e, "Failed to encode join");
                                break;
                            }
                        };

                        if ws_write.send(Message::Text(join)).await.is_err() {
                            failures += 1;
                            error!(attempt = failures, "Failed to send join");
                            if failures >= options.max_reconnect_attempts {
                                error!("Giving up on relay connection");
                                break;
                            }
                            tokio::time::sleep(options.reconnect_delay).await;
                            continue;
                        }

                        failures = 0;
                        *connected.lock().await = true;
                        info!(username = %username, "Joined relay");

                        // Create channel for outgoing messages
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        if let Ok(mut guard) = write_tx.lock() {
                            *guard = Some(tx);
                        }

                        // Message loop
                        let mut should_reconnect = true;
                        loop {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Shutdown signal received, closing connection gracefully");
                                    leave(&mut ws_write, &username).await;
                                    should_reconnect = false;
                                    break;
                                }
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(Message::Text(data)).await.is_err() {
                                                error!("Failed to send message to relay");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            info!("Close requested, leaving relay");
                                            leave(&mut ws_write, &username).await;
                                            should_reconnect = false;
                                            break;
                                        }
                                    }
                                }
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            match serde_json::from_str::<WsEvent>(&text) {
                                                Ok(event) => {
                                                    debug!(event = event.name(), "Received from relay");
                                                    if inbound_tx.send(event).is_err() {
                                                        info!("Inbound receiver dropped, leaving relay");
                                                        leave(&mut ws_write, &username).await;
                                                        should_reconnect = false;
                                                        break;
                                                    }
                                                }
                                                Err(e) => {
                                                    warn!(error = %e, "Ignoring unrecognised relay frame");
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => {
                                            info!("Relay closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "WebSocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        // Cleanup
                        if let Ok(mut guard) = write_tx.lock() {
                            *guard = None;
                        }
                        *connected.lock().await = false;
                        info!("Disconnected from relay");

                        if !should_reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        error!(
                            error = %e,
                            url = %options.server_url,
                            attempt = failures,
                            max_attempts = options.max_reconnect_attempts,
                            "Failed to connect to relay"
                        );
                        if failures >= options.max_reconnect_attempts {
                            error!("Giving up on relay connection");
                            break;
                        }
                    }
                }

                debug!(delay_ms = options.reconnect_delay.as_millis() as u64, "Reconnecting");
                tokio::time::sleep(options.reconnect_delay).await;
            }
            // inbound_tx drops here, closing the receiver
        });

        inbound_rx
    }

    /// Leave the relay and stop reconnecting
    pub fn disconnect(&self) {
        info!("Initiating graceful disconnect");
        let _ = self.shutdown_tx.send(());
        if let Ok(guard) = self.write_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(WriteMessage::Close);
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn emit(&self, event: WsEvent) -> Result<(), TransportError> {
        let json = encode(&event)?;
        debug!(event = event.name(), "Sending to relay");

        let guard = self
            .write_tx
            .lock()
            .map_err(|e| TransportError::Send(format!("Lock poisoned: {}", e)))?;

        match guard.as_ref() {
            Some(tx) => tx
                .send(WriteMessage::Data(json))
                .map_err(|e| TransportError::Send(e.to_string())),
            None => {
                warn!(event = event.name(), "Cannot send: not connected to relay");
                Err(TransportError::NotConnected)
            }
        }
    }
}

fn encode(event: &WsEvent) -> Result<String, TransportError> {
    serde_json::to_string(event).map_err(|e| TransportError::Encode(e.to_string()))
}

async fn leave<S>(sink: &mut S, username: &str)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    if let Ok(json) = encode(&WsEvent::Leave {
        username: username.to_string(),
    }) {
        if let Err(e) = sink.send(Message::Text(json)).await {
            warn!(error = %e, "Failed to send leave");
        }
    }
    if let Err(e) = sink.send(Message::Close(None)).await {
        warn!(error = %e, "Failed to send close frame");
    }
}
