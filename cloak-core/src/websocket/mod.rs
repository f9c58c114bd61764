mod client;
mod messages;

pub use client::{TransportOptions, WebSocketTransport};
pub use messages::{KnownPeer, NodeInfo, WsEvent};

use async_trait::async_trait;

use crate::error::TransportError;

/// Outbound half of the real-time channel.
///
/// Inbound events are delivered separately (see [`WebSocketTransport::connect`])
/// so the dispatcher never holds a connection handle.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn emit(&self, event: WsEvent) -> Result<(), TransportError>;
}
