//! Peer connectivity tracking and key republication.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::directory::KeyDirectoryClient;
use crate::error::DirectoryError;
use crate::websocket::KnownPeer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepublishOutcome {
    Published,
    /// Local identity is not `Ready`; nothing was sent
    Skipped,
    /// No peer was newly observed
    AlreadyKnown,
    Failed(DirectoryError),
}

/// Watches relay peer events and republishes our public key whenever a peer
/// is seen for the first time, so peers that missed the first publish converge.
pub struct ConnectivityWatcher {
    directory: Arc<KeyDirectoryClient>,
    peers: BTreeSet<String>,
    republished: u64,
    failures: u64,
}

impl ConnectivityWatcher {
    pub fn new(directory: Arc<KeyDirectoryClient>) -> Self {
        Self {
            directory,
            peers: BTreeSet::new(),
            republished: 0,
            failures: 0,
        }
    }

    /// `own_public_key` is `Some` only while the local identity is `Ready`.
    /// A failed republish is logged and counted, never propagated.
    pub async fn on_peer_connected(
        &mut self,
        peer_id: &str,
        own_public_key: Option<&str>,
    ) -> RepublishOutcome {
        if !self.peers.insert(peer_id.to_string()) {
            debug!(peer_id = %peer_id, "Peer already known");
            return RepublishOutcome::AlreadyKnown;
        }
        info!(peer_id = %peer_id, peers = self.peers.len(), "Peer connected");

        self.republish(own_public_key).await
    }

    pub fn on_peer_disconnected(&mut self, peer_id: &str) {
        if self.peers.remove(peer_id) {
            info!(peer_id = %peer_id, peers = self.peers.len(), "Peer disconnected");
        }
    }

    /// Replace the peer set with the relay's view. Republishes once if the
    /// snapshot holds any peer not seen before.
    pub async fn on_p2p_info(
        &mut self,
        known_peers: &[KnownPeer],
        own_public_key: Option<&str>,
    ) -> RepublishOutcome {
        let snapshot: BTreeSet<String> = known_peers.iter().map(|p| p.peer_id.clone()).collect();
        let new_peers = snapshot.difference(&self.peers).count();
        self.peers = snapshot;
        debug!(peers = self.peers.len(), new_peers, "Peer list refreshed");

        if new_peers == 0 {
            return RepublishOutcome::AlreadyKnown;
        }
        self.republish(own_public_key).await
    }

    async fn republish(&mut self, own_public_key: Option<&str>) -> RepublishOutcome {
        let Some(key) = own_public_key else {
            debug!("Keys not ready, skipping republish");
            return RepublishOutcome::Skipped;
        };

        match self.directory.publish(key).await {
            Ok(_) => {
                self.republished += 1;
                RepublishOutcome::Published
            }
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, failures = self.failures, "Failed to republish public key");
                RepublishOutcome::Failed(e)
            }
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn republished(&self) -> u64 {
        self.republished
    }

    pub fn republish_failures(&self) -> u64 {
        self.failures
    }
}
