use serde::{Deserialize, Serialize};

/// Every envelope exchanged with the relay, tagged by its `event` name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum WsEvent {
    #[serde(rename = "join")]
    Join { username: String },
    #[serde(rename = "leave")]
    Leave { username: String },
    #[serde(rename = "send_message")]
    SendMessage {
        username: String,
        message: String,
        encrypted: bool,
        #[serde(rename = "isDM", default)]
        is_dm: bool,
        timestamp: String,
    },
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        username: String,
        message: String,
        #[serde(default)]
        encrypted: bool,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_peer: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    #[serde(rename = "send_direct_message")]
    SendDirectMessage {
        username: String,
        recipient: String,
        message: String,
        encrypted: bool,
        timestamp: String,
    },
    #[serde(rename = "receive_direct_message")]
    ReceiveDirectMessage {
        username: String,
        recipient: String,
        message: String,
        #[serde(default)]
        encrypted: bool,
        #[serde(default)]
        timestamp: Option<String>,
    },
    #[serde(rename = "peer_connected")]
    PeerConnected { peer_id: String },
    #[serde(rename = "peer_disconnected")]
    PeerDisconnected { peer_id: String },
    #[serde(rename = "get_p2p_info")]
    GetP2pInfo,
    #[serde(rename = "p2p_info")]
    P2pInfo {
        #[serde(default)]
        node_info: NodeInfo,
        #[serde(default)]
        peer_count: usize,
        #[serde(default)]
        known_peers: Vec<KnownPeer>,
    },
    #[serde(rename = "user_joined")]
    UserJoined { username: String },
    #[serde(rename = "user_left")]
    UserLeft { username: String },
    #[serde(rename = "online_users")]
    OnlineUsers {
        #[serde(alias = "username", default)]
        usernames: Vec<String>,
    },
    #[serde(rename = "key_announce")]
    KeyAnnounce { username: String, public_key: String },
    #[serde(rename = "error")]
    Error { message: String },
}

impl WsEvent {
    /// Wire name of the event, for logging
    pub fn name(&self) -> &'static str {
        match self {
            WsEvent::Join { .. } => "join",
            WsEvent::Leave { .. } => "leave",
            WsEvent::SendMessage { .. } => "send_message",
            WsEvent::ReceiveMessage { .. } => "receive_message",
            WsEvent::SendDirectMessage { .. } => "send_direct_message",
            WsEvent::ReceiveDirectMessage { .. } => "receive_direct_message",
            WsEvent::PeerConnected { .. } => "peer_connected",
            WsEvent::PeerDisconnected { .. } => "peer_disconnected",
            WsEvent::GetP2pInfo => "get_p2p_info",
            WsEvent::P2pInfo { .. } => "p2p_info",
            WsEvent::UserJoined { .. } => "user_joined",
            WsEvent::UserLeft { .. } => "user_left",
            WsEvent::OnlineUsers { .. } => "online_users",
            WsEvent::KeyAnnounce { .. } => "key_announce",
            WsEvent::Error { .. } => "error",
        }
    }
}

/// The relay's own node identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub peer_id: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub full_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub peer_id: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}
