use std::fmt;

use serde::Serialize;

/// Whether the local identity can take part in encrypted messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyReadiness {
    /// Vault not consulted yet
    Loading,
    /// A usable key pair is stored and has been published
    Ready,
    /// No usable key pair; key setup is required
    NotSetup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessEvent {
    KeysFound,
    KeysAbsent,
    SetupCompleted,
    Cleared,
}

impl KeyReadiness {
    /// Next state for `event`, or `None` if the transition is not allowed
    pub fn next(self, event: ReadinessEvent) -> Option<KeyReadiness> {
        use KeyReadiness::*;
        use ReadinessEvent::*;

        match (self, event) {
            (Loading, KeysFound) => Some(Ready),
            (Loading, KeysAbsent) => Some(NotSetup),
            (NotSetup, SetupCompleted) => Some(Ready),
            (_, Cleared) => Some(NotSetup),
            _ => None,
        }
    }

    pub fn is_ready(self) -> bool {
        self == KeyReadiness::Ready
    }
}

impl fmt::Display for KeyReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KeyReadiness::Loading => "loading",
            KeyReadiness::Ready => "ready",
            KeyReadiness::NotSetup => "not set up",
        };
        f.write_str(label)
    }
}
