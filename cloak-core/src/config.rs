//! Client configuration from the environment (and an optional `.env` file).

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::directory::DEFAULT_DIRECTORY_URL;
use crate::error::{ConfigError, StorageError};
use crate::utils::validate_username;
use crate::vault::{KeyStore, KeyringStore, MemoryStore, SqliteStore};
use crate::websocket::TransportOptions;

pub const ENV_USERNAME: &str = "CLOAK_USERNAME";
pub const ENV_SERVER_URL: &str = "CLOAK_SERVER_URL";
pub const ENV_DIRECTORY_URL: &str = "CLOAK_DIRECTORY_URL";
pub const ENV_AUTH_TOKEN: &str = "CLOAK_AUTH_TOKEN";
pub const ENV_KEY_STORE: &str = "CLOAK_KEY_STORE";
pub const ENV_RECONNECT_ATTEMPTS: &str = "CLOAK_RECONNECT_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "CLOAK_RECONNECT_DELAY_MS";
pub const ENV_LOG_DIR: &str = "CLOAK_LOG_DIR";

/// Where the identity key pair is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreBackend {
    Keyring,
    Memory,
    Sqlite(PathBuf),
}

impl FromStr for KeyStoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "keyring" => Ok(KeyStoreBackend::Keyring),
            "memory" => Ok(KeyStoreBackend::Memory),
            _ => match s.strip_prefix("sqlite:") {
                Some(path) if !path.is_empty() => Ok(KeyStoreBackend::Sqlite(PathBuf::from(path))),
                _ => Err(ConfigError::Invalid {
                    key: ENV_KEY_STORE,
                    reason: format!("expected keyring, memory or sqlite:<path>, got {:?}", s),
                }),
            },
        }
    }
}

impl KeyStoreBackend {
    pub fn open(&self) -> Result<Arc<dyn KeyStore>, StorageError> {
        Ok(match self {
            KeyStoreBackend::Keyring => Arc::new(KeyringStore::new()),
            KeyStoreBackend::Memory => Arc::new(MemoryStore::new()),
            KeyStoreBackend::Sqlite(path) => Arc::new(SqliteStore::open(path)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub username: String,
    pub server_url: String,
    pub directory_url: String,
    pub auth_token: Option<String>,
    pub key_store: KeyStoreBackend,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub log_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Load `.env` if present, then read the process environment
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(ConfigError::Invalid {
                    key: ".env",
                    reason: e.to_string(),
                })
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let username = get(ENV_USERNAME).ok_or(ConfigError::Missing(ENV_USERNAME))?;
        let username = validate_username(&username).map_err(|reason| ConfigError::Invalid {
            key: ENV_USERNAME,
            reason,
        })?;

        let defaults = TransportOptions::default();

        let server_url = get(ENV_SERVER_URL)
            .or_else(|| option_env!("CLOAK_SERVER_URL").map(String::from))
            .unwrap_or(defaults.server_url);
        check_url(ENV_SERVER_URL, &server_url, &["ws", "wss"])?;

        let directory_url =
            get(ENV_DIRECTORY_URL).unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string());
        check_url(ENV_DIRECTORY_URL, &directory_url, &["http", "https"])?;

        let key_store = match get(ENV_KEY_STORE) {
            Some(value) => value.parse()?,
            None => KeyStoreBackend::Keyring,
        };

        let reconnect_attempts = match get(ENV_RECONNECT_ATTEMPTS) {
            Some(value) => parse_number::<u32>(ENV_RECONNECT_ATTEMPTS, &value)?,
            None => defaults.max_reconnect_attempts,
        };

        let reconnect_delay = match get(ENV_RECONNECT_DELAY_MS) {
            Some(value) => Duration::from_millis(parse_number::<u64>(ENV_RECONNECT_DELAY_MS, &value)?),
            None => defaults.reconnect_delay,
        };

        Ok(Self {
            username,
            server_url,
            directory_url,
            auth_token: get(ENV_AUTH_TOKEN),
            key_store,
            reconnect_attempts,
            reconnect_delay,
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
        })
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            server_url: self.server_url.clone(),
            max_reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

fn check_url(key: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(())
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
