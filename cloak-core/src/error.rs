//! Error types for the messaging core.
//!
//! Each collaborator owns one error enum. The dispatcher only ever returns
//! [`DispatchError`] from a send; receive-path failures are absorbed into the
//! message log and never surface as errors.

use thiserror::Error;

/// Local key store unavailable or holding unusable data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store refused the operation (keyring locked, disk error, ...)
    #[error("key store unavailable: {0}")]
    Backend(String),

    /// A value was found but cannot be used as key material
    #[error("key store holds corrupt data: {0}")]
    Corrupt(String),

    /// Only one half of the pair is present for this identity
    #[error("key pair for {owner} is incomplete ({missing} half missing)")]
    Incomplete { owner: String, missing: &'static str },
}

/// Remote key directory failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user {0} has not set up end-to-end encryption")]
    NoPublicKey(String),

    #[error("directory rejected credentials")]
    Unauthorized,

    #[error("directory rejected request: {0}")]
    Rejected(String),

    #[error("unexpected directory response (status {status}): {body}")]
    BadResponse { status: u16, body: String },

    #[error("directory returned an unusable key for {0}")]
    InvalidKey(String),
}

/// Failure to produce a ciphertext. Fatal to that one send only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("recipient public key is not valid key material")]
    InvalidPublicKey,

    #[error("payload version {version} cannot be produced with a {found} key")]
    KeyFamilyMismatch { version: u8, found: &'static str },

    #[error("secure random source failed: {0}")]
    Rng(String),

    #[error("cipher primitive failed: {0}")]
    Primitive(String),
}

/// Failure to recover plaintext from a payload.
///
/// Every variant is a hard failure: no partial plaintext is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u64),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("local private key is not valid key material")]
    InvalidPrivateKey,

    #[error("payload version {version} cannot be opened with a {found} key")]
    KeyFamilyMismatch { version: u8, found: &'static str },

    #[error("authentication failed - message may be tampered or not addressed to us")]
    Authentication,

    #[error("decrypted message is not valid UTF-8")]
    InvalidUtf8,
}

/// Real-time channel failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to relay")]
    NotConnected,

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("failed to send to relay: {0}")]
    Send(String),
}

/// Errors returned from a user-initiated send.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid message: {0}")]
    Validation(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("session has shut down")]
    SessionClosed,
}

/// Configuration could not be assembled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
