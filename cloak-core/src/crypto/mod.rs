mod engine;
pub mod hybrid;
pub mod sealed;
mod types;

pub use engine::{family_of_private_key, family_of_public_key, CipherEngine};
pub use types::{BoxPayload, EncryptedPayload, HybridPayload, KeyFamily, KeyPair, PayloadVersion};

use crate::error::{DecryptionError, EncryptionError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// The cryptographic seam the dispatcher depends on.
///
/// [`CipherEngine`] is the production implementation; tests wrap it to count
/// invocations.
pub trait MessageCipher: Send + Sync {
    fn generate_key_pair(&self) -> Result<KeyPair, EncryptionError>;

    fn encrypt(&self, plaintext: &str, recipient_public_key: &str) -> Result<EncryptedPayload, EncryptionError>;

    fn decrypt(&self, payload: &EncryptedPayload, private_key: &str) -> Result<String, DecryptionError>;

    fn is_valid_public_key(&self, key: &str) -> bool;

    fn is_valid_private_key(&self, key: &str) -> bool;
}

/// Short, log-safe identifier for a public key: first 8 bytes of its SHA-256, hex
pub fn fingerprint(public_key: &str) -> String {
    let digest = Sha256::digest(public_key.trim().as_bytes());
    hex::encode(&digest[..8])
}

pub(crate) fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, DecryptionError> {
    STANDARD
        .decode(value)
        .map_err(|e| DecryptionError::Malformed(format!("{} is not valid base64: {}", field, e)))
}
