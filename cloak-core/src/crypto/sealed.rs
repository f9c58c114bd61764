//! Current v2 payloads: NaCl box between a fresh ephemeral X25519 key and the
//! recipient's identity key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::{Aead, AeadCore};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as IdentityPublic, StaticSecret};

use super::decode_field;
use super::types::{BoxPayload, KeyPair};
use crate::error::{DecryptionError, EncryptionError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// Generate a new X25519 identity key pair
pub fn generate_key_pair() -> KeyPair {
    let private_key = StaticSecret::random_from_rng(OsRng);
    let public_key = IdentityPublic::from(&private_key);

    KeyPair {
        public_key: STANDARD.encode(public_key.as_bytes()),
        private_key: STANDARD.encode(private_key.to_bytes()),
    }
}

/// Decode a base64 X25519 key, `None` unless it is exactly 32 bytes
pub(crate) fn decode_key(key: &str) -> Option<[u8; KEY_LEN]> {
    STANDARD.decode(key.trim()).ok()?.try_into().ok()
}

pub(crate) fn seal(plaintext: &[u8], recipient: &[u8; KEY_LEN]) -> Result<BoxPayload, EncryptionError> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let nonce = SalsaBox::generate_nonce(&mut OsRng);

    let ciphertext = SalsaBox::new(&PublicKey::from(*recipient), &ephemeral)
        .encrypt(&nonce, plaintext)
        .map_err(|_| EncryptionError::Primitive("box encryption failed".to_string()))?;

    Ok(BoxPayload {
        ephemeral_public_key: STANDARD.encode(ephemeral.public_key().as_bytes()),
        nonce: STANDARD.encode(nonce.as_slice()),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

pub(crate) fn open(payload: &BoxPayload, private: &[u8; KEY_LEN]) -> Result<Vec<u8>, DecryptionError> {
    let ephemeral: [u8; KEY_LEN] = decode_field("ephemeralPublicKey", &payload.ephemeral_public_key)?
        .try_into()
        .map_err(|_| DecryptionError::Malformed("ephemeralPublicKey must be 32 bytes".to_string()))?;
    let nonce: [u8; NONCE_LEN] = decode_field("nonce", &payload.nonce)?
        .try_into()
        .map_err(|_| DecryptionError::Malformed("nonce must be 24 bytes".to_string()))?;
    let ciphertext = decode_field("ciphertext", &payload.ciphertext)?;

    SalsaBox::new(&PublicKey::from(ephemeral), &SecretKey::from(*private))
        .decrypt(GenericArray::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| DecryptionError::Authentication)
}
