//! Legacy v1 payloads: RSA-OAEP(SHA-256) wrapping a per-message AES-256-GCM key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::decode_field;
use super::types::{HybridPayload, KeyPair};
use crate::error::{DecryptionError, EncryptionError};

pub const DEFAULT_MODULUS_BITS: usize = 2048;

const SESSION_KEY_LEN: usize = 32;
const IV_LEN: usize = 12;

pub(crate) const PEM_ARMOUR: &str = "-----BEGIN";

/// Generate an RSA key pair as PEM (SPKI public, PKCS#8 private)
pub fn generate_key_pair(modulus_bits: usize) -> Result<KeyPair, EncryptionError> {
    let private = RsaPrivateKey::new(&mut OsRng, modulus_bits)
        .map_err(|e| EncryptionError::Primitive(format!("RSA key generation failed: {}", e)))?;
    let public = RsaPublicKey::from(&private);

    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| EncryptionError::Primitive(e.to_string()))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| EncryptionError::Primitive(e.to_string()))?;

    Ok(KeyPair {
        public_key: public_pem,
        private_key: private_pem.as_str().to_owned(),
    })
}

pub(crate) fn parse_public_key(key: &str) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(key.trim()).ok()
}

pub(crate) fn parse_private_key(key: &str) -> Option<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(key.trim()).ok()
}

pub(crate) fn seal(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<HybridPayload, EncryptionError> {
    let mut session_key = [0u8; SESSION_KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut session_key)
        .and_then(|_| OsRng.try_fill_bytes(&mut iv))
        .map_err(|e| EncryptionError::Rng(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(&session_key)
        .map_err(|_| EncryptionError::Primitive("failed to create cipher".to_string()))?;
    let encrypted_message = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| EncryptionError::Primitive("AES-GCM encryption failed".to_string()))?;

    let encrypted_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &session_key)
        .map_err(|e| EncryptionError::Primitive(format!("RSA-OAEP wrap failed: {}", e)))?;

    Ok(HybridPayload {
        encrypted_key: STANDARD.encode(encrypted_key),
        encrypted_message: STANDARD.encode(encrypted_message),
        iv: STANDARD.encode(iv),
    })
}

pub(crate) fn open(payload: &HybridPayload, private: &RsaPrivateKey) -> Result<Vec<u8>, DecryptionError> {
    let encrypted_key = decode_field("encryptedKey", &payload.encrypted_key)?;
    let ciphertext = decode_field("encryptedMessage", &payload.encrypted_message)?;
    let iv = decode_field("iv", &payload.iv)?;
    if iv.len() != IV_LEN {
        return Err(DecryptionError::Malformed(format!(
            "iv must be {} bytes, got {}",
            IV_LEN,
            iv.len()
        )));
    }

    // An OAEP failure means the key was not wrapped for us; report it the
    // same way as a bad GCM tag.
    let session_key = private
        .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
        .map_err(|_| DecryptionError::Authentication)?;
    if session_key.len() != SESSION_KEY_LEN {
        return Err(DecryptionError::Authentication);
    }

    let cipher =
        Aes256Gcm::new_from_slice(&session_key).map_err(|_| DecryptionError::Authentication)?;
    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
        .map_err(|_| DecryptionError::Authentication)
}
