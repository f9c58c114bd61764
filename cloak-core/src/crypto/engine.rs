use super::types::{EncryptedPayload, KeyFamily, KeyPair, PayloadVersion};
use super::{hybrid, sealed, MessageCipher};
use crate::error::{DecryptionError, EncryptionError};
use rand::rngs::OsRng;
use rand::RngCore;

/// Versioned encrypt/decrypt over opaque text-encoded keys.
///
/// Holds no key material and no mutable state, so one engine can be shared
/// freely between concurrent sends and receives.
#[derive(Debug, Clone)]
pub struct CipherEngine {
   version: PayloadVersion,
   rsa_modulus_bits: usize,
}

impl Default for CipherEngine {
   fn default() -> Self {
      Self::new()
   }
}

impl CipherEngine {
   /// Engine emitting the current (v2) payload format
   pub fn new() -> Self {
      Self::with_version(PayloadVersion::V2)
   }

   /// Engine emitting `version` for new payloads. Decryption accepts every version regardless.
   pub fn with_version(version: PayloadVersion) -> Self {
      Self {
         version,
         rsa_modulus_bits: hybrid::DEFAULT_MODULUS_BITS,
      }
   }

   /// Override the RSA modulus used when generating v1 key pairs
   pub fn with_rsa_modulus_bits(mut self, bits: usize) -> Self {
      self.rsa_modulus_bits = bits;
      self
   }

   pub fn current_version(&self) -> PayloadVersion {
      self.version
   }

   /// Generate a key pair for the family the current version seals for
   pub fn generate_key_pair(&self) -> Result<KeyPair, EncryptionError> {
      match self.version.family() {
         KeyFamily::X25519 => Ok(sealed::generate_key_pair()),
         KeyFamily::Rsa => hybrid::generate_key_pair(self.rsa_modulus_bits),
      }
   }

   /// Encrypt `plaintext` for `recipient_public_key` using the current version.
   /// Every call draws fresh ephemeral keys and nonces.
   pub fn encrypt(
      &self,
      plaintext: &str,
      recipient_public_key: &str,
   ) -> Result<EncryptedPayload, EncryptionError> {
      let rejected = || match family_of_public_key(recipient_public_key) {
         Some(found) if found != self.version.family() => EncryptionError::KeyFamilyMismatch {
            version: self.version.as_u8(),
            found: found.name(),
         },
         _ => EncryptionError::InvalidPublicKey,
      };

      match self.version {
         PayloadVersion::V2 => {
            let recipient = sealed::decode_key(recipient_public_key).ok_or_else(rejected)?;
            sealed::seal(plaintext.as_bytes(), &recipient).map(EncryptedPayload::Box)
         }
         PayloadVersion::V1 => {
            let recipient = hybrid::parse_public_key(recipient_public_key).ok_or_else(rejected)?;
            hybrid::seal(plaintext.as_bytes(), &recipient).map(EncryptedPayload::Hybrid)
         }
      }
   }

   /// Decrypt any payload version this engine has ever emitted
   pub fn decrypt(
      &self,
      payload: &EncryptedPayload,
      private_key: &str,
   ) -> Result<String, DecryptionError> {
      let version = payload.version();
      let rejected = || match family_of_private_key(private_key) {
         Some(found) if found != version.family() => DecryptionError::KeyFamilyMismatch {
            version: version.as_u8(),
            found: found.name(),
         },
         _ => DecryptionError::InvalidPrivateKey,
      };

      let plaintext = match payload {
         EncryptedPayload::Hybrid(body) => {
            let key = hybrid::parse_private_key(private_key).ok_or_else(rejected)?;
            hybrid::open(body, &key)?
         }
         EncryptedPayload::Box(body) => {
            let key = sealed::decode_key(private_key).ok_or_else(rejected)?;
            sealed::open(body, &key)?
         }
      };

      String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidUtf8)
   }

   /// Whether a secure random source is available on this platform
   pub fn is_supported(&self) -> bool {
      let mut probe = [0u8; 16];
      OsRng.try_fill_bytes(&mut probe).is_ok()
   }

   pub fn is_valid_public_key(&self, key: &str) -> bool {
      match self.version.family() {
         KeyFamily::X25519 => sealed::decode_key(key).is_some(),
         KeyFamily::Rsa => hybrid::parse_public_key(key).is_some(),
      }
   }

   pub fn is_valid_private_key(&self, key: &str) -> bool {
      match self.version.family() {
         KeyFamily::X25519 => sealed::decode_key(key).is_some(),
         KeyFamily::Rsa => hybrid::parse_private_key(key).is_some(),
      }
   }
}

impl MessageCipher for CipherEngine {
   fn generate_key_pair(&self) -> Result<KeyPair, EncryptionError> {
      CipherEngine::generate_key_pair(self)
   }

   fn encrypt(&self, plaintext: &str, recipient_public_key: &str) -> Result<EncryptedPayload, EncryptionError> {
      CipherEngine::encrypt(self, plaintext, recipient_public_key)
   }

   fn decrypt(&self, payload: &EncryptedPayload, private_key: &str) -> Result<String, DecryptionError> {
      CipherEngine::decrypt(self, payload, private_key)
   }

   fn is_valid_public_key(&self, key: &str) -> bool {
      CipherEngine::is_valid_public_key(self, key)
   }

   fn is_valid_private_key(&self, key: &str) -> bool {
      CipherEngine::is_valid_private_key(self, key)
   }
}

/// Classify a public key the way stored keys were migrated: PEM armour is RSA,
/// 32 raw bytes in base64 is X25519.
pub fn family_of_public_key(key: &str) -> Option<KeyFamily> {
   let key = key.trim();
   if key.starts_with(hybrid::PEM_ARMOUR) {
      Some(KeyFamily::Rsa)
   } else if sealed::decode_key(key).is_some() {
      Some(KeyFamily::X25519)
   } else {
      None
   }
}

pub fn family_of_private_key(key: &str) -> Option<KeyFamily> {
   family_of_public_key(key)
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::crypto::types::BoxPayload;
   use base64::{engine::general_purpose::STANDARD, Engine as _};
   use proptest::prelude::*;
   use std::sync::OnceLock;

   fn legacy_engine() -> CipherEngine {
      CipherEngine::with_version(PayloadVersion::V1).with_rsa_modulus_bits(1024)
   }

   /// RSA generation is the slow part; share one pair across the module
   fn legacy_pair() -> &'static KeyPair {
      static PAIR: OnceLock<KeyPair> = OnceLock::new();
      PAIR.get_or_init(|| legacy_engine().generate_key_pair().unwrap())
   }

   fn tamper(b64: &str) -> String {
      let mut bytes = STANDARD.decode(b64).unwrap();
      let last = bytes.len() - 1;
      bytes[last] ^= 0x01;
      STANDARD.encode(bytes)
   }

   #[test]
   fn test_v2_round_trip() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();

      let payload = engine.encrypt("hi", &bob.public_key).unwrap();
      assert_eq!(payload.version(), PayloadVersion::V2);
      assert_eq!(engine.decrypt(&payload, &bob.private_key).unwrap(), "hi");
   }

   #[test]
   fn test_v2_round_trip_through_wire_json() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();

      let json = engine.encrypt("über ✓ 🔒", &bob.public_key).unwrap().to_json();
      let decoded = EncryptedPayload::from_json(&json).unwrap();
      assert_eq!(engine.decrypt(&decoded, &bob.private_key).unwrap(), "über ✓ 🔒");
   }

   #[test]
   fn test_empty_message_round_trips() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();
      let payload = engine.encrypt("", &bob.public_key).unwrap();
      assert_eq!(engine.decrypt(&payload, &bob.private_key).unwrap(), "");
   }

   #[test]
   fn test_generated_keys_are_distinct() {
      let engine = CipherEngine::new();
      let a = engine.generate_key_pair().unwrap();
      let b = engine.generate_key_pair().unwrap();
      assert_ne!(a.public_key, b.public_key);
      assert_ne!(a.private_key, b.private_key);
      assert!(engine.is_valid_public_key(&a.public_key));
      assert!(engine.is_valid_private_key(&a.private_key));
   }

   #[test]
   fn test_each_encryption_uses_fresh_ephemeral_material() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();

      let first = engine.encrypt("same text", &bob.public_key).unwrap();
      let second = engine.encrypt("same text", &bob.public_key).unwrap();

      match (first, second) {
         (EncryptedPayload::Box(a), EncryptedPayload::Box(b)) => {
            assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
            assert_ne!(a.nonce, b.nonce);
            assert_ne!(a.ciphertext, b.ciphertext);
         }
         other => panic!("expected two v2 payloads, got {:?}", other),
      }
   }

   #[test]
   fn test_wrong_private_key_fails_authentication() {
      let engine = CipherEngine::new();
      let alice = engine.generate_key_pair().unwrap();
      let bob = engine.generate_key_pair().unwrap();

      let payload = engine.encrypt("for alice only", &alice.public_key).unwrap();
      assert_eq!(
         engine.decrypt(&payload, &bob.private_key).unwrap_err(),
         DecryptionError::Authentication
      );
   }

   #[test]
   fn test_tampered_ciphertext_fails_authentication() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();

      let EncryptedPayload::Box(body) = engine.encrypt("pay 10", &bob.public_key).unwrap() else {
         panic!("expected v2 payload");
      };
      let tampered = EncryptedPayload::Box(BoxPayload {
         ciphertext: tamper(&body.ciphertext),
         ..body
      });

      assert_eq!(
         engine.decrypt(&tampered, &bob.private_key).unwrap_err(),
         DecryptionError::Authentication
      );
   }

   #[test]
   fn test_truncated_nonce_is_malformed() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();

      let EncryptedPayload::Box(body) = engine.encrypt("hi", &bob.public_key).unwrap() else {
         panic!("expected v2 payload");
      };
      let truncated = EncryptedPayload::Box(BoxPayload {
         nonce: STANDARD.encode([0u8; 12]),
         ..body
      });

      assert!(matches!(
         engine.decrypt(&truncated, &bob.private_key),
         Err(DecryptionError::Malformed(_))
      ));
   }

   #[test]
   fn test_garbage_private_key_rejected() {
      let engine = CipherEngine::new();
      let bob = engine.generate_key_pair().unwrap();
      let payload = engine.encrypt("hi", &bob.public_key).unwrap();

      assert_eq!(
         engine.decrypt(&payload, "not-a-key").unwrap_err(),
         DecryptionError::InvalidPrivateKey
      );
   }

   #[test]
   fn test_invalid_recipient_key_rejected_before_encrypting() {
      let engine = CipherEngine::new();
      let short = STANDARD.encode([7u8; 16]);

      assert!(!engine.is_valid_public_key(&short));
      assert_eq!(
         engine.encrypt("hi", &short).unwrap_err(),
         EncryptionError::InvalidPublicKey
      );
   }

   #[test]
   fn test_v1_round_trip() {
      let engine = legacy_engine();
      let bob = legacy_pair();

      let payload = engine.encrypt("legacy hello", &bob.public_key).unwrap();
      assert_eq!(payload.version(), PayloadVersion::V1);
      assert_eq!(engine.decrypt(&payload, &bob.private_key).unwrap(), "legacy hello");
   }

   #[test]
   fn test_current_engine_still_reads_v1() {
      let bob = legacy_pair();
      let json = legacy_engine().encrypt("from an old peer", &bob.public_key).unwrap().to_json();

      let payload = EncryptedPayload::from_json(&json).unwrap();
      assert_eq!(
         CipherEngine::new().decrypt(&payload, &bob.private_key).unwrap(),
         "from an old peer"
      );
   }

   #[test]
   fn test_v1_tampered_message_fails_authentication() {
      let engine = legacy_engine();
      let bob = legacy_pair();

      let EncryptedPayload::Hybrid(mut body) = engine.encrypt("wire 5", &bob.public_key).unwrap() else {
         panic!("expected v1 payload");
      };
      body.encrypted_message = tamper(&body.encrypted_message);

      assert_eq!(
         engine.decrypt(&EncryptedPayload::Hybrid(body), &bob.private_key).unwrap_err(),
         DecryptionError::Authentication
      );
   }

   #[test]
   fn test_v1_payload_with_x25519_key_is_family_mismatch() {
      let bob_rsa = legacy_pair();
      let bob_x = CipherEngine::new().generate_key_pair().unwrap();
      let payload = legacy_engine().encrypt("hi", &bob_rsa.public_key).unwrap();

      assert_eq!(
         CipherEngine::new().decrypt(&payload, &bob_x.private_key).unwrap_err(),
         DecryptionError::KeyFamilyMismatch { version: 1, found: "X25519" }
      );
   }

   #[test]
   fn test_v2_payload_with_rsa_key_is_family_mismatch() {
      let engine = CipherEngine::new();
      let bob_x = engine.generate_key_pair().unwrap();
      let payload = engine.encrypt("hi", &bob_x.public_key).unwrap();

      assert_eq!(
         engine.decrypt(&payload, &legacy_pair().private_key).unwrap_err(),
         DecryptionError::KeyFamilyMismatch { version: 2, found: "RSA" }
      );
   }

   #[test]
   fn test_v2_encrypt_to_rsa_key_is_family_mismatch() {
      let engine = CipherEngine::new();
      assert!(!engine.is_valid_public_key(&legacy_pair().public_key));
      assert_eq!(
         engine.encrypt("hi", &legacy_pair().public_key).unwrap_err(),
         EncryptionError::KeyFamilyMismatch { version: 2, found: "RSA" }
      );
   }

   #[test]
   fn test_validators_follow_current_version() {
      let legacy = legacy_engine();
      let current = CipherEngine::new();
      let x = current.generate_key_pair().unwrap();

      assert!(legacy.is_valid_public_key(&legacy_pair().public_key));
      assert!(legacy.is_valid_private_key(&legacy_pair().private_key));
      assert!(!legacy.is_valid_public_key(&x.public_key));
      assert!(current.is_valid_public_key(&x.public_key));
      assert!(!current.is_valid_private_key(&legacy_pair().private_key));
   }

   #[test]
   fn test_key_family_detection() {
      let x = CipherEngine::new().generate_key_pair().unwrap();
      assert_eq!(family_of_public_key(&x.public_key), Some(KeyFamily::X25519));
      assert_eq!(family_of_public_key(&legacy_pair().public_key), Some(KeyFamily::Rsa));
      assert_eq!(family_of_private_key(&legacy_pair().private_key), Some(KeyFamily::Rsa));
      assert_eq!(family_of_public_key("definitely not a key"), None);
   }

   #[test]
   fn test_engine_is_supported() {
      assert!(CipherEngine::new().is_supported());
   }

   proptest! {
      #![proptest_config(ProptestConfig::with_cases(32))]

      #[test]
      fn prop_v2_round_trip(plaintext in any::<String>()) {
         let engine = CipherEngine::new();
         let pair = engine.generate_key_pair().unwrap();
         let payload = engine.encrypt(&plaintext, &pair.public_key).unwrap();
         prop_assert_eq!(engine.decrypt(&payload, &pair.private_key).unwrap(), plaintext);
      }

      #[test]
      fn prop_foreign_key_never_decrypts(plaintext in any::<String>()) {
         let engine = CipherEngine::new();
         let a = engine.generate_key_pair().unwrap();
         let b = engine.generate_key_pair().unwrap();
         let payload = engine.encrypt(&plaintext, &a.public_key).unwrap();
         prop_assert_eq!(
            engine.decrypt(&payload, &b.private_key),
            Err(DecryptionError::Authentication)
         );
      }
   }
}
