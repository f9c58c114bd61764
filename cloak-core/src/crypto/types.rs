use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::DecryptionError;

/// Key pair for storage/transport, both halves as text-safe strings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Payload format versions this engine can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadVersion {
    /// RSA-OAEP key transport + AES-256-GCM
    V1,
    /// X25519 + XSalsa20-Poly1305 box
    V2,
}

impl PayloadVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            PayloadVersion::V1 => 1,
            PayloadVersion::V2 => 2,
        }
    }

    /// Key family a payload of this version is sealed for
    pub fn family(self) -> KeyFamily {
        match self {
            PayloadVersion::V1 => KeyFamily::Rsa,
            PayloadVersion::V2 => KeyFamily::X25519,
        }
    }
}

/// Asymmetric primitive a stored key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Rsa,
    X25519,
}

impl KeyFamily {
    pub fn name(self) -> &'static str {
        match self {
            KeyFamily::Rsa => "RSA",
            KeyFamily::X25519 => "X25519",
        }
    }
}

/// v1 wire body: `{encryptedKey, encryptedMessage, iv}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridPayload {
    pub encrypted_key: String,
    pub encrypted_message: String,
    pub iv: String,
}

/// v2 wire body: `{ephemeralPublicKey, nonce, ciphertext}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPayload {
    pub ephemeral_public_key: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Encrypted message structure, tagged on the wire by its numeric `version`.
///
/// The tag alone selects the decoder. A payload whose body does not match the
/// shape its tag promises is rejected as malformed rather than reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedPayload {
    Hybrid(HybridPayload),
    Box(BoxPayload),
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(flatten)]
    body: &'a T,
    version: u8,
}

impl EncryptedPayload {
    pub fn version(&self) -> PayloadVersion {
        match self {
            EncryptedPayload::Hybrid(_) => PayloadVersion::V1,
            EncryptedPayload::Box(_) => PayloadVersion::V2,
        }
    }

    /// Decode from an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, DecryptionError> {
        let version = value
            .get("version")
            .ok_or_else(|| DecryptionError::Malformed("missing version tag".to_string()))?
            .as_u64()
            .ok_or_else(|| {
                DecryptionError::Malformed("version tag is not an unsigned integer".to_string())
            })?;

        match version {
            1 => serde_json::from_value(value)
                .map(EncryptedPayload::Hybrid)
                .map_err(|e| DecryptionError::Malformed(format!("v1 payload: {}", e))),
            2 => serde_json::from_value(value)
                .map(EncryptedPayload::Box)
                .map_err(|e| DecryptionError::Malformed(format!("v2 payload: {}", e))),
            other => Err(DecryptionError::UnsupportedVersion(other)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DecryptionError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| DecryptionError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> String {
        // Plain string fields only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for EncryptedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let version = self.version().as_u8();
        match self {
            EncryptedPayload::Hybrid(body) => Tagged { body, version }.serialize(serializer),
            EncryptedPayload::Box(body) => Tagged { body, version }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EncryptedPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EncryptedPayload::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_box() -> EncryptedPayload {
        EncryptedPayload::Box(BoxPayload {
            ephemeral_public_key: "ZXBo".to_string(),
            nonce: "bm9uY2U=".to_string(),
            ciphertext: "Y3Q=".to_string(),
        })
    }

    #[test]
    fn test_box_wire_shape() {
        let value: Value = serde_json::from_str(&sample_box().to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "ephemeralPublicKey": "ZXBo",
                "nonce": "bm9uY2U=",
                "ciphertext": "Y3Q=",
                "version": 2
            })
        );
    }

    #[test]
    fn test_hybrid_wire_shape() {
        let payload = EncryptedPayload::Hybrid(HybridPayload {
            encrypted_key: "a2V5".to_string(),
            encrypted_message: "bXNn".to_string(),
            iv: "aXY=".to_string(),
        });
        let value: Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["encryptedKey"], "a2V5");
        assert_eq!(value["encryptedMessage"], "bXNn");
        assert_eq!(value["iv"], "aXY=");
    }

    #[test]
    fn test_version_tag_selects_decoder() {
        let decoded = EncryptedPayload::from_json(&sample_box().to_json()).unwrap();
        assert_eq!(decoded, sample_box());
        assert_eq!(decoded.version(), PayloadVersion::V2);
    }

    #[test]
    fn test_v1_body_with_v2_tag_is_malformed() {
        let json = json!({
            "encryptedKey": "a2V5",
            "encryptedMessage": "bXNn",
            "iv": "aXY=",
            "version": 2
        })
        .to_string();

        let err = EncryptedPayload::from_json(&json).unwrap_err();
        assert!(matches!(err, DecryptionError::Malformed(_)), "got {:?}", err);
    }

    #[test]
    fn test_v2_body_with_v1_tag_is_malformed() {
        let json = json!({
            "ephemeralPublicKey": "ZXBo",
            "nonce": "bm9uY2U=",
            "ciphertext": "Y3Q=",
            "version": 1
        })
        .to_string();

        let err = EncryptedPayload::from_json(&json).unwrap_err();
        assert!(matches!(err, DecryptionError::Malformed(_)), "got {:?}", err);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let json = json!({ "ciphertext": "Y3Q=", "version": 3 }).to_string();
        assert_eq!(
            EncryptedPayload::from_json(&json).unwrap_err(),
            DecryptionError::UnsupportedVersion(3)
        );
    }

    #[test]
    fn test_missing_or_non_numeric_version_rejected() {
        let untagged = json!({ "ephemeralPublicKey": "ZXBo", "nonce": "bm9uY2U=", "ciphertext": "Y3Q=" });
        assert!(matches!(
            EncryptedPayload::from_value(untagged),
            Err(DecryptionError::Malformed(_))
        ));

        let stringly = json!({ "ephemeralPublicKey": "ZXBo", "nonce": "bm9uY2U=", "ciphertext": "Y3Q=", "version": "2" });
        assert!(matches!(
            EncryptedPayload::from_value(stringly),
            Err(DecryptionError::Malformed(_))
        ));
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            EncryptedPayload::from_json("hello there"),
            Err(DecryptionError::Malformed(_))
        ));
    }

    #[test]
    fn test_key_pair_debug_redacts_private_half() {
        let pair = KeyPair {
            public_key: "pub".to_string(),
            private_key: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("pub"));
        assert!(!rendered.contains("super-secret"));
    }
}
