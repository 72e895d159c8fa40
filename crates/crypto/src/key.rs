use serde::{Deserialize, Serialize};
use thiserror::Error;

use gittuf_canonical::canonical_digest_hex;

/// The cryptographic family a [`Key`] belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Ed25519,
    Rsa,
    Gpg,
    /// No local public key material; signatures are checked against a
    /// transparency-log-backed keyless identity (eg. Sigstore/Fulcio).
    Keyless,
}

/// The signature scheme used to verify material of a [`KeyType`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Scheme {
    Ed25519,
    RsaPkcs1Sha256,
    GpgRsa,
    KeylessOidc,
}

/// The concrete public material backing a [`Key`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMaterial {
    PublicBytes(Vec<u8>),
    Certificate(Vec<u8>),
    Keyless { identity: String, issuer: String },
}

/// One public key, as it appears in a root-of-trust or targets document's
/// principal table.
///
/// `key_id` is recomputed, never trusted from the wire: a `Key` constructed
/// via [`Key::new`] always carries the canonical-JSON-derived ID of its own
/// public portion, so two `Key`s with equal public material always compare
/// equal and hash to the same ID, even if they arrived through different
/// documents.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Key {
    key_id: String,
    key_type: KeyType,
    scheme: Scheme,
    material: KeyMaterial,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    #[error("ed25519 public key must be 32 bytes, got {0}")]
    BadEd25519Length(usize),
    #[error("ed25519 signature must be 64 bytes, got {0}")]
    BadEd25519SignatureLength(usize),
    #[error("signature does not verify against this key")]
    InvalidSignature,
    #[error("key material does not support direct signature verification (keyless)")]
    NotDirectlyVerifiable,
    #[error(transparent)]
    Canonical(#[from] gittuf_canonical::Error),
}

/// The portion of a [`Key`] that `id()` is derived from: type, scheme and
/// public material, but not the ID itself (that would be circular).
#[derive(Serialize)]
struct PublicPortion<'a> {
    key_type: &'a KeyType,
    scheme: &'a Scheme,
    material: &'a KeyMaterial,
}

impl Key {
    pub fn new(key_type: KeyType, scheme: Scheme, material: KeyMaterial) -> Result<Self, KeyError> {
        let key_id = match &material {
            KeyMaterial::Keyless { identity, .. } => identity.clone(),
            _ => canonical_digest_hex(&PublicPortion {
                key_type: &key_type,
                scheme: &scheme,
                material: &material,
            })?,
        };
        Ok(Self {
            key_id,
            key_type,
            scheme,
            material,
        })
    }

    pub fn from_ed25519_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        Self::new(
            KeyType::Ed25519,
            Scheme::Ed25519,
            KeyMaterial::PublicBytes(bytes.to_vec()),
        )
    }

    pub fn id(&self) -> &str {
        &self.key_id
    }

    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Verify `signature` over `message` for keys whose material supports
    /// direct (non-transparency-log) verification.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match (&self.key_type, &self.material) {
            (KeyType::Ed25519, KeyMaterial::PublicBytes(bytes)) => {
                verify_ed25519(bytes, message, signature)
            },
            _ => Err(KeyError::NotDirectlyVerifiable),
        }
    }
}

fn verify_ed25519(public_bytes: &[u8], message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
    use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};

    let public_bytes: [u8; 32] = public_bytes
        .try_into()
        .map_err(|_| KeyError::BadEd25519Length(public_bytes.len()))?;
    let signature: [u8; 64] = signature
        .try_into()
        .map_err(|_| KeyError::BadEd25519SignatureLength(signature.len()))?;

    let verifying_key =
        VerifyingKey::from_bytes(&public_bytes).map_err(|_| KeyError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| KeyError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{InMemorySigner, Signer as _};

    #[test]
    fn equal_material_yields_equal_id() {
        let signer = InMemorySigner::generate();
        let k1 = signer.public_key();
        let k2 = Key::from_ed25519_bytes(signer.public_key_bytes()).unwrap();
        assert_eq!(k1.id(), k2.id());
        assert_eq!(k1, k2);
    }

    #[test]
    fn verifies_valid_signature() {
        let signer = InMemorySigner::generate();
        let msg = b"hello gittuf";
        let sig = signer.sign(msg);
        signer.public_key().verify(msg, &sig).unwrap();
    }

    #[test]
    fn rejects_tampered_message() {
        let signer = InMemorySigner::generate();
        let sig = signer.sign(b"hello gittuf");
        let err = signer.public_key().verify(b"hello gitTUF", &sig).unwrap_err();
        assert!(matches!(err, KeyError::InvalidSignature));
    }
}
