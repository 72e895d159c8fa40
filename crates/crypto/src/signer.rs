//! The Signer/Verifier capability required of a collaborator (spec §6.4).
//!
//! Pluggable signer backends (hardware keys, hosted signing, OpenPGP
//! keyrings) are out of scope; this crate only specifies the interface and
//! ships one concrete, in-memory implementation so the verifier and record
//! paths can be exercised end to end in tests.

use thiserror::Error;

use crate::key::{Key, KeyError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Given bytes, returns signature bytes and a stable key-ID string.
pub trait Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignError>;

    /// The stable key-ID string for this signer's public key.
    fn key_id(&self) -> String {
        self.public_key().id().to_string()
    }

    fn public_key(&self) -> Key;
}

/// Given bytes, a signature and an expected key-ID, returns ok or error.
pub trait Verifier {
    fn verify(&self, message: &[u8], signature: &[u8], expected_key_id: &str) -> Result<(), VerifyError>;
}

impl Verifier for Key {
    fn verify(&self, message: &[u8], signature: &[u8], expected_key_id: &str) -> Result<(), VerifyError> {
        if self.id() != expected_key_id {
            return Err(VerifyError::Key(KeyError::InvalidSignature));
        }
        Key::verify(self, message, signature)?;
        Ok(())
    }
}

/// An in-memory ed25519 keypair, used by tests and by any caller that wants
/// to sign without delegating to an external signer backend.
pub struct InMemorySigner {
    signing_key: ed25519_dalek::SigningKey,
    public: Key,
}

impl InMemorySigner {
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
        let public = Key::from_ed25519_bytes(signing_key.verifying_key().to_bytes())
            .expect("ed25519 verifying key is always 32 bytes");
        Self { signing_key, public }
    }

    pub fn from_bytes(seed: [u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
        let public = Key::from_ed25519_bytes(signing_key.verifying_key().to_bytes())
            .expect("ed25519 verifying key is always 32 bytes");
        Self { signing_key, public }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Infallible convenience used by tests and examples; production callers
    /// should go through [`Signer::sign`].
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer as _;
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl Signer for InMemorySigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignError> {
        Ok(InMemorySigner::sign(self, message))
    }

    fn public_key(&self) -> Key {
        self.public.clone()
    }
}
