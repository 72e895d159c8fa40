//! Signature envelope (C2): a signed JSON envelope wrapping an arbitrary
//! payload (in practice, an in-toto statement or a canonical-JSON trust
//! metadata document), verified via the DSSE pre-authentication encoding.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Key;
use crate::principal::Principal;
use crate::signer::Signer;

/// One signature attached to an [`Envelope`]: the raw signature bytes plus
/// the key ID that produced it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub key_id: String,
    #[serde(with = "hex_bytes")]
    pub sig: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// A signed envelope: a typed payload plus zero or more [`Signature`]s over
/// its pre-authentication encoding (PAE).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload_type: String,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    #[error("signature {key_id} is malformed: {source}")]
    BadSignature {
        key_id: String,
        #[source]
        source: crate::key::KeyError,
    },
    #[error("threshold not met: needed {needed} distinct valid signers, got {got}")]
    ThresholdNotMet { needed: usize, got: usize },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Envelope {
    /// `"DSSEv1 " || len(type) || " " || type || " " || len(body) || " " || body`
    pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(payload.len() + payload_type.len() + 32);
        buf.extend_from_slice(b"DSSEv1 ");
        buf.extend_from_slice(payload_type.len().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(payload_type.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(payload.len().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(payload);
        buf
    }

    pub fn new(payload_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            payload_type: payload_type.into(),
            payload,
            signatures: Vec::new(),
        }
    }

    /// Sign the envelope's PAE with `signer`, appending the resulting
    /// [`Signature`].
    pub fn sign(&mut self, signer: &impl Signer) -> Result<(), crate::signer::SignError> {
        let pae = Self::pae(&self.payload_type, &self.payload);
        let sig = signer.sign(&pae)?;
        self.signatures.push(Signature {
            key_id: signer.key_id(),
            sig,
        });
        Ok(())
    }

    /// Accept the envelope iff at least `threshold` *distinct* principals
    /// drawn from `acceptable` each produced a valid signature over the PAE.
    /// A malformed signature is skipped rather than treated as fatal,
    /// mirroring spec §7 (`BadSignature` is local; the caller decides
    /// whether the overall threshold is still met).
    pub fn verify_threshold(
        &self,
        acceptable: &[Principal],
        threshold: usize,
    ) -> Result<BTreeSet<String>, EnvelopeError> {
        let pae = Self::pae(&self.payload_type, &self.payload);

        let mut valid_key_ids = BTreeSet::new();
        for sig in &self.signatures {
            if let Some(key) = find_key(acceptable, &sig.key_id) {
                if key.verify(&pae, &sig.sig).is_ok() {
                    valid_key_ids.insert(sig.key_id.clone());
                }
            }
        }

        let by_id: std::collections::BTreeMap<String, Principal> = acceptable
            .iter()
            .map(|p| (p.id().to_string(), p.clone()))
            .collect();
        let resolve = |id: &str| by_id.get(id).cloned();

        let satisfied: BTreeSet<String> = acceptable
            .iter()
            .filter(|p| p.is_satisfied(&valid_key_ids, &resolve))
            .map(|p| p.id().to_string())
            .collect();

        if satisfied.len() >= threshold {
            Ok(satisfied)
        } else {
            Err(EnvelopeError::ThresholdNotMet {
                needed: threshold,
                got: satisfied.len(),
            })
        }
    }
}

fn find_key<'a>(acceptable: &'a [Principal], key_id: &str) -> Option<&'a Key> {
    acceptable
        .iter()
        .flat_map(|p| p.keys())
        .find(|k| k.id() == key_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::InMemorySigner;

    #[test]
    fn round_trips_and_verifies() {
        let signer = InMemorySigner::generate();
        let mut env = Envelope::new("application/vnd.gittuf+json", b"payload".to_vec());
        env.sign(&signer).unwrap();

        let serialized = serde_json::to_string(&env).unwrap();
        let parsed: Envelope = serde_json::from_str(&serialized).unwrap();
        assert_eq!(env, parsed);

        let principals = vec![Principal::Key(signer.public_key())];
        parsed.verify_threshold(&principals, 1).unwrap();
    }

    #[test]
    fn threshold_not_met_with_insufficient_signers() {
        let s1 = InMemorySigner::generate();
        let s2 = InMemorySigner::generate();
        let mut env = Envelope::new("t", b"p".to_vec());
        env.sign(&s1).unwrap();

        let principals = vec![Principal::Key(s1.public_key()), Principal::Key(s2.public_key())];
        let err = env.verify_threshold(&principals, 2).unwrap_err();
        assert!(matches!(err, EnvelopeError::ThresholdNotMet { .. }));
    }

    #[test]
    fn rejects_tampered_payload() {
        let signer = InMemorySigner::generate();
        let mut env = Envelope::new("t", b"payload".to_vec());
        env.sign(&signer).unwrap();
        env.payload = b"tampered".to_vec();

        let principals = vec![Principal::Key(signer.public_key())];
        let err = env.verify_threshold(&principals, 1).unwrap_err();
        assert!(matches!(err, EnvelopeError::ThresholdNotMet { .. }));
    }
}
