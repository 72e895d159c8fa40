//! Principal & key model (C4) and signature envelope (C2).
//!
//! A [`Principal`] is the unified capability gittuf's trust metadata reasons
//! about: a bare key, a person (group of owned keys plus external
//! identities), or a team (threshold over member principal IDs). Signature
//! verification bottoms out at [`Key`]; [`Person`] and [`Team`] are resolved
//! against a set of principals by the caller (the policy state, in
//! `gittuf-policy`) since they may reference principals declared in a
//! different document.

pub mod envelope;
pub mod key;
pub mod principal;
pub mod signer;

pub use envelope::{Envelope, Signature};
pub use key::{Key, KeyType, Scheme};
pub use principal::{Person, Principal, Team};
pub use signer::{InMemorySigner, SignError, Signer, VerifyError};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed signature: {0}")]
    BadSignature(String),
    #[error("fewer than {needed} distinct valid signers, got {got}")]
    ThresholdNotMet { needed: usize, got: usize },
    #[error(transparent)]
    Canonical(#[from] gittuf_canonical::Error),
}
