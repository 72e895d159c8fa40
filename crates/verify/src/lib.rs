//! Policy state loading (C6/C9), the verifier state machine (C6), the VSA
//! generator (C10), and the persistent entry cache (C11).

pub mod cache;
pub mod context;
pub mod delegation;
pub mod error;
pub mod policy_state;
pub mod signing;
pub mod staging;
pub mod verifier;
pub mod vsa;

pub use cache::{CachedEntry, EntryCache};
pub use context::{CancellationToken, VerificationContext};
pub use delegation::{resolve_chain, ResolvedLevel};
pub use error::VerifyError;
pub use policy_state::{PolicyState, PolicyStateLoader};
pub use signing::{
    verify_commit_signature, verify_tag_signature, verify_target_signature, write_signed_commit,
};
pub use staging::{PolicyStaging, POLICY_STAGING_REF};
pub use verifier::{VerificationOutcome, Verifier};
pub use vsa::VsaGenerator;
