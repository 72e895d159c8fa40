//! Trust metadata (C5): root-of-trust document, delegated targets ("rule
//! file") documents, delegation graph, global rules, pattern semantics.
//!
//! This crate owns the *data model* and single-file invariants (spec §3.3,
//! §3.4, §4.4). Cross-file delegation resolution, which requires loading
//! child targets files from the object store, lives in `gittuf-verify`
//! (C6/C9) — see `gittuf_verify::policy_state`.

pub mod error;
pub mod global_rule;
pub mod pattern;
pub mod propagation;
pub mod role;
pub mod root;
pub mod targets;

pub use error::Error;
pub use global_rule::GlobalRule;
pub use pattern::{Pattern, Target};
pub use propagation::{FederatedRoot, Hook, HookStage, Propagation};
pub use role::Role;
pub use root::{GithubApp, Root, SchemaVersion};
pub use targets::{Delegation, Targets};
