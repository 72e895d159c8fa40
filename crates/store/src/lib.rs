//! Object store adapter (C1): read/write blobs, trees, commits, tags;
//! resolve/update references; verify commit/tag signatures; the zero-id
//! sentinel.

pub mod oid;
pub mod repo;

pub use oid::{Oid, ZERO_OID};
pub use repo::{CommitObject, ObjectStore, SignaturePayload, StoreError, TagObject, UpdateOutcome};
