//! Reference State Log (C7): an append-only, hash-linked sequence of
//! commits on `refs/gittuf/reference-state-log`, each entry recording a new
//! value for some other reference, or annotating (optionally skipping)
//! earlier entries (spec §3.5, §4.6).

pub mod cursor;
pub mod entry;
pub mod error;
pub mod grammar;
pub mod log;

pub use cursor::RslCursor;
pub use entry::{AnnotationEntry, Entry, EntryBody, PropagationInfo, ReferenceEntry};
pub use error::RslError;
pub use log::{Rsl, ATTESTATIONS_REF, RSL_REF};
