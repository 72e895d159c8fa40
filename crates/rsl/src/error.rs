use thiserror::Error;

use gittuf_store::Oid;

use crate::grammar::GrammarError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RslError {
    #[error(transparent)]
    Store(#[from] gittuf_store::StoreError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error("RSL entry {0} is missing its commit message body")]
    EmptyBody(Oid),
    #[error(
        "RSL entry {entry} has number {got}, expected {expected} (parent {parent})"
    )]
    NonMonotonic {
        entry: Oid,
        parent: Oid,
        expected: u64,
        got: u64,
    },
    #[error("reference {0} was updated concurrently, retry the record")]
    StaleRef(String),
    #[error("no RSL entry exists for reference {0}")]
    NoEntryForRef(String),
}
