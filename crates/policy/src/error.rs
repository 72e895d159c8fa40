use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("metadata expired at {expires}")]
    ExpiredMetadata { expires: String },
    #[error("{role} requires {needed} distinct signers, root document provides {got}")]
    ThresholdNotMet {
        role: String,
        needed: usize,
        got: usize,
    },
    #[error("principal {0} referenced but not declared")]
    UnknownPrincipal(String),
    #[error("delegation graph contains a cycle at role {0}")]
    CyclicDelegation(String),
    #[error("root document must declare a '{0}' role")]
    MissingReservedRole(&'static str),
    #[error(transparent)]
    Envelope(#[from] gittuf_crypto::envelope::EnvelopeError),
    #[error(transparent)]
    Canonical(#[from] gittuf_canonical::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
