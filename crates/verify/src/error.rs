use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    #[error(transparent)]
    Store(#[from] gittuf_store::StoreError),
    #[error(transparent)]
    Rsl(#[from] gittuf_rsl::RslError),
    #[error(transparent)]
    Attestation(#[from] gittuf_attestations::AttestationError),
    #[error(transparent)]
    Policy(#[from] gittuf_policy::Error),
    #[error(transparent)]
    Envelope(#[from] gittuf_crypto::envelope::EnvelopeError),
    #[error(transparent)]
    Canonical(#[from] gittuf_canonical::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no policy recorded at refs/gittuf/policy")]
    NoPolicy,
    #[error("delegated targets file '{0}' is referenced but was not found in the policy tree")]
    MissingTargetsFile(String),
    #[error("no RSL entry recorded for reference {0}")]
    NoEntryForRef(String),
    #[error("commit {0} carries no gittuf-sig signature")]
    UnsignedCommit(gittuf_store::Oid),
    #[error(
        "reference {reference} requires {needed} distinct approvals at delegation '{delegation}', got {got}"
    )]
    ThresholdNotMet {
        reference: String,
        delegation: String,
        needed: usize,
        got: usize,
    },
    #[error("global rule '{0}' rejected this change: non-fast-forward update to a protected reference")]
    ForcePushBlocked(String),
    #[error("global rule '{rule}' requires {needed} distinct signers, got {got}")]
    GlobalThresholdNotMet {
        rule: String,
        needed: usize,
        got: usize,
    },
    #[error("verification cancelled")]
    Cancelled,
    #[error("concurrent writer raced the compare-and-swap update on {0}")]
    StaleRef(String),
}
