use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttestationError {
    #[error(transparent)]
    Store(#[from] gittuf_store::StoreError),
    #[error(transparent)]
    Canonical(#[from] gittuf_canonical::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("attestation at {path} does not match the requested (ref, fromID, targetID)")]
    InvalidAttestation { path: String },
    #[error("no attestation recorded for ref {ref_name}, from {from_id}, target {target_id}")]
    NotFound {
        ref_name: String,
        from_id: String,
        target_id: String,
    },
}
