//! Content-addressed attestation storage under `refs/gittuf/attestations`
//! (spec §3.6): one tree, one blob per `(ref-name, fromID, targetID)` leaf,
//! each blob holding a serialized, signed [`Envelope`].

use tracing::instrument;

use gittuf_crypto::Envelope;
use gittuf_store::{ObjectStore, Oid, UpdateOutcome, ZERO_OID};

use crate::error::AttestationError;

pub const ATTESTATIONS_REF: &str = "refs/gittuf/attestations";

/// Which top-level subtree an attestation is filed under (spec §4.7): a
/// reference authorization and a code-review approval for the identical
/// `(ref, fromID, targetID)` triple are different attestations and must not
/// collide at the same tree path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttestationKind<'a> {
    ReferenceAuthorization,
    /// `system_id` identifies the external forge/system the review came
    /// from (e.g. `"github"`), since two systems may assign the same review
    /// ID independently.
    CodeReviewApproval { system_id: &'a str },
}

fn leaf_path(kind: &AttestationKind<'_>, ref_name: &str, from_id: &str, target_id: &str) -> String {
    match kind {
        AttestationKind::ReferenceAuthorization => {
            format!("reference-authorizations/{ref_name}/{from_id}-{target_id}")
        },
        AttestationKind::CodeReviewApproval { system_id } => {
            format!("code-review-approvals/{system_id}/{ref_name}/{from_id}-{target_id}")
        },
    }
}

/// Reads and writes attestation envelopes keyed by `(ref, fromID, targetID)`
/// on [`ATTESTATIONS_REF`].
pub struct AttestationsStore<'a> {
    store: &'a ObjectStore,
}

impl<'a> AttestationsStore<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    fn current_tree(&self) -> Result<Option<Oid>, AttestationError> {
        match self.store.resolve_ref(ATTESTATIONS_REF)? {
            Some(commit_id) => Ok(Some(self.store.read_commit(commit_id)?.tree)),
            None => Ok(None),
        }
    }

    /// Look up every attestation recorded for `(kind, ref_name, from_id,
    /// target_id)` (spec §4.7: "lookups ... return the set of envelopes"),
    /// verifying that each envelope's own predicate, once decoded, actually
    /// names the same triple (and, for a code-review approval, the same
    /// ref) the path encodes (spec §7: `InvalidAttestation`) before
    /// returning it.
    #[instrument(skip(self))]
    pub fn find(
        &self,
        kind: &AttestationKind<'_>,
        ref_name: &str,
        from_id: &str,
        target_id: &str,
    ) -> Result<Vec<Envelope>, AttestationError> {
        let Some(tree) = self.current_tree()? else {
            return Ok(Vec::new());
        };
        let path = leaf_path(kind, ref_name, from_id, target_id);
        let Some(bytes) = self.store.read_tree_path(tree, &path)? else {
            return Ok(Vec::new());
        };
        let envelopes: Vec<Envelope> = serde_json::from_slice(&bytes)?;

        for envelope in &envelopes {
            let statement = crate::statement::Statement::from_bytes(&envelope.payload)?;
            let matches = match kind {
                AttestationKind::ReferenceAuthorization => statement
                    .reference_authorization()
                    .map(|p| p.target_ref == ref_name && p.from_id == from_id && p.target_id == target_id)
                    .unwrap_or(false),
                AttestationKind::CodeReviewApproval { .. } => statement
                    .code_review_approval()
                    .map(|p| p.target_ref == ref_name && p.from_id == from_id && p.target_id == target_id)
                    .unwrap_or(false),
            };
            if !matches {
                return Err(AttestationError::InvalidAttestation { path });
            }
        }

        Ok(envelopes)
    }

    /// Record `envelope` at `(kind, ref_name, from_id, target_id)`, merging
    /// with any envelopes already filed at that path rather than
    /// overwriting them (spec §4.7: multiple independent approvers may
    /// attest to the same transition). Retrying CAS conflicts is the
    /// caller's responsibility (same concurrency model as
    /// `gittuf_rsl::Rsl::record`, spec §5).
    #[instrument(skip(self, envelope))]
    pub fn store(
        &self,
        kind: &AttestationKind<'_>,
        ref_name: &str,
        from_id: &str,
        target_id: &str,
        envelope: &Envelope,
        author: &str,
        email: &str,
    ) -> Result<Oid, AttestationError> {
        let path = leaf_path(kind, ref_name, from_id, target_id);

        let base_tree = self.current_tree()?;
        let expected_old = self
            .store
            .resolve_ref(ATTESTATIONS_REF)?
            .unwrap_or(ZERO_OID);

        let mut envelopes: Vec<Envelope> = match base_tree {
            Some(tree) => match self.store.read_tree_path(tree, &path)? {
                Some(existing) => serde_json::from_slice(&existing)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        envelopes.push(envelope.clone());
        let bytes = serde_json::to_vec(&envelopes)?;

        let new_tree = self
            .store
            .write_tree_update(base_tree, &[(path.as_str(), bytes.as_slice())])?;
        let parents: Vec<Oid> = if expected_old.is_zero() {
            Vec::new()
        } else {
            vec![expected_old]
        };

        let message = format!("attestation: {ref_name} {from_id} {target_id}");
        let new_commit = self
            .store
            .write_commit(new_tree, &parents, author, email, &message)?;

        match self
            .store
            .update_ref(ATTESTATIONS_REF, new_commit, expected_old)?
        {
            UpdateOutcome::Ok(id) => Ok(id),
            UpdateOutcome::Conflict { .. } => Err(AttestationError::Store(
                gittuf_store::StoreError::RefNotFound(ATTESTATIONS_REF.to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gittuf_crypto::signer::InMemorySigner;
    use gittuf_crypto::Envelope as Env;

    use crate::predicate::{Predicate, ReferenceAuthorization};
    use crate::statement::{Statement, Subject};

    fn sample_envelope(ref_name: &str, from_id: &str, target_id: &str) -> Env {
        let predicate = Predicate::ReferenceAuthorization(ReferenceAuthorization {
            target_ref: ref_name.to_string(),
            from_id: from_id.to_string(),
            target_id: target_id.to_string(),
        });
        let statement = Statement::new(vec![Subject {
            name: ref_name.to_string(),
            digest: [("gitCommit".to_string(), target_id.to_string())].into(),
        }], &predicate);
        let mut env = Env::new(
            "application/vnd.in-toto+json",
            statement.to_bytes().unwrap(),
        );
        let signer = InMemorySigner::generate();
        env.sign(&signer).unwrap();
        env
    }

    const RA: AttestationKind<'static> = AttestationKind::ReferenceAuthorization;

    #[test]
    fn stores_and_finds_by_triple() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);

        let env = sample_envelope("refs/heads/main", "deadbeef", "cafebabe");
        attestations
            .store(&RA, "refs/heads/main", "deadbeef", "cafebabe", &env, "t", "t@e")
            .unwrap();

        let found = attestations
            .find(&RA, "refs/heads/main", "deadbeef", "cafebabe")
            .unwrap();
        assert_eq!(found, vec![env]);
    }

    #[test]
    fn missing_triple_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);
        assert_eq!(
            attestations.find(&RA, "refs/heads/main", "a", "b").unwrap(),
            Vec::new()
        );
    }

    #[test]
    fn multiple_attestations_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);

        let e1 = sample_envelope("refs/heads/main", "a", "1");
        let e2 = sample_envelope("refs/heads/dev", "b", "2");
        attestations
            .store(&RA, "refs/heads/main", "a", "1", &e1, "t", "t@e")
            .unwrap();
        attestations
            .store(&RA, "refs/heads/dev", "b", "2", &e2, "t", "t@e")
            .unwrap();

        assert_eq!(
            attestations.find(&RA, "refs/heads/main", "a", "1").unwrap(),
            vec![e1]
        );
        assert_eq!(
            attestations.find(&RA, "refs/heads/dev", "b", "2").unwrap(),
            vec![e2]
        );
    }

    #[test]
    fn second_approver_is_merged_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);

        let e1 = sample_envelope("refs/heads/main", "a", "1");
        let e2 = sample_envelope("refs/heads/main", "a", "1");
        attestations
            .store(&RA, "refs/heads/main", "a", "1", &e1, "t", "t@e")
            .unwrap();
        attestations
            .store(&RA, "refs/heads/main", "a", "1", &e2, "t", "t@e")
            .unwrap();

        let found = attestations.find(&RA, "refs/heads/main", "a", "1").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&e1));
        assert!(found.contains(&e2));
    }

    #[test]
    fn reference_authorization_and_code_review_approval_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);

        let auth = sample_envelope("refs/heads/main", "a", "1");
        attestations
            .store(&RA, "refs/heads/main", "a", "1", &auth, "t", "t@e")
            .unwrap();

        let review_kind = AttestationKind::CodeReviewApproval { system_id: "github" };
        assert_eq!(
            attestations
                .find(&review_kind, "refs/heads/main", "a", "1")
                .unwrap(),
            Vec::new()
        );
        assert_eq!(
            attestations.find(&RA, "refs/heads/main", "a", "1").unwrap(),
            vec![auth]
        );
    }

    #[test]
    fn tampered_path_is_rejected_as_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let attestations = AttestationsStore::new(&store);

        // Store an envelope whose predicate claims a different target than
        // the path it's filed under.
        let env = sample_envelope("refs/heads/main", "a", "1");
        attestations
            .store(&RA, "refs/heads/main", "a", "other-target", &env, "t", "t@e")
            .unwrap();

        let err = attestations
            .find(&RA, "refs/heads/main", "a", "other-target")
            .unwrap_err();
        assert!(matches!(err, AttestationError::InvalidAttestation { .. }));
    }
}
