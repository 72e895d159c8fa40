//! gittuf: a cryptographic, policy-driven trust layer over a git
//! repository's references.
//!
//! This crate is a thin facade tying the lower layers together: record a
//! new value for a reference on the RSL ([`record`]), then check whether
//! the currently recorded value was authorized under the policy in force
//! ([`verify`]). The individual concerns — object store access, trust
//! metadata, the reference state log, attestations, and the verifier
//! state machine — live in their own crates and can be used directly for
//! anything this facade doesn't cover.

pub use gittuf_attestations::{
    AttestationsStore, CodeReviewApproval, HookExecutionReport, Predicate, ReferenceAuthorization,
    Statement, Subject, ATTESTATIONS_REF,
};
pub use gittuf_canonical::{Canonical, Value};
pub use gittuf_crypto::{Envelope, Key, KeyType, Person, Principal, Scheme, Signer, Team};
pub use gittuf_policy::{Delegation, GlobalRule, Pattern, Role, Root, SchemaVersion, Target, Targets};
pub use gittuf_rsl::{AnnotationEntry, Entry, EntryBody, ReferenceEntry, Rsl, RSL_REF};
pub use gittuf_store::{ObjectStore, Oid, StoreError, ZERO_OID};
pub use gittuf_verify::{
    resolve_chain, CachedEntry, EntryCache, PolicyState, PolicyStateLoader, ResolvedLevel,
    VerificationContext, VerificationOutcome, Verifier, VsaGenerator,
};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Rsl(#[from] gittuf_rsl::RslError),
    #[error(transparent)]
    Verify(#[from] gittuf_verify::VerifyError),
}

/// Record `target_id` as the new value of `ref_name` on the reference
/// state log.
pub fn record(
    store: &ObjectStore,
    ref_name: &str,
    target_id: Oid,
    author: &str,
    email: &str,
) -> Result<Entry, Error> {
    Ok(Rsl::new(store).record(ref_name, target_id, author, email)?)
}

/// Verify that the currently recorded RSL entry for `ref_name` was
/// authorized under the policy in force at that entry. `target` pins
/// verification to a specific historical commit instead of the current
/// head — `None` means "verify the latest".
pub fn verify(
    store: &ObjectStore,
    ctx: &VerificationContext,
    ref_name: &str,
    target: Option<Oid>,
) -> Result<VerificationOutcome, Error> {
    let verifier = Verifier::new(store);
    match target {
        Some(target_id) => Ok(verifier.verify_target(ctx, ref_name, target_id)?),
        None => Ok(verifier.verify_ref(ctx, ref_name)?),
    }
}

/// Verify every authoritative entry recorded for `ref_name`, oldest first,
/// up to and including the entry whose target is `target` (or the current
/// head, if `None`) — each checked against the policy in force at that
/// specific entry.
pub fn verify_range(
    store: &ObjectStore,
    ctx: &VerificationContext,
    ref_name: &str,
    target: Option<Oid>,
) -> Result<Vec<VerificationOutcome>, Error> {
    Ok(Verifier::new(store).verify_range(ctx, ref_name, target)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gittuf_crypto::signer::InMemorySigner;
    use gittuf_policy::role::{ROOT_ROLE, TARGETS_ROLE};
    use std::collections::BTreeMap;

    #[test]
    fn record_then_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let signer = InMemorySigner::generate();
        let key_id = signer.public_key().id().to_string();

        let mut principals = BTreeMap::new();
        principals.insert(key_id.clone(), Principal::Key(signer.public_key()));
        let mut roles = BTreeMap::new();
        roles.insert(ROOT_ROLE.to_string(), Role::new([key_id.clone()], 1));
        roles.insert(TARGETS_ROLE.to_string(), Role::new([key_id.clone()], 1));

        let root = Root {
            schema_version: SchemaVersion::V1,
            expires: Utc::now() + chrono::Duration::days(1),
            repository_location: None,
            principals,
            roles,
            github_apps: BTreeMap::new(),
            global_rules: vec![],
            propagations: vec![],
            controller_repositories: vec![],
            network_repositories: vec![],
            hooks: vec![],
        };
        let targets = Targets {
            schema_version: SchemaVersion::V1,
            expires: Utc::now() + chrono::Duration::days(1),
            local_principals: BTreeMap::new(),
            delegations: vec![Delegation {
                name: "protect-main".to_string(),
                protected_namespaces: vec!["git:refs/heads/main".to_string()],
                terminating: true,
                custom: BTreeMap::new(),
                role: Role::new([key_id], 1),
            }],
        };

        let mut root_env = Envelope::new("application/vnd.gittuf+json", root.canonical_bytes().unwrap());
        root_env.sign(&signer).unwrap();
        let mut targets_env =
            Envelope::new("application/vnd.gittuf+json", targets.canonical_bytes().unwrap());
        targets_env.sign(&signer).unwrap();

        let tree = store
            .write_tree(&[
                ("root.json", serde_json::to_vec(&root_env).unwrap().as_slice()),
                ("targets.json", serde_json::to_vec(&targets_env).unwrap().as_slice()),
            ])
            .unwrap();
        let staging = gittuf_verify::PolicyStaging::new(&store);
        staging.stage(tree, "policy", "policy@e", "stage policy").unwrap();
        staging
            .apply(Utc::now(), false, "policy", "policy@e")
            .unwrap();

        let blob_tree = store.write_tree(&[]).unwrap();
        let commit = gittuf_verify::write_signed_commit(
            &store,
            blob_tree,
            &[],
            "dev",
            "dev@e",
            "a commit",
            &signer,
        )
        .unwrap();
        record(&store, "refs/heads/main", commit, "dev", "dev@e").unwrap();

        let ctx = VerificationContext::new(Utc::now());
        let outcome = verify(&store, &ctx, "refs/heads/main", None).unwrap();
        assert_eq!(outcome.target_id, commit);
    }
}
