//! Policy lifecycle (spec §3.7): policy changes are staged on
//! [`POLICY_STAGING_REF`], then applied — verified, fast-forwarded onto
//! [`POLICY_REF`], and recorded as a reference entry on the RSL — rather
//! than written to the live policy ref directly, so every policy change is
//! itself part of the auditable reference-state history.

use tracing::instrument;

use gittuf_rsl::{Entry, Rsl};
use gittuf_store::{ObjectStore, Oid, UpdateOutcome, ZERO_OID};

use crate::error::VerifyError;
use crate::policy_state::{PolicyStateLoader, POLICY_REF};

pub const POLICY_STAGING_REF: &str = "refs/gittuf/policy-staging";

/// Stages and applies changes to the policy reference (spec §3.7).
pub struct PolicyStaging<'a> {
    store: &'a ObjectStore,
}

impl<'a> PolicyStaging<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// Record `tree` (a root.json/targets.json/... tree built by the
    /// caller) as a new commit on [`POLICY_STAGING_REF`], fast-forwarding
    /// from whatever is already staged.
    #[instrument(skip(self))]
    pub fn stage(
        &self,
        tree: Oid,
        author: &str,
        email: &str,
        message: &str,
    ) -> Result<Oid, VerifyError> {
        let parent = self.store.resolve_ref(POLICY_STAGING_REF)?;
        let parents: Vec<Oid> = parent.iter().copied().collect();
        let expected_old = parent.unwrap_or(ZERO_OID);
        let new_commit = self.store.write_commit(tree, &parents, author, email, message)?;

        match self.store.update_ref(POLICY_STAGING_REF, new_commit, expected_old)? {
            UpdateOutcome::Ok(id) => Ok(id),
            UpdateOutcome::Conflict { .. } => Err(VerifyError::StaleRef(POLICY_STAGING_REF.to_string())),
        }
    }

    /// Verify the currently staged policy, fast-forward [`POLICY_REF`] to
    /// it, and record a reference entry on the RSL for the policy ref
    /// itself (spec §3.7). The staged root is verified against whichever
    /// root is currently live at [`POLICY_REF`] (or self-certified, at
    /// bootstrap, if no policy has ever been applied).
    #[instrument(skip(self))]
    pub fn apply(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
        author: &str,
        email: &str,
    ) -> Result<Entry, VerifyError> {
        let staged_commit = self
            .store
            .resolve_ref(POLICY_STAGING_REF)?
            .ok_or(VerifyError::NoPolicy)?;
        let staged_tree = self.store.read_commit(staged_commit)?.tree;

        let loader = PolicyStateLoader::new(self.store);
        let live_commit = self.store.resolve_ref(POLICY_REF)?;
        let predecessor_root = match live_commit {
            Some(commit) => {
                let tree = self.store.read_commit(commit)?.tree;
                Some(loader.load_root_only(tree, now, skip_expiry, None)?)
            },
            None => None,
        };

        let root = loader.load_root_only(staged_tree, now, skip_expiry, predecessor_root.as_ref())?;
        // Verifying the rest of the staged policy (targets/delegations)
        // surfaces a malformed staged policy before it ever becomes live.
        loader.load_from_root(staged_tree, root, now, skip_expiry)?;

        let expected_old = live_commit.unwrap_or(ZERO_OID);
        match self.store.update_ref(POLICY_REF, staged_commit, expected_old)? {
            UpdateOutcome::Ok(_) => {},
            UpdateOutcome::Conflict { .. } => return Err(VerifyError::StaleRef(POLICY_REF.to_string())),
        }

        let rsl = Rsl::new(self.store);
        Ok(rsl.record(POLICY_REF, staged_commit, author, email)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use gittuf_crypto::signer::{InMemorySigner, Signer as _};
    use gittuf_crypto::{Envelope, Principal};
    use gittuf_policy::role::{ROOT_ROLE, TARGETS_ROLE};
    use gittuf_policy::{Role, Root, SchemaVersion, Targets};

    use super::*;

    fn bootstrap_tree(store: &ObjectStore, signer: &InMemorySigner, expires: chrono::DateTime<Utc>) -> Oid {
        let key_id = signer.public_key().id().to_string();
        let mut principals = BTreeMap::new();
        principals.insert(key_id.clone(), Principal::Key(signer.public_key()));
        let mut roles = BTreeMap::new();
        roles.insert(ROOT_ROLE.to_string(), Role::new([key_id.clone()], 1));
        roles.insert(TARGETS_ROLE.to_string(), Role::new([key_id], 1));

        let root = Root {
            schema_version: SchemaVersion::V1,
            expires,
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
            expires,
            local_principals: BTreeMap::new(),
            delegations: vec![],
        };

        let mut root_envelope = Envelope::new(
            "application/vnd.gittuf+json",
            gittuf_canonical::Canonical::canonical_bytes(&root).unwrap(),
        );
        root_envelope.sign(signer).unwrap();
        let mut targets_envelope = Envelope::new(
            "application/vnd.gittuf+json",
            gittuf_canonical::Canonical::canonical_bytes(&targets).unwrap(),
        );
        targets_envelope.sign(signer).unwrap();

        store
            .write_tree(&[
                ("root.json", serde_json::to_vec(&root_envelope).unwrap().as_slice()),
                ("targets.json", serde_json::to_vec(&targets_envelope).unwrap().as_slice()),
            ])
            .unwrap()
    }

    #[test]
    fn apply_fast_forwards_policy_and_records_rsl_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let signer = InMemorySigner::generate();
        let expires = Utc::now() + chrono::Duration::days(1);

        let tree = bootstrap_tree(&store, &signer, expires);
        let staging = PolicyStaging::new(&store);
        staging.stage(tree, "t", "t@e", "initial policy").unwrap();

        let entry = staging.apply(Utc::now(), false, "t", "t@e").unwrap();
        assert_eq!(
            entry.body.as_reference().unwrap().ref_name,
            POLICY_REF.to_string()
        );

        let rsl = Rsl::new(&store);
        let (_, r) = rsl.latest_for_ref(POLICY_REF, None).unwrap().unwrap();
        assert_eq!(r.target_id, store.resolve_ref(POLICY_REF).unwrap().unwrap());
    }

    #[test]
    fn apply_with_nothing_staged_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let staging = PolicyStaging::new(&store);
        assert!(matches!(
            staging.apply(Utc::now(), false, "t", "t@e").unwrap_err(),
            VerifyError::NoPolicy
        ));
    }
}
