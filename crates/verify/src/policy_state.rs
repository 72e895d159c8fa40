//! Policy state loader (C6 "Select-Policy", C9): loads the root-of-trust
//! document and the full delegated-targets tree from `refs/gittuf/policy`,
//! verifying every document's signature threshold and structural invariants
//! before it is trusted (spec §4.4, §4.9).

use std::collections::BTreeMap;

use tracing::instrument;

use gittuf_crypto::{Envelope, Principal};
use gittuf_policy::role::{ROOT_ROLE, TARGETS_ROLE};
use gittuf_policy::{Root, Targets};
use gittuf_rsl::Rsl;
use gittuf_store::ObjectStore;

use crate::error::VerifyError;

pub const POLICY_REF: &str = "refs/gittuf/policy";
pub const ROOT_FILE: &str = "root.json";

pub fn targets_file_name(role_name: &str) -> String {
    format!("{role_name}.json")
}

/// Everything the verifier needs about the currently recorded policy: the
/// root document, the top-level targets ("rule") file, every delegated
/// targets file reachable from it, and a flattened index of every principal
/// declared anywhere in the chain (root, or any loaded targets file).
pub struct PolicyState {
    pub root: Root,
    pub top_targets: Targets,
    pub loaded_targets: BTreeMap<String, Targets>,
    principals: BTreeMap<String, Principal>,
}

impl PolicyState {
    pub fn resolve_principal(&self, id: &str) -> Option<Principal> {
        self.principals.get(id).cloned()
    }

    pub fn targets_file(&self, name: &str) -> Option<&Targets> {
        if name == TARGETS_ROLE {
            Some(&self.top_targets)
        } else {
            self.loaded_targets.get(name)
        }
    }
}

pub struct PolicyStateLoader<'a> {
    store: &'a ObjectStore,
}

impl<'a> PolicyStateLoader<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// Load the policy currently recorded at [`POLICY_REF`]'s head.
    #[instrument(skip(self))]
    pub fn load(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<PolicyState, VerifyError> {
        self.load_at(None, now, skip_expiry)
    }

    /// Load the policy that was in force at or before `at_entry` — the RSL
    /// entry being verified (spec §4.8 "Select-Policy": `policy =
    /// latest_policy_entry ≤ E`) — rather than whatever policy is current
    /// now. `at_entry = None` means "the current head", used by [`Self::load`].
    ///
    /// Every root document recorded on the policy reference's own RSL
    /// history is verified against its *predecessor* root's key set (spec
    /// §4.5 step 1), not against itself, except for the very first root ever
    /// recorded, which bootstraps by self-certifying. A policy ref with no
    /// RSL history at all (e.g. written directly, before the staging/apply
    /// lifecycle existed) falls back to self-certifying its current head.
    #[instrument(skip(self))]
    pub fn load_at(
        &self,
        at_entry: Option<gittuf_store::Oid>,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<PolicyState, VerifyError> {
        let rsl = Rsl::new(self.store);
        let policy_entry_id = match at_entry {
            Some(e) => rsl.latest_for_ref(POLICY_REF, Some(e))?.map(|(entry, _)| entry.id),
            None => rsl.get_latest()?.map(|head| head.id),
        };

        let history = match policy_entry_id {
            Some(id) => rsl.history_for_ref(POLICY_REF, id)?,
            None => Vec::new(),
        };

        let (tree, root) = if history.is_empty() {
            let commit_id = self
                .store
                .resolve_ref(POLICY_REF)?
                .ok_or(VerifyError::NoPolicy)?;
            let tree = self.store.read_commit(commit_id)?.tree;
            let root = self.load_root(tree, now, skip_expiry, None)?;
            (tree, root)
        } else {
            let mut predecessor: Option<Root> = None;
            let mut tree = None;
            for (_, reference) in &history {
                let entry_tree = self.store.read_commit(reference.target_id)?.tree;
                let root = self.load_root(entry_tree, now, skip_expiry, predecessor.as_ref())?;
                predecessor = Some(root);
                tree = Some(entry_tree);
            }
            (tree.unwrap(), predecessor.unwrap())
        };

        self.load_from_root(tree, root, now, skip_expiry)
    }

    /// Build a [`PolicyState`] from an already-verified `root` document and
    /// the tree its targets files live in. Shared by [`Self::load_at`] (root
    /// verified against a predecessor chain) and the policy staging/apply
    /// path (root verified against whatever is currently live), so both
    /// exercise the identical targets/delegation-loading logic.
    pub(crate) fn load_from_root(
        &self,
        tree: gittuf_store::Oid,
        root: Root,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<PolicyState, VerifyError> {
        let mut principals: BTreeMap<String, Principal> = root
            .principals
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();

        let top_targets = self.load_targets_file(
            tree,
            TARGETS_ROLE,
            &root,
            &root.targets_role().principal_ids,
            root.targets_role().threshold,
            now,
            skip_expiry,
        )?;
        for (id, p) in &top_targets.local_principals {
            principals.insert(id.clone(), p.clone());
        }

        let mut loaded_targets = BTreeMap::new();
        let mut stack = std::collections::BTreeSet::new();
        stack.insert(TARGETS_ROLE.to_string());
        self.load_delegations_recursive(
            tree,
            &root,
            &top_targets,
            &mut principals,
            &mut loaded_targets,
            &mut stack,
            now,
            skip_expiry,
        )?;

        Ok(PolicyState {
            root,
            top_targets,
            loaded_targets,
            principals,
        })
    }

    /// Load and verify a single root document, without building the rest of
    /// the policy state. Used by the staging/apply path to verify a staged
    /// root against the currently live one before fast-forwarding.
    pub(crate) fn load_root_only(
        &self,
        tree: gittuf_store::Oid,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
        predecessor: Option<&Root>,
    ) -> Result<Root, VerifyError> {
        self.load_root(tree, now, skip_expiry, predecessor)
    }

    /// Load and verify a single root document. `predecessor` is the root
    /// document from the previous entry in the policy ref's RSL history, if
    /// any (spec §4.5 step 1: a root rotation must be authorized by the
    /// *previous* root's key set, not its own). `None` means this is the
    /// first root ever recorded — it bootstraps by self-certifying.
    fn load_root(
        &self,
        tree: gittuf_store::Oid,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
        predecessor: Option<&Root>,
    ) -> Result<Root, VerifyError> {
        let bytes = self
            .store
            .read_tree_path(tree, ROOT_FILE)?
            .ok_or(VerifyError::NoPolicy)?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        let root: Root = serde_json::from_slice(&envelope.payload)?;

        root.validate_structure(now, skip_expiry)
            .map_err(VerifyError::Policy)?;

        let authority = predecessor.unwrap_or(&root);
        let principals = authority.principal_list(&authority.root_role().principal_ids);
        envelope.verify_threshold(&principals, authority.root_role().threshold)?;

        Ok(root)
    }

    #[allow(clippy::too_many_arguments)]
    fn load_targets_file(
        &self,
        tree: gittuf_store::Oid,
        name: &str,
        root: &Root,
        principal_ids: &std::collections::BTreeSet<String>,
        threshold: usize,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<Targets, VerifyError> {
        let path = targets_file_name(name);
        let bytes = self
            .store
            .read_tree_path(tree, &path)?
            .ok_or_else(|| VerifyError::MissingTargetsFile(name.to_string()))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        let targets: Targets = serde_json::from_slice(&envelope.payload)?;
        targets
            .validate_structure(now, skip_expiry)
            .map_err(VerifyError::Policy)?;

        let principals = root.principal_list(principal_ids);
        envelope.verify_threshold(&principals, threshold)?;

        Ok(targets)
    }

    /// Recursively resolves every delegation reachable from `targets`.
    /// `stack` tracks delegations on the *current* DFS path — a name
    /// reappearing there is a genuine cycle (spec §7: a self-referential
    /// targets graph is fatal). `loaded` is the memo of delegations already
    /// fully resolved via some other path; the same delegation reachable
    /// through two parents (a DAG diamond) is legitimate and must be
    /// reused, not re-flagged.
    #[allow(clippy::too_many_arguments)]
    fn load_delegations_recursive(
        &self,
        tree: gittuf_store::Oid,
        root: &Root,
        targets: &Targets,
        principals: &mut BTreeMap<String, Principal>,
        loaded: &mut BTreeMap<String, Targets>,
        stack: &mut std::collections::BTreeSet<String>,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<(), VerifyError> {
        for delegation in targets.delegations_with_allow() {
            if delegation.is_allow() || loaded.contains_key(&delegation.name) {
                continue;
            }
            let path = targets_file_name(&delegation.name);
            if self.store.read_tree_path(tree, &path)?.is_none() {
                // A delegation without its own file is a pure role
                // assertion (no further nesting to resolve).
                continue;
            }
            if stack.contains(&delegation.name) {
                return Err(VerifyError::Policy(gittuf_policy::Error::CyclicDelegation(
                    delegation.name.clone(),
                )));
            }
            stack.insert(delegation.name.clone());

            let acceptable_ids: std::collections::BTreeSet<String> = delegation
                .role
                .principal_ids
                .iter()
                .cloned()
                .collect();
            let child = self.load_targets_file_mixed(
                tree,
                &delegation.name,
                root,
                principals,
                &acceptable_ids,
                delegation.role.threshold,
                now,
                skip_expiry,
            )?;

            for (id, p) in &child.local_principals {
                principals.insert(id.clone(), p.clone());
            }

            self.load_delegations_recursive(
                tree, root, &child, principals, loaded, stack, now, skip_expiry,
            )?;
            stack.remove(&delegation.name);
            loaded.insert(delegation.name.clone(), child);
        }
        Ok(())
    }

    /// Like [`Self::load_targets_file`], but resolves the acceptable
    /// principal set from the accumulated index (root + every targets file
    /// loaded so far) rather than only the root's own table, since a
    /// delegation's signers may be declared in a parent targets file.
    #[allow(clippy::too_many_arguments)]
    fn load_targets_file_mixed(
        &self,
        tree: gittuf_store::Oid,
        name: &str,
        _root: &Root,
        principals: &BTreeMap<String, Principal>,
        principal_ids: &std::collections::BTreeSet<String>,
        threshold: usize,
        now: chrono::DateTime<chrono::Utc>,
        skip_expiry: bool,
    ) -> Result<Targets, VerifyError> {
        let path = targets_file_name(name);
        let bytes = self
            .store
            .read_tree_path(tree, &path)?
            .ok_or_else(|| VerifyError::MissingTargetsFile(name.to_string()))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        let targets: Targets = serde_json::from_slice(&envelope.payload)?;
        targets
            .validate_structure(now, skip_expiry)
            .map_err(VerifyError::Policy)?;

        let acceptable: Vec<Principal> = principal_ids
            .iter()
            .filter_map(|id| principals.get(id).cloned())
            .collect();
        envelope.verify_threshold(&acceptable, threshold)?;

        Ok(targets)
    }
}

/// Let callers express the reserved root-role name without importing
/// `gittuf_policy::role` directly.
pub const ROOT_ROLE_NAME: &str = ROOT_ROLE;
