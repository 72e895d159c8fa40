use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gittuf_crypto::Principal;

use crate::error::Error;
use crate::global_rule::GlobalRule;
use crate::propagation::{FederatedRoot, Hook, Propagation};
use crate::role::{Role, GITHUB_APP_ROLE, ROOT_ROLE, TARGETS_ROLE};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    /// Only v2 introduces persons and teams (spec §3.3).
    pub fn supports_persons_and_teams(self) -> bool {
        matches!(self, SchemaVersion::V2)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubApp {
    pub role: Role,
    pub trusted: bool,
}

/// The root-of-trust document (spec §3.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Root {
    pub schema_version: SchemaVersion,
    pub expires: DateTime<Utc>,
    pub repository_location: Option<String>,
    pub principals: BTreeMap<String, Principal>,
    pub roles: BTreeMap<String, Role>,
    pub github_apps: BTreeMap<String, GithubApp>,
    pub global_rules: Vec<GlobalRule>,
    pub propagations: Vec<Propagation>,
    pub controller_repositories: Vec<FederatedRoot>,
    pub network_repositories: Vec<FederatedRoot>,
    pub hooks: Vec<Hook>,
}

impl Root {
    /// Structural invariants a root document must satisfy before it can be
    /// considered for signature verification (spec §3.3):
    /// - `roles` minimally contains `root` and `targets`
    /// - every principal ID referenced from a role/github-app is declared
    /// - `expires` is in the future, unless `skip_expiry` is set (one of the
    ///   open questions in spec §9.1 resolved as a `VerificationContext`
    ///   flag, per DESIGN.md)
    pub fn validate_structure(&self, now: DateTime<Utc>, skip_expiry: bool) -> Result<(), Error> {
        if !self.roles.contains_key(ROOT_ROLE) {
            return Err(Error::MissingReservedRole(ROOT_ROLE));
        }
        if !self.roles.contains_key(TARGETS_ROLE) {
            return Err(Error::MissingReservedRole(TARGETS_ROLE));
        }

        if !skip_expiry && self.expires <= now {
            return Err(Error::ExpiredMetadata {
                expires: self.expires.to_rfc3339(),
            });
        }

        for role in self.roles.values() {
            for pid in &role.principal_ids {
                if !self.principals.contains_key(pid) {
                    return Err(Error::UnknownPrincipal(pid.clone()));
                }
            }
        }
        for app in self.github_apps.values() {
            for pid in &app.role.principal_ids {
                if !self.principals.contains_key(pid) {
                    return Err(Error::UnknownPrincipal(pid.clone()));
                }
            }
        }
        if self.github_apps.keys().any(|n| n != GITHUB_APP_ROLE) {
            // Non-reserved app names are permitted; `github-app` itself is
            // merely the conventional default name, not a hard requirement.
        }

        if !self.schema_version.supports_persons_and_teams() {
            for p in self.principals.values() {
                if matches!(p, Principal::Person(_) | Principal::Team(_)) {
                    return Err(Error::UnknownPrincipal(format!(
                        "{} requires schema v2 but root declares v1",
                        p.id()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn root_role(&self) -> &Role {
        self.roles.get(ROOT_ROLE).expect("validated structure")
    }

    pub fn targets_role(&self) -> &Role {
        self.roles.get(TARGETS_ROLE).expect("validated structure")
    }

    pub fn principal_list(&self, ids: &std::collections::BTreeSet<String>) -> Vec<Principal> {
        ids.iter()
            .filter_map(|id| self.principals.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gittuf_crypto::signer::{InMemorySigner, Signer as _};

    fn sample_root(expires: DateTime<Utc>) -> Root {
        let signer = InMemorySigner::generate();
        let key_id = signer.public_key().id().to_string();
        let mut principals = BTreeMap::new();
        principals.insert(key_id.clone(), Principal::Key(signer.public_key()));

        let mut roles = BTreeMap::new();
        roles.insert(ROOT_ROLE.to_string(), Role::new([key_id.clone()], 1));
        roles.insert(TARGETS_ROLE.to_string(), Role::new([key_id], 1));

        Root {
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
        }
    }

    #[test]
    fn rejects_expired_root() {
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let root = sample_root(past);
        let err = root.validate_structure(Utc::now(), false).unwrap_err();
        assert!(matches!(err, Error::ExpiredMetadata { .. }));
    }

    #[test]
    fn skip_expiry_bypasses_check() {
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let root = sample_root(past);
        root.validate_structure(Utc::now(), true).unwrap();
    }

    #[test]
    fn rejects_unknown_principal_reference() {
        let future = Utc::now() + chrono::Duration::days(1);
        let mut root = sample_root(future);
        root.roles
            .get_mut(ROOT_ROLE)
            .unwrap()
            .principal_ids
            .insert("ghost".to_string());
        let err = root.validate_structure(Utc::now(), false).unwrap_err();
        assert!(matches!(err, Error::UnknownPrincipal(_)));
    }

    #[test]
    fn requires_root_and_targets_roles() {
        let future = Utc::now() + chrono::Duration::days(1);
        let mut root = sample_root(future);
        root.roles.remove(TARGETS_ROLE);
        let err = root.validate_structure(Utc::now(), false).unwrap_err();
        assert!(matches!(err, Error::MissingReservedRole(TARGETS_ROLE)));
    }
}
