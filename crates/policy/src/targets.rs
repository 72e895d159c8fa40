use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gittuf_crypto::Principal;

use crate::error::Error;
use crate::pattern::{Pattern, Target};
use crate::role::Role;

/// A delegation inside a targets file (spec §3.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Delegation {
    pub name: String,
    pub protected_namespaces: Vec<String>,
    pub terminating: bool,
    pub custom: BTreeMap<String, serde_json::Value>,
    pub role: Role,
}

impl Delegation {
    /// A delegation matches a target when *any* of its patterns match
    /// (spec §3.2).
    pub fn matches(&self, target: &Target) -> bool {
        self.protected_namespaces
            .iter()
            .map(|p| Pattern::parse(p))
            .any(|p| p.matches(target))
    }

    /// The implicit, always-last `allow` delegation: matches everything,
    /// empty role, never terminating (spec §3.2, §4.9 step 5).
    pub fn allow() -> Self {
        Self {
            name: "allow".to_string(),
            protected_namespaces: vec!["git:*".to_string(), "file:*".to_string()],
            terminating: false,
            custom: BTreeMap::new(),
            role: Role::empty(),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.name == "allow" && self.role.threshold == 0 && self.role.principal_ids.is_empty()
    }
}

/// A delegated targets ("rule") file (spec §3.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Targets {
    pub schema_version: crate::root::SchemaVersion,
    pub expires: DateTime<Utc>,
    /// Principals declared only within this file, supplementing the root's.
    pub local_principals: BTreeMap<String, Principal>,
    /// Delegations in evaluation order (spec §4.9: "within a single targets
    /// file, delegations are evaluated in the order stored").
    pub delegations: Vec<Delegation>,
}

impl Targets {
    pub fn validate_structure(&self, now: DateTime<Utc>, skip_expiry: bool) -> Result<(), Error> {
        if !skip_expiry && self.expires <= now {
            return Err(Error::ExpiredMetadata {
                expires: self.expires.to_rfc3339(),
            });
        }
        Ok(())
    }

    /// Delegations in stored order, with the implicit `allow` delegation
    /// appended if the file didn't declare one explicitly.
    pub fn delegations_with_allow(&self) -> Vec<Delegation> {
        let mut out = self.delegations.clone();
        if !out.iter().any(Delegation::is_allow) {
            out.push(Delegation::allow());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    #[test]
    fn allow_is_appended_when_absent() {
        let targets = Targets {
            schema_version: crate::root::SchemaVersion::V1,
            expires: Utc::now() + chrono::Duration::days(1),
            local_principals: BTreeMap::new(),
            delegations: vec![Delegation {
                name: "protect-main".to_string(),
                protected_namespaces: vec!["git:refs/heads/main".to_string()],
                terminating: true,
                custom: BTreeMap::new(),
                role: Role::new(["p1".to_string()], 1),
            }],
        };
        let all = targets.delegations_with_allow();
        assert_eq!(all.len(), 2);
        assert!(all.last().unwrap().is_allow());
    }

    #[test]
    fn preorder_is_declaration_order() {
        let targets = Targets {
            schema_version: crate::root::SchemaVersion::V1,
            expires: Utc::now() + chrono::Duration::days(1),
            local_principals: BTreeMap::new(),
            delegations: vec![
                Delegation {
                    name: "first".to_string(),
                    protected_namespaces: vec!["git:refs/heads/a".to_string()],
                    terminating: false,
                    custom: BTreeMap::new(),
                    role: Role::new(["p1".to_string()], 1),
                },
                Delegation {
                    name: "second".to_string(),
                    protected_namespaces: vec!["git:refs/heads/b".to_string()],
                    terminating: false,
                    custom: BTreeMap::new(),
                    role: Role::new(["p1".to_string()], 1),
                },
            ],
        };
        let all = targets.delegations_with_allow();
        let names: Vec<&str> = all.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "allow"]);
    }
}
