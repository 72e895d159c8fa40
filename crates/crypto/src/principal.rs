//! Principal capability set (spec §3.1): `id()`, `keys()`,
//! `custom_metadata()`, encoded as a tagged variant rather than trait
//! objects, per spec §9 ("encode Principal as a tagged variant ... the
//! capability set is expressed as three pure functions per variant, not
//! virtual methods").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// A principal that owns zero or more keys directly: a bare [`Key`], or a
/// [`Person`] (schema v2 only) that groups several owned keys and external
/// identities under one stable, human-chosen ID.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: String,
    pub keys: Vec<Key>,
    /// provider name -> provider-specific handle, eg. `{"github": "alice"}`.
    pub associated_identities: BTreeMap<String, String>,
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// A team: a threshold over a fixed, ordered list of member principal IDs
/// (which may themselves be keys, persons, or other teams).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub members: Vec<String>,
    pub threshold: usize,
    pub custom: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Principal {
    Key(Key),
    Person(Person),
    Team(Team),
}

impl Principal {
    pub fn id(&self) -> &str {
        match self {
            Principal::Key(k) => k.id(),
            Principal::Person(p) => &p.person_id,
            Principal::Team(t) => &t.team_id,
        }
    }

    /// Keys this principal directly owns. For a [`Team`], this is empty:
    /// team membership is resolved transitively (§4.3), not by flattening
    /// keys eagerly.
    pub fn keys(&self) -> Vec<&Key> {
        match self {
            Principal::Key(k) => vec![k],
            Principal::Person(p) => p.keys.iter().collect(),
            Principal::Team(_) => vec![],
        }
    }

    pub fn custom_metadata(&self) -> BTreeMap<String, serde_json::Value> {
        match self {
            Principal::Key(_) => BTreeMap::new(),
            Principal::Person(p) => p.custom.clone(),
            Principal::Team(t) => t.custom.clone(),
        }
    }

    /// Does this principal consider itself to have signed, given the set of
    /// key IDs that produced a validated signature and a way to resolve
    /// other principals by ID (for team members)?
    ///
    /// - `Key`: signed iff its own ID is in `valid_key_ids`.
    /// - `Person`: signed iff *any* owned key's ID is in `valid_key_ids`.
    /// - `Team`: signed iff at least `threshold` distinct members each
    ///   signed (resolved recursively via `resolve`).
    pub fn is_satisfied(
        &self,
        valid_key_ids: &std::collections::BTreeSet<String>,
        resolve: &impl Fn(&str) -> Option<Principal>,
    ) -> bool {
        match self {
            Principal::Key(k) => valid_key_ids.contains(k.id()),
            Principal::Person(p) => p.keys.iter().any(|k| valid_key_ids.contains(k.id())),
            Principal::Team(t) => {
                let signed = t
                    .members
                    .iter()
                    .filter(|member_id| match resolve(member_id) {
                        Some(member) => member.is_satisfied(valid_key_ids, resolve),
                        None => false,
                    })
                    .count();
                signed >= t.threshold
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{InMemorySigner, Signer as _};

    fn resolve_none(_: &str) -> Option<Principal> {
        None
    }

    #[test]
    fn key_satisfied_iff_id_present() {
        let signer = InMemorySigner::generate();
        let principal = Principal::Key(signer.public_key());
        let mut valid = std::collections::BTreeSet::new();
        assert!(!principal.is_satisfied(&valid, &resolve_none));
        valid.insert(signer.public_key().id().to_string());
        assert!(principal.is_satisfied(&valid, &resolve_none));
    }

    #[test]
    fn person_satisfied_by_any_owned_key() {
        let s1 = InMemorySigner::generate();
        let s2 = InMemorySigner::generate();
        let person = Principal::Person(Person {
            person_id: "alice".into(),
            keys: vec![s1.public_key(), s2.public_key()],
            associated_identities: BTreeMap::new(),
            custom: BTreeMap::new(),
        });
        let mut valid = std::collections::BTreeSet::new();
        valid.insert(s2.public_key().id().to_string());
        assert!(person.is_satisfied(&valid, &resolve_none));
    }

    #[test]
    fn team_satisfied_by_threshold_distinct_members() {
        let s1 = InMemorySigner::generate();
        let s2 = InMemorySigner::generate();
        let s3 = InMemorySigner::generate();
        let k1 = Principal::Key(s1.public_key());
        let k2 = Principal::Key(s2.public_key());
        let k3 = Principal::Key(s3.public_key());
        let team = Team {
            team_id: "maintainers".into(),
            members: vec![k1.id().into(), k2.id().into(), k3.id().into()],
            threshold: 2,
            custom: BTreeMap::new(),
        };
        let by_id: BTreeMap<String, Principal> = [&k1, &k2, &k3]
            .into_iter()
            .map(|p| (p.id().to_string(), p.clone()))
            .collect();
        let resolve = |id: &str| by_id.get(id).cloned();

        let mut valid = std::collections::BTreeSet::new();
        valid.insert(s1.public_key().id().to_string());
        assert!(!Principal::Team(team.clone()).is_satisfied(&valid, &resolve));

        valid.insert(s2.public_key().id().to_string());
        assert!(Principal::Team(team).is_satisfied(&valid, &resolve));
    }
}
