use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A named set of authorized principal IDs and a threshold.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub principal_ids: BTreeSet<String>,
    pub threshold: usize,
}

impl Role {
    pub fn new(principal_ids: impl IntoIterator<Item = String>, threshold: usize) -> Self {
        Self {
            principal_ids: principal_ids.into_iter().collect(),
            threshold,
        }
    }

    /// The always-matching, empty-role `allow` delegation's role.
    pub fn empty() -> Self {
        Self {
            principal_ids: BTreeSet::new(),
            threshold: 0,
        }
    }
}

pub const ROOT_ROLE: &str = "root";
pub const TARGETS_ROLE: &str = "targets";
pub const GITHUB_APP_ROLE: &str = "github-app";
