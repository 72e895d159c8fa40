use serde::{Deserialize, Serialize};

use crate::pattern::Pattern;

/// A rule in the root document that applies alongside any matching
/// delegation (spec §3.3, §4.8 "Global-Rules").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GlobalRule {
    /// Enforces a minimum number of distinct principal signatures on top of
    /// any delegation match.
    Threshold {
        name: String,
        protected_namespaces: Vec<String>,
        threshold: usize,
    },
    /// Rejects non-fast-forward RSL transitions for matching refs.
    BlockForcePushes {
        name: String,
        protected_namespaces: Vec<String>,
    },
}

impl GlobalRule {
    pub fn name(&self) -> &str {
        match self {
            GlobalRule::Threshold { name, .. } => name,
            GlobalRule::BlockForcePushes { name, .. } => name,
        }
    }

    pub fn protected_namespaces(&self) -> &[String] {
        match self {
            GlobalRule::Threshold {
                protected_namespaces,
                ..
            } => protected_namespaces,
            GlobalRule::BlockForcePushes {
                protected_namespaces,
                ..
            } => protected_namespaces,
        }
    }

    pub fn matches_ref(&self, git_ref: &str) -> bool {
        self.protected_namespaces()
            .iter()
            .map(|p| Pattern::parse(p))
            .any(|p| p.matches(&crate::pattern::Target::Ref(git_ref)))
    }
}
