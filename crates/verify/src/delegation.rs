//! Delegation pre-order resolution (C9, spec §4.9): within a targets file,
//! delegations are evaluated in declaration order and the first pattern
//! match wins; if the matched delegation has its own targets file, matching
//! continues (pre-order, depth first) inside it. Each level visited adds an
//! independent authorization requirement — a change must satisfy every
//! level's role, not just the most specific one.

use gittuf_policy::{Delegation, Pattern, Target};

use crate::policy_state::PolicyState;

/// One level of a resolved delegation chain: the delegation that matched,
/// at the targets file it was declared in.
#[derive(Clone, Debug)]
pub struct ResolvedLevel {
    pub delegation: Delegation,
    pub declared_in: String,
}

/// Walk the delegation chain for `target`, starting at the top-level
/// targets file, descending into each matched delegation's own targets
/// file (if loaded) until a match has no child file, is `terminating`, or is
/// the implicit `allow`.
pub fn resolve_chain(state: &PolicyState, target: &Target<'_>) -> Vec<ResolvedLevel> {
    let mut chain = Vec::new();
    let mut current_name = "targets".to_string();
    let mut current = &state.top_targets;

    loop {
        let delegations = current.delegations_with_allow();
        let Some(matched) = delegations.iter().find(|d| matches_any(d, target)) else {
            break;
        };

        chain.push(ResolvedLevel {
            delegation: matched.clone(),
            declared_in: current_name.clone(),
        });

        if matched.is_allow() || matched.terminating {
            break;
        }

        match state.loaded_targets.get(&matched.name) {
            Some(child) => {
                current_name = matched.name.clone();
                current = child;
            },
            None => break,
        }
    }

    chain
}

fn matches_any(delegation: &Delegation, target: &Target<'_>) -> bool {
    delegation
        .protected_namespaces
        .iter()
        .map(|p| Pattern::parse(p))
        .any(|p| p.matches(target))
}
