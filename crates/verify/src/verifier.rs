//! The verifier state machine (C6, spec §4.8): Select-Policy → Collect-
//! Signers → Resolve-Delegations → Evaluate-Threshold → Global-Rules →
//! Decide.
//!
//! Automated recovery from a bad push (spec §4.8) is structural rather than
//! a separate branch here: [`gittuf_rsl::Rsl::history_for_ref`] and
//! [`gittuf_rsl::Rsl::latest_for_ref`] already skip any RSL entry covered by
//! a `skip: true` annotation, so a verified range never revisits a rolled
//! back entry and resumes immediately at whatever entry follows the skip.
//!
//! Range verification (spec §4.8) walks every authoritative entry recorded
//! for a reference, oldest first, rather than only its current head: each
//! entry is checked against the policy that was in force *at that entry*
//! (spec §4.8 "Select-Policy"), not the policy in force now, so a later
//! policy rotation can never retroactively change the verdict on an
//! earlier push.

use std::collections::BTreeSet;

use tracing::instrument;

use gittuf_attestations::{AttestationKind, AttestationsStore};
use gittuf_crypto::Principal;
use gittuf_policy::pattern::Target;
use gittuf_policy::GlobalRule;
use gittuf_rsl::{Entry, ReferenceEntry, Rsl};
use gittuf_store::{ObjectStore, Oid, ZERO_OID};

use crate::cache::EntryCache;
use crate::context::VerificationContext;
use crate::delegation::{resolve_chain, ResolvedLevel};
use crate::error::VerifyError;
use crate::policy_state::{PolicyState, PolicyStateLoader};
use crate::signing::verify_target_signature;

#[derive(Clone, Debug)]
pub struct VerificationOutcome {
    pub ref_name: String,
    pub target_id: Oid,
    pub rsl_entry_id: Oid,
    pub levels_satisfied: usize,
    pub bfp_applied: bool,
    pub adequate_threshold_applied: bool,
    /// The policy ref's RSL entry selected for this outcome (spec §4.8
    /// "Select-Policy"), or `None` for a policy ref with no RSL history of
    /// its own. Outcomes sharing this value were verified under the same
    /// policy state — the grouping [`crate::vsa::VsaGenerator`] needs to
    /// split a verified range into contiguous same-policy runs (spec §4.10).
    pub policy_entry_id: Option<Oid>,
}

pub struct Verifier<'a> {
    store: &'a ObjectStore,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// Verify that the currently recorded RSL entry for `ref_name` was
    /// authorized under the policy in force at that entry. Equivalent to
    /// the last outcome of [`Self::verify_range`] over the whole history.
    #[instrument(skip(self, ctx))]
    pub fn verify_ref(
        &self,
        ctx: &VerificationContext,
        ref_name: &str,
    ) -> Result<VerificationOutcome, VerifyError> {
        self.verify_range(ctx, ref_name, None)?
            .into_iter()
            .last()
            .ok_or_else(|| VerifyError::NoEntryForRef(ref_name.to_string()))
    }

    /// Verify the single historical entry for `ref_name` whose recorded
    /// target is `target_id` — replaying the range up to (and including)
    /// that entry, against the policy that was in force when it was made.
    #[instrument(skip(self, ctx))]
    pub fn verify_target(
        &self,
        ctx: &VerificationContext,
        ref_name: &str,
        target_id: Oid,
    ) -> Result<VerificationOutcome, VerifyError> {
        self.verify_range(ctx, ref_name, Some(target_id))?
            .into_iter()
            .last()
            .ok_or_else(|| VerifyError::NoEntryForRef(ref_name.to_string()))
    }

    /// Enumerate and verify every authoritative (non-skipped) RSL entry
    /// recorded for `ref_name`, oldest first, up to and including the entry
    /// whose target is `upto` (or the current head, if `None`).
    ///
    /// Each entry is checked against the policy selected for *that* entry
    /// (spec §4.8 "Select-Policy": `policy = latest_policy_entry ≤ E`), and
    /// `previous_target` for the `BlockForcePushes` rule is always the
    /// immediately preceding entry in this same range, so a verified range
    /// catches a non-fast-forward at any point in history, not only at the
    /// tip.
    #[instrument(skip(self, ctx))]
    pub fn verify_range(
        &self,
        ctx: &VerificationContext,
        ref_name: &str,
        upto: Option<Oid>,
    ) -> Result<Vec<VerificationOutcome>, VerifyError> {
        let history = self.history_up_to(ref_name, upto)?;

        let mut outcomes = Vec::with_capacity(history.len());
        let mut previous_target = ZERO_OID;
        for (entry, reference_entry) in &history {
            ctx.check_cancelled()?;
            let outcome = self.verify_entry(ctx, ref_name, entry, reference_entry, previous_target)?;
            previous_target = reference_entry.target_id;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Like [`Self::verify_range`], but skips the prefix of the range already
    /// recorded in `cache` (C11, spec §9 design note: avoid re-walking the
    /// whole log on every verification) — only the entries appended since
    /// `cache`'s last recorded entry for `ref_name` are replayed and newly
    /// verified, and `cache` is updated to reflect them. Returns only the
    /// newly verified outcomes; an up-to-date cache yields an empty vec.
    #[instrument(skip(self, ctx, cache))]
    pub fn verify_range_cached(
        &self,
        ctx: &VerificationContext,
        ref_name: &str,
        upto: Option<Oid>,
        cache: &mut EntryCache,
    ) -> Result<Vec<VerificationOutcome>, VerifyError> {
        let history = self.history_up_to(ref_name, upto)?;

        let resume_from = cache
            .last_entry_id_for_ref(ref_name)
            .and_then(|cached_id| history.iter().position(|(e, _)| e.id == cached_id))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        if resume_from >= history.len() {
            return Ok(Vec::new());
        }

        let mut previous_target = if resume_from == 0 {
            ZERO_OID
        } else {
            history[resume_from - 1].1.target_id
        };

        let mut outcomes = Vec::with_capacity(history.len() - resume_from);
        for (entry, reference_entry) in &history[resume_from..] {
            ctx.check_cancelled()?;
            let outcome = self.verify_entry(ctx, ref_name, entry, reference_entry, previous_target)?;
            if !ctx.eval_mode {
                cache.record(entry);
            }
            previous_target = reference_entry.target_id;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Resolve the full non-skipped reference history for `ref_name` up to
    /// `upto` (a recorded target commit) or the log head (`None`).
    fn history_up_to(
        &self,
        ref_name: &str,
        upto: Option<Oid>,
    ) -> Result<Vec<(Entry, ReferenceEntry)>, VerifyError> {
        let rsl = Rsl::new(self.store);
        let log_head = rsl
            .get_latest()?
            .ok_or_else(|| VerifyError::NoEntryForRef(ref_name.to_string()))?;

        let at = match upto {
            None => log_head.id,
            Some(target_id) => {
                let full_history = rsl.history_for_ref(ref_name, log_head.id)?;
                full_history
                    .iter()
                    .find(|(_, r)| r.target_id == target_id)
                    .map(|(entry, _)| entry.id)
                    .ok_or_else(|| VerifyError::NoEntryForRef(ref_name.to_string()))?
            },
        };

        let history = rsl.history_for_ref(ref_name, at)?;
        if history.is_empty() {
            return Err(VerifyError::NoEntryForRef(ref_name.to_string()));
        }
        Ok(history)
    }

    /// Run the Collect-Signers → Resolve-Delegations → Evaluate-Threshold →
    /// Global-Rules steps for one RSL entry, against the policy selected for
    /// that entry specifically.
    fn verify_entry(
        &self,
        ctx: &VerificationContext,
        ref_name: &str,
        entry: &Entry,
        reference_entry: &ReferenceEntry,
        previous_target: Oid,
    ) -> Result<VerificationOutcome, VerifyError> {
        let policy = PolicyStateLoader::new(self.store).load_at(Some(entry.id), ctx.now, ctx.skip_expiry)?;
        let policy_entry_id = Rsl::new(self.store)
            .latest_for_ref(crate::policy_state::POLICY_REF, Some(entry.id))?
            .map(|(policy_entry, _)| policy_entry.id);

        let chain = resolve_chain(&policy, &Target::Ref(ref_name));

        let commit_valid_keys = self.collect_commit_signers(&policy, &chain, reference_entry.target_id)?;
        let attested_principals = self.collect_attested_principals(
            &policy,
            &chain,
            ref_name,
            previous_target,
            reference_entry.target_id,
        )?;

        for level in &chain {
            let satisfied = count_satisfied(
                &policy,
                &level.delegation.role.principal_ids,
                &commit_valid_keys,
                &attested_principals,
            );
            if satisfied < level.delegation.role.threshold {
                return Err(VerifyError::ThresholdNotMet {
                    reference: ref_name.to_string(),
                    delegation: level.delegation.name.clone(),
                    needed: level.delegation.role.threshold,
                    got: satisfied,
                });
            }
        }

        let (bfp_applied, adequate_threshold_applied) = self.evaluate_global_rules(
            ctx,
            &policy,
            ref_name,
            previous_target,
            reference_entry.target_id,
            &commit_valid_keys,
            &attested_principals,
        )?;

        Ok(VerificationOutcome {
            ref_name: ref_name.to_string(),
            target_id: reference_entry.target_id,
            rsl_entry_id: entry.id,
            levels_satisfied: chain.len(),
            bfp_applied,
            adequate_threshold_applied,
            policy_entry_id,
        })
    }

    fn collect_commit_signers(
        &self,
        policy: &PolicyState,
        chain: &[ResolvedLevel],
        target_id: Oid,
    ) -> Result<BTreeSet<String>, VerifyError> {
        let mut keys = Vec::new();
        for level in chain {
            for id in &level.delegation.role.principal_ids {
                if let Some(p) = policy.resolve_principal(id) {
                    keys.extend(p.keys().into_iter().cloned());
                }
            }
        }
        keys.sort_by(|a, b| a.id().cmp(b.id()));
        keys.dedup_by(|a, b| a.id() == b.id());

        let mut valid = BTreeSet::new();
        for key in &keys {
            if verify_target_signature(self.store, target_id, key)? {
                valid.insert(key.id().to_string());
            }
        }
        Ok(valid)
    }

    fn collect_attested_principals(
        &self,
        policy: &PolicyState,
        chain: &[ResolvedLevel],
        ref_name: &str,
        from_id: Oid,
        target_id: Oid,
    ) -> Result<BTreeSet<String>, VerifyError> {
        let attestations = AttestationsStore::new(self.store);
        let envelopes = attestations.find(
            &AttestationKind::ReferenceAuthorization,
            ref_name,
            &from_id.to_string(),
            &target_id.to_string(),
        )?;
        if envelopes.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut acceptable: Vec<Principal> = Vec::new();
        for level in chain {
            for id in &level.delegation.role.principal_ids {
                if let Some(p) = policy.resolve_principal(id) {
                    acceptable.push(p);
                }
            }
        }
        acceptable.sort_by(|a, b| a.id().cmp(b.id()));
        acceptable.dedup_by(|a, b| a.id() == b.id());

        let mut satisfied = BTreeSet::new();
        for envelope in &envelopes {
            satisfied.extend(envelope.verify_threshold(&acceptable, 1).unwrap_or_default());
        }
        Ok(satisfied)
    }

    /// Evaluates every global rule matching `ref_name` for one entry, and
    /// reports which of the two rule families that VSA levels are derived
    /// from (spec §4.10) actually applied: whether a `BlockForcePushes` rule
    /// was in force for this entry, and whether a `Threshold` rule with
    /// `threshold >= 2` was in force for it.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_global_rules(
        &self,
        ctx: &VerificationContext,
        policy: &PolicyState,
        ref_name: &str,
        previous_target: Oid,
        new_target: Oid,
        commit_valid_keys: &BTreeSet<String>,
        attested_principals: &BTreeSet<String>,
    ) -> Result<(bool, bool), VerifyError> {
        let mut bfp_applied = false;
        let mut adequate_threshold_applied = false;

        for rule in &policy.root.global_rules {
            if !rule.matches_ref(ref_name) {
                continue;
            }
            match rule {
                GlobalRule::Threshold { threshold, name, .. } => {
                    let all_ids: Vec<String> = policy
                        .root
                        .principals
                        .keys()
                        .cloned()
                        .collect();
                    let satisfied = count_satisfied(
                        policy,
                        &all_ids.into_iter().collect(),
                        commit_valid_keys,
                        attested_principals,
                    );
                    if satisfied < *threshold {
                        return Err(VerifyError::GlobalThresholdNotMet {
                            rule: name.clone(),
                            needed: *threshold,
                            got: satisfied,
                        });
                    }
                    if *threshold >= 2 {
                        adequate_threshold_applied = true;
                    }
                },
                GlobalRule::BlockForcePushes { name, .. } => {
                    if previous_target.is_zero() || ctx.developer_mode {
                        continue;
                    }
                    let tag_exempt = ctx.allow_force_push_on_tags && ref_name.starts_with("refs/tags/");
                    if tag_exempt {
                        continue;
                    }
                    bfp_applied = true;
                    let ancestors = self.store.walk_first_parents(new_target)?;
                    if !ancestors.contains(&previous_target) {
                        return Err(VerifyError::ForcePushBlocked(name.clone()));
                    }
                },
            }
        }
        Ok((bfp_applied, adequate_threshold_applied))
    }
}

fn count_satisfied(
    policy: &PolicyState,
    principal_ids: &std::collections::BTreeSet<String>,
    commit_valid_keys: &BTreeSet<String>,
    attested_principals: &BTreeSet<String>,
) -> usize {
    let resolve = |id: &str| policy.resolve_principal(id);
    principal_ids
        .iter()
        .filter(|id| {
            attested_principals.contains(id.as_str())
                || resolve(id)
                    .map(|p| p.is_satisfied(commit_valid_keys, &resolve))
                    .unwrap_or(false)
        })
        .count()
}
