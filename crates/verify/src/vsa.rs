//! Verification summary attestation generator (C10, spec §4.10): turns
//! verified entries into signed in-toto statements a downstream consumer
//! (CI gate, another gittuf repository) can check instead of re-running
//! verification itself.

use gittuf_attestations::{Statement, Subject};
use gittuf_crypto::{Envelope, Signer};

use crate::verifier::VerificationOutcome;

pub const VSA_PREDICATE_TYPE: &str = "https://slsa.dev/verification_summary/v1";

/// The SLSA source-level label for one verified entry (spec §4.10),
/// derived from which of the two global-rule families actually applied:
/// `BlockForcePushes` and a `Threshold` rule with `threshold >= 2`.
pub fn slsa_source_level(bfp_applied: bool, adequate_threshold_applied: bool) -> &'static str {
    match (bfp_applied, adequate_threshold_applied) {
        (true, true) => "SLSA_SOURCE_LEVEL_4",
        (true, false) => "SLSA_SOURCE_LEVEL_3",
        (false, _) => "SLSA_SOURCE_LEVEL_1",
    }
}

fn level_rank(level: &str) -> u8 {
    match level {
        "SLSA_SOURCE_LEVEL_4" => 4,
        "SLSA_SOURCE_LEVEL_3" => 3,
        _ => 1,
    }
}

pub struct VsaGenerator;

impl VsaGenerator {
    /// Build and sign a verification summary attestation for a single
    /// verified entry.
    pub fn generate(
        outcome: &VerificationOutcome,
        signer: &impl Signer,
    ) -> Result<Envelope, crate::error::VerifyError> {
        Self::build(
            &outcome.ref_name,
            outcome.target_id,
            outcome.rsl_entry_id,
            slsa_source_level(outcome.bfp_applied, outcome.adequate_threshold_applied),
            signer,
        )
    }

    /// Build one VSA per contiguous run of verified entries sharing the
    /// same policy state, plus a final meta-VSA summarizing the whole range
    /// with the minimum level observed across it (spec §4.10).
    ///
    /// `outcomes` must be ordered oldest-first, as returned by
    /// [`crate::verifier::Verifier::verify_range`]. Returns an empty vec for
    /// an empty range.
    pub fn generate_range(
        outcomes: &[VerificationOutcome],
        signer: &impl Signer,
    ) -> Result<Vec<Envelope>, crate::error::VerifyError> {
        if outcomes.is_empty() {
            return Ok(Vec::new());
        }

        let mut envelopes = Vec::new();
        let mut run_start = 0;
        let mut min_level = "SLSA_SOURCE_LEVEL_4";

        for i in 0..=outcomes.len() {
            let run_ends_here = i == outcomes.len() || outcomes[i].policy_entry_id != outcomes[run_start].policy_entry_id;
            if run_ends_here {
                let run = &outcomes[run_start..i];
                let final_entry = run.last().expect("run is non-empty");
                let level = slsa_source_level(final_entry.bfp_applied, final_entry.adequate_threshold_applied);
                if level_rank(level) < level_rank(min_level) {
                    min_level = level;
                }
                envelopes.push(Self::build(
                    &final_entry.ref_name,
                    final_entry.target_id,
                    final_entry.rsl_entry_id,
                    level,
                    signer,
                )?);
                run_start = i;
            }
        }

        let last = outcomes.last().expect("checked non-empty above");
        envelopes.push(Self::build(
            &last.ref_name,
            last.target_id,
            last.rsl_entry_id,
            min_level,
            signer,
        )?);
        Ok(envelopes)
    }

    fn build(
        ref_name: &str,
        target_id: gittuf_store::Oid,
        rsl_entry_id: gittuf_store::Oid,
        level: &str,
        signer: &impl Signer,
    ) -> Result<Envelope, crate::error::VerifyError> {
        let subject = vec![Subject {
            name: ref_name.to_string(),
            digest: [("gitCommit".to_string(), target_id.to_string())].into(),
        }];
        let predicate = serde_json::json!({
            "verifier": { "id": "gittuf" },
            "timeVerified": chrono::Utc::now().to_rfc3339(),
            "resourceUri": ref_name,
            "policy": { "uri": "refs/gittuf/policy" },
            "verificationResult": "PASSED",
            "verifiedLevels": [level],
        });

        let statement = Statement {
            statement_type: gittuf_attestations::statement::STATEMENT_TYPE.to_string(),
            subject,
            predicate_type: VSA_PREDICATE_TYPE.to_string(),
            predicate,
        };

        let mut envelope = Envelope::new(
            "application/vnd.in-toto+json",
            gittuf_canonical::Canonical::canonical_bytes(&statement)?,
        );
        envelope
            .sign(signer)
            .map_err(|_| crate::error::VerifyError::UnsignedCommit(rsl_entry_id))?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_level_from_applied_rules() {
        assert_eq!(slsa_source_level(false, false), "SLSA_SOURCE_LEVEL_1");
        assert_eq!(slsa_source_level(false, true), "SLSA_SOURCE_LEVEL_1");
        assert_eq!(slsa_source_level(true, false), "SLSA_SOURCE_LEVEL_3");
        assert_eq!(slsa_source_level(true, true), "SLSA_SOURCE_LEVEL_4");
    }

    fn outcome(policy_entry_id: Option<gittuf_store::Oid>, bfp: bool, adequate: bool) -> VerificationOutcome {
        let bytes = [1u8; 20];
        let oid = gittuf_store::Oid::try_from(bytes.as_slice()).unwrap();
        VerificationOutcome {
            ref_name: "refs/heads/main".to_string(),
            target_id: oid,
            rsl_entry_id: oid,
            levels_satisfied: 1,
            bfp_applied: bfp,
            adequate_threshold_applied: adequate,
            policy_entry_id,
        }
    }

    #[test]
    fn generate_range_splits_on_policy_change_and_adds_meta_vsa() {
        use gittuf_crypto::signer::InMemorySigner;

        let bytes_a = [2u8; 20];
        let bytes_b = [3u8; 20];
        let policy_a = gittuf_store::Oid::try_from(bytes_a.as_slice()).unwrap();
        let policy_b = gittuf_store::Oid::try_from(bytes_b.as_slice()).unwrap();

        let outcomes = vec![
            outcome(Some(policy_a), true, true),
            outcome(Some(policy_a), true, true),
            outcome(Some(policy_b), true, false),
        ];

        let signer = InMemorySigner::generate();
        let envelopes = VsaGenerator::generate_range(&outcomes, &signer).unwrap();
        // Two same-policy runs + one meta-VSA.
        assert_eq!(envelopes.len(), 3);

        let statement: Statement = serde_json::from_slice(&envelopes[2].payload).unwrap();
        assert_eq!(
            statement.predicate["verifiedLevels"][0],
            serde_json::json!("SLSA_SOURCE_LEVEL_3")
        );
    }

    #[test]
    fn generate_range_empty_produces_nothing() {
        let signer = gittuf_crypto::signer::InMemorySigner::generate();
        assert!(VsaGenerator::generate_range(&[], &signer).unwrap().is_empty());
    }
}
