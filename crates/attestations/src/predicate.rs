//! In-toto predicate bodies carried by an [`crate::statement::Statement`]
//! (spec §3.6).

use serde::{Deserialize, Serialize};

pub const REFERENCE_AUTHORIZATION_PREDICATE: &str =
    "https://gittuf.dev/reference-authorization/v0.2";
pub const CODE_REVIEW_APPROVAL_PREDICATE: &str = "https://gittuf.dev/code-review-approval/v0.2";
pub const HOOK_EXECUTION_REPORT_PREDICATE: &str = "https://gittuf.dev/hook-execution-report/v0.1";

/// A collaborator's pre-authorization of a reference update before it is
/// pushed, letting a threshold be met out-of-band from commit signatures
/// (spec §3.6, §4.7).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceAuthorization {
    pub target_ref: String,
    pub from_id: String,
    pub target_id: String,
}

/// A recorded code-review approval from an external forge (spec §3.6),
/// normalised to the same `(fromID, targetID)` addressing as a reference
/// authorization so the verifier can treat both uniformly.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReviewApproval {
    pub target_ref: String,
    pub from_id: String,
    pub target_id: String,
    /// The forge's own identifier for the review (eg. a GitHub review ID).
    pub review_id: String,
    /// Every principal who approved this review, not just the single
    /// submitter — lets one code-review-approval attestation carry a whole
    /// forge review thread's worth of approvals toward a threshold.
    pub approvers: Vec<String>,
}

/// The result of running a repository hook against a reference update
/// (spec §3.6, §4.9 global-rule hook evaluation).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookExecutionReport {
    pub hook_name: String,
    pub target_ref: String,
    pub target_id: String,
    pub exit_code: i32,
    pub stdout: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    ReferenceAuthorization(ReferenceAuthorization),
    CodeReviewApproval(CodeReviewApproval),
    HookExecutionReport(HookExecutionReport),
}

impl Predicate {
    pub fn predicate_type(&self) -> &'static str {
        match self {
            Predicate::ReferenceAuthorization(_) => REFERENCE_AUTHORIZATION_PREDICATE,
            Predicate::CodeReviewApproval(_) => CODE_REVIEW_APPROVAL_PREDICATE,
            Predicate::HookExecutionReport(_) => HOOK_EXECUTION_REPORT_PREDICATE,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Predicate::ReferenceAuthorization(p) => serde_json::to_value(p),
            Predicate::CodeReviewApproval(p) => serde_json::to_value(p),
            Predicate::HookExecutionReport(p) => serde_json::to_value(p),
        }
        .expect("predicate bodies serialize infallibly")
    }
}
