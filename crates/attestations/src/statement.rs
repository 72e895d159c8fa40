//! An in-toto v1 statement: the typed, subject-bearing payload carried
//! inside an [`gittuf_crypto::Envelope`] (spec §3.6).

use serde::{Deserialize, Serialize};

use crate::error::AttestationError;
use crate::predicate::Predicate;

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub digest: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<Subject>,
    pub predicate_type: String,
    pub predicate: serde_json::Value,
}

impl Statement {
    pub fn new(subject: Vec<Subject>, predicate: &Predicate) -> Self {
        Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject,
            predicate_type: predicate.predicate_type().to_string(),
            predicate: predicate.to_json(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AttestationError> {
        Ok(gittuf_canonical::Canonical::canonical_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AttestationError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn reference_authorization(&self) -> Option<crate::predicate::ReferenceAuthorization> {
        if self.predicate_type != crate::predicate::REFERENCE_AUTHORIZATION_PREDICATE {
            return None;
        }
        serde_json::from_value(self.predicate.clone()).ok()
    }

    pub fn code_review_approval(&self) -> Option<crate::predicate::CodeReviewApproval> {
        if self.predicate_type != crate::predicate::CODE_REVIEW_APPROVAL_PREDICATE {
            return None;
        }
        serde_json::from_value(self.predicate.clone()).ok()
    }
}
