//! Verification options resolving the spec's open questions into explicit,
//! caller-set flags rather than hardcoded behavior (see DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::VerifyError;

/// A cooperative cancellation signal (spec §5: "every long-running
/// operation accepts a cancellation signal checked before each RSL
/// iteration step and before each external signer call"). Cloning shares
/// the same underlying flag, so a caller can hold one handle and cancel
/// a verification running on another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`VerifyError::Cancelled`] if this token has been cancelled.
    pub fn check(&self) -> Result<(), VerifyError> {
        if self.is_cancelled() {
            Err(VerifyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationContext {
    /// The instant expiry is checked against. Tests fix this; production
    /// callers pass `Utc::now()`.
    pub now: DateTime<Utc>,
    /// Bypass root/targets `expires` checks entirely.
    pub skip_expiry: bool,
    /// Allow non-fast-forward transitions on `refs/tags/*` even when a
    /// `BlockForcePushes` global rule matches them. Tags are conventionally
    /// mutable release pointers in many workflows; gittuf's global rule
    /// defaults to strict, so this is opt-in.
    pub allow_force_push_on_tags: bool,
    /// Dry-run: verification runs its full checks but must not persist any
    /// side effect (cache updates, VSA generation) — for previewing a
    /// verification result without committing to it.
    pub eval_mode: bool,
    /// Relax `BlockForcePushes` globally for local iteration, distinct from
    /// (and in addition to) `allow_force_push_on_tags`. Intended for a
    /// developer's own working clone, never for the authoritative copy of a
    /// repository.
    pub developer_mode: bool,
    /// Checked before each RSL iteration step and before each external
    /// signer call during range verification.
    pub cancellation: Option<CancellationToken>,
}

impl VerificationContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            skip_expiry: false,
            allow_force_push_on_tags: false,
            eval_mode: false,
            developer_mode: false,
            cancellation: None,
        }
    }

    pub fn with_skip_expiry(mut self, skip: bool) -> Self {
        self.skip_expiry = skip;
        self
    }

    pub fn with_allow_force_push_on_tags(mut self, allow: bool) -> Self {
        self.allow_force_push_on_tags = allow;
        self
    }

    pub fn with_eval_mode(mut self, eval_mode: bool) -> Self {
        self.eval_mode = eval_mode;
        self
    }

    pub fn with_developer_mode(mut self, developer_mode: bool) -> Self {
        self.developer_mode = developer_mode;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Checks the cancellation token, if one is set.
    pub fn check_cancelled(&self) -> Result<(), VerifyError> {
        match &self.cancellation {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}
