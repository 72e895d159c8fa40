use serde::{Deserialize, Serialize};

/// An upstream-to-downstream content mirroring directive (spec §3.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Propagation {
    pub upstream_repository: String,
    pub upstream_reference: String,
    pub upstream_path_prefix: String,
    pub downstream_reference: String,
    pub downstream_path_prefix: String,
}

/// A per-stage hook descriptor (spec §3.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hook {
    pub stage: HookStage,
    pub binary_hash: String,
    pub environment: String,
    pub allowed_principal_ids: Vec<String>,
    pub timeout_seconds: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookStage {
    PreCommit,
    PrePush,
}

/// A federated external root of trust (spec §3.3
/// `controller_repositories`/`network_repositories`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederatedRoot {
    pub name: String,
    pub location: String,
}
