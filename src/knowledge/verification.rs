//! Alignment verification policy — the plug-in point that decides whether
//! a proposed knowledge graph update is accepted, accepted-pending-review,
//! or rejected.
//!
//! Grounded the same way [`crate::server::agent_executor::AgentExecutor`]
//! generalizes "what the agent does" behind a trait: the knowledge store
//! applies patches mechanically, and a separate `VerificationPolicy` is
//! consulted first so callers can swap in organization-specific alignment
//! rules without touching the store.

use async_trait::async_trait;

use crate::knowledge::types::{KnowledgeUpdateParams, VerificationStatus};

/// Decides whether a batch of knowledge graph mutations may be applied.
///
/// Verdicts are per-mutation — spec.md §4.3 requires verification to be able
/// to "reject individual patches or the whole batch", with a batch that is
/// only partially rejected surfacing as a non-fatal `success=false` result
/// rather than an `AlignmentViolationError`. A policy that only ever judges
/// a batch as a whole (e.g. [`AlwaysVerified`]) returns the same verdict for
/// every mutation; policies that inspect individual statements (e.g.
/// [`MinimumCertaintyPolicy`]) return a distinct verdict per index.
#[async_trait]
pub trait VerificationPolicy: Send + Sync {
    /// Evaluate an update request before any of its mutations are applied.
    ///
    /// Returns exactly one [`VerificationStatus`] per entry in
    /// `params.mutations`, in the same order. A mutation verdicted
    /// [`VerificationStatus::Rejected`] is excluded from application; the
    /// caller applies the rest and reports the rejection(s) via
    /// `UpdateResult::verification_details`. If every mutation is rejected,
    /// the caller treats the whole batch as rejected
    /// (`AlignmentViolationError`) and applies nothing.
    ///
    /// Implementations may inspect `params.justification`,
    /// `params.source_agent_id`, and the mutations themselves.
    async fn verify(&self, params: &KnowledgeUpdateParams) -> Vec<VerificationStatus>;
}

/// Default policy: accepts every update. Suitable for development and for
/// deployments that perform alignment review out of band.
#[derive(Debug, Clone, Default)]
pub struct AlwaysVerified;

#[async_trait]
impl VerificationPolicy for AlwaysVerified {
    async fn verify(&self, params: &KnowledgeUpdateParams) -> Vec<VerificationStatus> {
        vec![VerificationStatus::Verified; params.mutations.len()]
    }
}

/// Policy that rejects any mutation whose statement carries a certainty
/// below a configured threshold, and otherwise accepts — judged per
/// mutation, so a batch mixing low- and high-certainty statements is
/// partially applied rather than rejected outright.
///
/// Useful as a starting point for stricter deployments and as a concrete
/// example for implementing custom policies.
#[derive(Debug, Clone)]
pub struct MinimumCertaintyPolicy {
    /// The minimum `certainty` a statement may carry. Statements with no
    /// certainty specified are treated as fully certain and always pass.
    pub minimum: f64,
}

impl MinimumCertaintyPolicy {
    /// Create a policy rejecting statements below `minimum` certainty.
    pub fn new(minimum: f64) -> Self {
        Self {
            minimum: minimum.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl VerificationPolicy for MinimumCertaintyPolicy {
    async fn verify(&self, params: &KnowledgeUpdateParams) -> Vec<VerificationStatus> {
        params
            .mutations
            .iter()
            .map(|mutation| match mutation.statement.certainty {
                Some(certainty) if certainty < self.minimum => VerificationStatus::Rejected(
                    format!(
                        "statement certainty {certainty} below required minimum {}",
                        self.minimum
                    ),
                ),
                _ => VerificationStatus::Verified,
            })
            .collect()
    }
}
