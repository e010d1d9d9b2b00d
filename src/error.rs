//! Error kinds for the recommendation engine (§7).
//!
//! `SearchNoImprovement` is deliberately absent: the spec treats it as a
//! normal boundary outcome (no Recommendation emitted), not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cluster port unavailable: {0}")]
    ClusterUnavailable(String),

    #[error("all pricing tiers exhausted for {instance_type} ({mode})")]
    PricingExhausted { instance_type: String, mode: String },

    #[error("learning store I/O failure: {0}")]
    LearningIoFailure(String),

    #[error("NL enrichment failed: {0}")]
    NlEnrichmentFailure(String),

    #[error("NL enrichment timed out after {0:?}")]
    NlEnrichmentTimeout(std::time::Duration),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error fails the whole batch request, per §7's propagation
    /// policy. Only `ClusterUnavailable` (before any NodePool is processed)
    /// and `Cancelled` do; everything else is recovered locally and logged.
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, EngineError::ClusterUnavailable(_) | EngineError::Cancelled)
    }
}

/// Error kind surfaced by a Price Source implementation (§6).
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("transient pricing source failure: {0}")]
    Transient(String),
    #[error("permanent pricing source failure: {0}")]
    Permanent(String),
}

impl PricingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PricingError::Transient(_))
    }
}
