//! Optional natural-language enrichment seam (§4.2 tier 4, §4.8 step 5).
//! Entirely optional: the engine is fully functional with no `NlEnricher`
//! configured, the same way the teacher's report generation works with or
//! without its markdown renderer wired in.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Deadline applied independently to every NL call (§5).
pub const NL_DEADLINE: Duration = Duration::from_secs(30);

#[async_trait]
pub trait NlEnricher: Send + Sync {
    /// Ask the backend for a numeric hourly-price estimate for an instance
    /// type it has not seen priced live or cached (§4.2 tier 4). Returns the
    /// parsed dollar figure.
    async fn estimate_hourly_price(
        &self,
        instance_type: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<f64, EngineError>;

    /// Produce a human-friendly rationale for a single recommendation,
    /// replacing the deterministic template (§4.6 step 5, §4.8 step 5).
    async fn enrich_rationale(
        &self,
        templated_text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError>;
}

/// Parses the first recognizable currency figure out of free text, e.g.
/// `"approximately $0.0416 per hour"` → `0.0416`. Used by both
/// `NlEnricher` implementations and tests that stub one.
pub fn parse_currency_figure(text: &str) -> Option<f64> {
    let mut digits = String::new();
    let mut seen_digit = false;
    for ch in text.chars() {
        if ch.is_ascii_digit() || (ch == '.' && !digits.contains('.')) {
            digits.push(ch);
            if ch.is_ascii_digit() {
                seen_digit = true;
            }
        } else if seen_digit {
            break;
        } else {
            digits.clear();
        }
    }
    if !seen_digit {
        return None;
    }
    digits.parse::<f64>().ok()
}
