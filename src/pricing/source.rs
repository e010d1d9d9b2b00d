//! Tiers 1, 3, and 5 of the Pricing Resolver (§4.2): the live lookup seam,
//! family-estimate math, and the hard-coded fallback table. Grounded on the
//! price-estimation tier cascade pattern (live quote → derived estimate →
//! static default) seen in the pack's pricing-estimation reference code.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PricingError;
use crate::types::{Architecture, CandidateInstance, Mode};

/// A live cloud pricing catalog lookup. The engine is fully testable without
/// one configured — `PricingResolver` falls through to tier 3 onward.
#[async_trait]
pub trait LivePriceSource: Send + Sync {
    async fn fetch_price(
        &self,
        instance_type: &str,
        mode: Mode,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<f64, PricingError>;

    async fn list_types(&self, architecture: Architecture, cancel: &CancellationToken)
        -> Result<Vec<CandidateInstance>, PricingError>;
}

/// Always-fails live source, used when no catalog integration is configured.
/// Every lookup falls straight through to cache/estimate/hardcoded tiers.
pub struct NoLiveSource;

#[async_trait]
impl LivePriceSource for NoLiveSource {
    async fn fetch_price(
        &self,
        _instance_type: &str,
        _mode: Mode,
        _region: &str,
        _cancel: &CancellationToken,
    ) -> Result<f64, PricingError> {
        Err(PricingError::Transient("no live pricing source configured".into()))
    }

    async fn list_types(
        &self,
        _architecture: Architecture,
        _cancel: &CancellationToken,
    ) -> Result<Vec<CandidateInstance>, PricingError> {
        Err(PricingError::Transient("no live pricing source configured".into()))
    }
}

/// Base on-demand hourly price for a family's smallest common reference size,
/// used as the multiplier base for tier 3 (family estimate).
pub fn family_base_price(family: &str) -> Option<f64> {
    let table: &[(&str, f64)] = &[
        ("m5", 0.192),
        ("m6i", 0.192),
        ("m6g", 0.154),
        ("m7g", 0.163),
        ("c5", 0.170),
        ("c6i", 0.170),
        ("c6g", 0.136),
        ("r5", 0.252),
        ("r6i", 0.252),
        ("r6g", 0.2016),
        ("t3", 0.0416),
        ("t4g", 0.0336),
        ("a1", 0.102),
    ];
    table
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, p)| *p)
}

/// Multiplier applied to a family's base price for a given `.size` suffix.
/// Base size is `large` (factor 1.0); everything else scales by halving or
/// doubling steps, per §4.2.
pub fn size_factor(size: &str) -> Option<f64> {
    let factor = match size {
        "nano" => 0.0625,
        "micro" => 0.125,
        "small" => 0.25,
        "medium" => 0.5,
        "large" => 1.0,
        "xlarge" => 2.0,
        "2xlarge" => 4.0,
        "3xlarge" => 6.0,
        "4xlarge" => 8.0,
        "6xlarge" => 12.0,
        "8xlarge" => 16.0,
        "9xlarge" => 18.0,
        "12xlarge" => 24.0,
        "16xlarge" => 32.0,
        "18xlarge" => 36.0,
        "24xlarge" => 48.0,
        "32xlarge" => 64.0,
        "48xlarge" => 96.0,
        _ => return None,
    };
    Some(factor)
}

/// Splits `"m6g.2xlarge"` into `("m6g", "2xlarge")`.
pub fn split_instance_type(instance_type: &str) -> Option<(&str, &str)> {
    instance_type.split_once('.')
}

/// Tier 3: family-estimate price for an on-demand quote.
pub fn family_estimate_price(instance_type: &str) -> Option<f64> {
    let (family, size) = split_instance_type(instance_type)?;
    let base = family_base_price(family)?;
    let factor = size_factor(size)?;
    Some(base * factor)
}

/// Tier 5: a small static table covering the most common modern families,
/// keyed by full instance type, for the rare case an instance type doesn't
/// even parse as `{family}.{size}`.
pub fn hardcoded_price(instance_type: &str) -> Option<f64> {
    let table: &[(&str, f64)] = &[
        ("m5.large", 0.096),
        ("m5.xlarge", 0.192),
        ("m6g.large", 0.077),
        ("m6g.xlarge", 0.154),
        ("c5.large", 0.085),
        ("c6g.large", 0.068),
        ("r5.large", 0.126),
        ("t3.micro", 0.0104),
        ("t3.small", 0.0208),
        ("t4g.micro", 0.0084),
    ];
    table
        .iter()
        .find(|(t, _)| *t == instance_type)
        .map(|(_, p)| *p)
        .or_else(|| family_estimate_price(instance_type))
}

/// Spot-price rule (§4.2): derived from the on-demand price when no direct
/// spot quote is obtainable.
pub fn derive_spot_price(on_demand_price: f64) -> f64 {
    on_demand_price * 0.25
}

/// Built-in instance catalog used when no live catalog is reachable (§4.2,
/// §4.3). Excludes GPU families (`p`, `g`, `inf`, `trn` prefixes) since the
/// engine never recommends GPU capacity.
pub fn builtin_catalog(architecture: Architecture) -> Vec<CandidateInstance> {
    let all: &[(&str, f64, f64, Architecture, &str, bool)] = &[
        ("m5.large", 2.0, 8.0, Architecture::Amd64, "m5", false),
        ("m5.xlarge", 4.0, 16.0, Architecture::Amd64, "m5", false),
        ("m5.2xlarge", 8.0, 32.0, Architecture::Amd64, "m5", false),
        ("c5.large", 2.0, 4.0, Architecture::Amd64, "c5", false),
        ("c5.xlarge", 4.0, 8.0, Architecture::Amd64, "c5", false),
        ("c5.2xlarge", 8.0, 16.0, Architecture::Amd64, "c5", false),
        ("r5.large", 2.0, 16.0, Architecture::Amd64, "r5", false),
        ("r5.xlarge", 4.0, 32.0, Architecture::Amd64, "r5", false),
        ("t3.medium", 2.0, 4.0, Architecture::Amd64, "t3", false),
        ("t3.large", 2.0, 8.0, Architecture::Amd64, "t3", false),
        ("m6g.large", 2.0, 8.0, Architecture::Arm64, "m6g", false),
        ("m6g.xlarge", 4.0, 16.0, Architecture::Arm64, "m6g", false),
        ("m6g.2xlarge", 8.0, 32.0, Architecture::Arm64, "m6g", false),
        ("c6g.large", 2.0, 4.0, Architecture::Arm64, "c6g", false),
        ("c6g.xlarge", 4.0, 8.0, Architecture::Arm64, "c6g", false),
        ("r6g.large", 2.0, 16.0, Architecture::Arm64, "r6g", false),
        ("t4g.medium", 2.0, 4.0, Architecture::Arm64, "t4g", false),
    ];
    all.iter()
        .filter(|(_, _, _, arch, _, _)| *arch == architecture)
        .map(
            |(instance_type, cpu_cores, mem_gib, architecture, family, is_gpu)| CandidateInstance {
                instance_type: instance_type.to_string(),
                cpu_cores: *cpu_cores,
                mem_gib: *mem_gib,
                architecture: *architecture,
                family: family.to_string(),
                is_gpu: *is_gpu,
            },
        )
        .collect()
}
