//! Recommendation Assembler (§4.6): runs the Search Engine for both modes and
//! hands the raw per-mode survivors to the Strategy Overlay, which picks the
//! final winner. Grounded on the teacher's `inspections/resources.rs`
//! before/after comparison + finding-text pattern.

use tokio_util::sync::CancellationToken;

use crate::catalog::InstanceCatalog;
use crate::pricing::PricingResolver;
use crate::search::{search, PricedCandidate, SearchCandidate};
use crate::types::{CandidateInstance, Demand, Mode, NodePool, Recommendation};

/// Both modes' raw Search Engine survivors for one NodePool, pre cost-guard
/// and pre savings-floor. The Strategy Overlay consumes this directly so
/// that "mode bias" never needs a second Search invocation — both possible
/// pinned-mode answers are already here.
pub struct SearchResults {
    pub spot: Option<SearchCandidate>,
    pub on_demand: Option<SearchCandidate>,
}

impl SearchResults {
    pub fn for_mode(&self, mode: Mode) -> Option<&SearchCandidate> {
        match mode.effective() {
            Mode::Spot => self.spot.as_ref(),
            _ => self.on_demand.as_ref(),
        }
    }

    fn cheaper(&self) -> Option<(Mode, &SearchCandidate)> {
        match (&self.spot, &self.on_demand) {
            (Some(s), Some(o)) => Some(if s.total_cost <= o.total_cost {
                (Mode::Spot, s)
            } else {
                (Mode::OnDemand, o)
            }),
            (Some(s), None) => Some((Mode::Spot, s)),
            (None, Some(o)) => Some((Mode::OnDemand, o)),
            (None, None) => None,
        }
    }
}

/// Runs the Search Engine for both spot and on-demand against the catalog
/// filtered for this NodePool's demanded architecture (§4.5, §4.6 steps 1–2).
pub async fn compute_search_results(
    node_pool: &NodePool,
    demand: &Demand,
    resolver: &PricingResolver,
    catalog: &InstanceCatalog,
    headroom_cpu: f64,
    headroom_mem: f64,
    max_recommended_nodes: u32,
    cancel: &CancellationToken,
) -> SearchResults {
    let required_cpu = demand.cpu_used * (1.0 + headroom_cpu);
    let required_mem = demand.mem_used * (1.0 + headroom_mem);

    let candidate_types = catalog.list(demand.architecture, cancel).await;

    let spot_priced = price_catalog(&candidate_types, Mode::Spot, resolver, cancel).await;
    let on_demand_priced = price_catalog(&candidate_types, Mode::OnDemand, resolver, cancel).await;

    let spot = search(
        required_cpu,
        required_mem,
        demand.current_cost,
        &spot_priced,
        max_recommended_nodes,
        node_pool.min_nodes,
    );
    let on_demand = search(
        required_cpu,
        required_mem,
        demand.current_cost,
        &on_demand_priced,
        max_recommended_nodes,
        node_pool.min_nodes,
    );

    SearchResults { spot, on_demand }
}

/// Resolves a price quote for every catalog candidate under a fixed mode.
/// Candidates whose price cannot be resolved at all (all five tiers fail)
/// are dropped from the search rather than failing the whole request
/// (§7: `PricingExhausted` is local recovery).
pub async fn price_catalog(
    candidate_types: &[CandidateInstance],
    mode: Mode,
    resolver: &PricingResolver,
    cancel: &CancellationToken,
) -> Vec<PricedCandidate> {
    let mut out = Vec::with_capacity(candidate_types.len());
    for instance in candidate_types {
        if let Ok(quote) = resolver.price(&instance.instance_type, mode, cancel).await {
            out.push(PricedCandidate {
                instance: instance.clone(),
                hourly_usd: quote.hourly_usd,
            });
        }
    }
    out
}

/// Default assembly with no strategy bias: the cheaper of the two survivors,
/// subject to the guard and savings-floor (§4.6 steps 2–5).
pub fn assemble_default(
    node_pool: &NodePool,
    demand: &Demand,
    results: &SearchResults,
    cost_increase_guard: f64,
) -> Option<Recommendation> {
    let (mode, candidate) = results.cheaper()?;
    build_recommendation(node_pool, demand, mode, candidate, cost_increase_guard)
}

/// Builds the final `Recommendation` for a chosen (mode, candidate) pair,
/// applying the guard (step 3) and the positive-savings requirement (step 4).
/// Returns `None` if either rejects the survivor.
pub fn build_recommendation(
    node_pool: &NodePool,
    demand: &Demand,
    mode: Mode,
    candidate: &SearchCandidate,
    cost_increase_guard: f64,
) -> Option<Recommendation> {
    if candidate.total_cost > demand.current_cost * (1.0 + cost_increase_guard) {
        return None;
    }

    let cost_savings = demand.current_cost - candidate.total_cost;
    if cost_savings <= 0.0 {
        return None;
    }
    let cost_savings_percent = if demand.current_cost > 0.0 {
        (cost_savings / demand.current_cost) * 100.0
    } else {
        0.0
    };

    let recommended_instance_types_with_counts: Vec<String> =
        candidate.counts.iter().map(|(t, n)| format!("{t} ({n})")).collect();

    let rationale_text = render_rationale(
        node_pool,
        demand,
        &recommended_instance_types_with_counts,
        candidate.total_nodes,
        cost_savings,
        cost_savings_percent,
        mode,
    );

    Some(Recommendation {
        node_pool: node_pool.name.clone(),
        current_node_count: demand.current_node_count,
        current_instance_types_with_counts: demand.current_instance_types_with_counts.clone(),
        current_cost: demand.current_cost,
        recommended_nodes: candidate.total_nodes,
        recommended_instance_types_with_counts,
        recommended_total_cpu: candidate.total_cpu,
        recommended_total_mem: candidate.total_mem,
        recommended_cost: candidate.total_cost,
        cost_savings,
        cost_savings_percent,
        architecture: demand.architecture,
        capacity_type: mode,
        rationale_text,
    })
}

/// The confidence contribution from raw savings magnitude alone (§4.8,
/// "`base` confidence"), independent of the Learning Store. A recommendation
/// saving ≥50% gets the full 0.3 bonus; below that it scales linearly,
/// floored at 0.5.
pub fn base_confidence(cost_savings_percent: f64) -> f64 {
    0.5 + 0.3 * (cost_savings_percent / 50.0).clamp(0.0, 1.0)
}

fn render_rationale(
    node_pool: &NodePool,
    demand: &Demand,
    recommended_types: &[String],
    recommended_nodes: u32,
    cost_savings: f64,
    cost_savings_percent: f64,
    mode: Mode,
) -> String {
    format!(
        "{}: {} nodes ({}) → {} nodes ({}) on {}, saving ${:.2}/hr ({:.1}%)",
        node_pool.name,
        demand.current_node_count,
        demand.current_instance_types_with_counts.join(", "),
        recommended_nodes,
        recommended_types.join(", "),
        mode,
        cost_savings,
        cost_savings_percent,
    )
}
