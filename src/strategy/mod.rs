//! Strategy Overlay (§4.7): a closed, finite set of filters over the
//! Assembler's per-mode survivors. Expressed as a tagged enum rather than an
//! open string dispatch, per the redesign direction to close over the fixed
//! strategy set instead of matching on strategy names ad hoc. Grounded on the
//! teacher's `cli/mod.rs::InspectionType` `FromStr` fallback pattern.

use std::str::FromStr;

use crate::recommend::{base_confidence, build_recommendation, SearchResults};
use crate::types::{Demand, Mode, NodePool, Recommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Aggressive,
    Balanced,
    Conservative,
    SpotFirst,
    RightSize,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Aggressive => "aggressive",
            Strategy::Balanced => "balanced",
            Strategy::Conservative => "conservative",
            Strategy::SpotFirst => "spot-first",
            Strategy::RightSize => "right-size",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = std::convert::Infallible;

    /// Unknown strategy names fall back to `balanced` (§4.7) rather than
    /// erroring, mirroring the teacher's `InspectionType::from_str` default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "aggressive" => Strategy::Aggressive,
            "conservative" => Strategy::Conservative,
            "spot-first" => Strategy::SpotFirst,
            "right-size" => Strategy::RightSize,
            _ => Strategy::Balanced,
        })
    }
}

/// Applies a strategy's mode bias, savings floor, confidence floor, and any
/// additional rule (§4.7's table) to a NodePool's already-computed search
/// results. "Mode bias" never re-invokes the Search Engine: both possible
/// pinned-mode answers are already in `results`, so biasing is just picking
/// which one to evaluate.
pub fn apply(
    strategy: Strategy,
    node_pool: &NodePool,
    demand: &Demand,
    results: &SearchResults,
    cost_increase_guard: f64,
) -> Option<Recommendation> {
    let current_mode = demand.current_mode_mix;

    let chosen_mode = match strategy {
        Strategy::Aggressive => {
            if !matches!(current_mode, crate::types::ModeMix::Spot) && results.spot.is_some() {
                Mode::Spot
            } else {
                cheaper_mode(results)?
            }
        }
        Strategy::Balanced => cheaper_mode(results)?,
        Strategy::Conservative => keep_current_mode(current_mode),
        Strategy::SpotFirst => Mode::Spot,
        Strategy::RightSize => keep_current_mode(current_mode),
    };

    let candidate = results.for_mode(chosen_mode)?;
    let rec = build_recommendation(node_pool, demand, chosen_mode, candidate, cost_increase_guard)?;

    let confidence = base_confidence(rec.cost_savings_percent);

    let (savings_floor, confidence_floor) = match strategy {
        Strategy::Aggressive => (10.0, 0.0),
        Strategy::Balanced => (15.0, 0.6),
        Strategy::Conservative => (20.0, 0.8),
        Strategy::SpotFirst => (0.0, 0.0),
        Strategy::RightSize => (10.0, 0.0),
    };

    if rec.cost_savings_percent < savings_floor || confidence < confidence_floor {
        return None;
    }

    match strategy {
        Strategy::SpotFirst if rec.capacity_type != Mode::Spot => return None,
        Strategy::RightSize if rec.recommended_nodes >= demand.current_node_count => return None,
        _ => {}
    }

    Some(rec)
}

fn cheaper_mode(results: &SearchResults) -> Option<Mode> {
    match (&results.spot, &results.on_demand) {
        (Some(s), Some(o)) => Some(if s.total_cost <= o.total_cost { Mode::Spot } else { Mode::OnDemand }),
        (Some(_), None) => Some(Mode::Spot),
        (None, Some(_)) => Some(Mode::OnDemand),
        (None, None) => None,
    }
}

fn keep_current_mode(current_mode: crate::types::ModeMix) -> Mode {
    match current_mode {
        crate::types::ModeMix::Spot => Mode::Spot,
        _ => Mode::OnDemand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchCandidate;
    use crate::types::{Architecture, ModeMix};
    use std::collections::HashMap;

    fn demand(current_mode: ModeMix) -> Demand {
        Demand {
            node_pool: "pool-a".to_string(),
            cpu_used: 4.0,
            cpu_alloc: 8.0,
            mem_used: 16.0,
            mem_alloc: 32.0,
            current_cost: 1.0,
            current_mode_mix: current_mode,
            current_instance_types_with_counts: vec!["m5.xlarge (2)".to_string()],
            current_node_count: 2,
            architecture: Architecture::Amd64,
        }
    }

    fn pool() -> NodePool {
        NodePool {
            name: "pool-a".to_string(),
            declared_instance_types: vec![],
            declared_capacity_types: vec![],
            member_nodes: vec!["n1".to_string(), "n2".to_string()],
            taints: vec![],
            labels: HashMap::new(),
            min_nodes: None,
        }
    }

    fn results() -> SearchResults {
        SearchResults {
            spot: Some(SearchCandidate {
                counts: vec![("m6g.large".to_string(), 1)],
                total_cpu: 4.0,
                total_mem: 16.0,
                total_cost: 0.2,
                total_nodes: 1,
            }),
            on_demand: Some(SearchCandidate {
                counts: vec![("m5.large".to_string(), 1)],
                total_cpu: 4.0,
                total_mem: 16.0,
                total_cost: 0.3,
                total_nodes: 1,
            }),
        }
    }

    #[test]
    fn unknown_strategy_name_falls_back_to_balanced() {
        assert_eq!(Strategy::from_str("nonexistent").unwrap(), Strategy::Balanced);
    }

    #[test]
    fn spot_first_rejects_an_on_demand_only_survivor() {
        let mut r = results();
        r.spot = None;
        let out = apply(Strategy::SpotFirst, &pool(), &demand(ModeMix::OnDemand), &r, 0.10);
        assert!(out.is_none());
    }

    #[test]
    fn conservative_keeps_current_mode() {
        let out = apply(Strategy::Conservative, &pool(), &demand(ModeMix::OnDemand), &results(), 0.10);
        let rec = out.unwrap();
        assert_eq!(rec.capacity_type, Mode::OnDemand);
    }

    #[test]
    fn right_size_requires_a_count_reduction() {
        let mut demand = demand(ModeMix::OnDemand);
        demand.current_node_count = 1;
        let out = apply(Strategy::RightSize, &pool(), &demand, &results(), 0.10);
        assert!(out.is_none());
    }
}
