//! Capacity Computer (§4.4): turns a NodePool's member nodes and the pod
//! snapshot into a `Demand` record. Grounded on the teacher's
//! `inspections/runner.rs::fetch_cluster_overview` allocatable/usage
//! summation loop, generalized from a report metric to a priced Demand.

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::pricing::PricingResolver;
use crate::types::{Architecture, Demand, EngineWarning, Mode, ModeMix, Node, NodePool, Pod};

/// §4.4: node.mode if known, else the NodePool's declared mode, else on-demand.
pub fn effective_mode(node: &Node, node_pool: &NodePool) -> Mode {
    match node.mode {
        Mode::Unknown => node_pool.declared_mode(),
        known => known,
    }
}

/// Computes the Demand for a NodePool, or `None` if it has no member nodes
/// (step 1: "skip if member_nodes is empty"). Pricing failures for
/// individual member nodes are recovered locally: that node's cost
/// contributes zero and a warning is appended, rather than failing the
/// whole computation.
pub async fn compute_demand(
    node_pool: &NodePool,
    nodes: &[Node],
    pods: &[Pod],
    resolver: &PricingResolver,
    cancel: &CancellationToken,
) -> (Option<Demand>, Vec<EngineWarning>) {
    let mut warnings = Vec::new();

    if node_pool.member_nodes.is_empty() {
        return (None, warnings);
    }

    let members: Vec<&Node> = nodes
        .iter()
        .filter(|n| node_pool.member_nodes.contains(&n.name))
        .collect();

    if members.is_empty() {
        return (None, warnings);
    }

    let cpu_alloc: f64 = members.iter().map(|n| n.allocatable.cpu_cores).sum();
    let mem_alloc: f64 = members.iter().map(|n| n.allocatable.mem_gib).sum();

    let member_names: std::collections::HashSet<&str> = members.iter().map(|n| n.name.as_str()).collect();

    let cpu_used: f64 = pods
        .iter()
        .filter(|p| p.is_counted() && p.node_name.as_deref().is_some_and(|n| member_names.contains(n)))
        .map(|p| p.requests.cpu_cores)
        .sum();
    let mem_used: f64 = pods
        .iter()
        .filter(|p| p.is_counted() && p.node_name.as_deref().is_some_and(|n| member_names.contains(n)))
        .map(|p| p.requests.mem_gib)
        .sum();

    const CPU_USED_EPSILON: f64 = 1e-6;
    if cpu_used > cpu_alloc + CPU_USED_EPSILON {
        warnings.push(EngineWarning::new(
            Some(node_pool.name.clone()),
            "stale-snapshot",
            format!("cpu_used ({cpu_used:.3}) exceeds cpu_alloc ({cpu_alloc:.3}) for pool {}", node_pool.name),
        ));
    }

    let mut current_cost = 0.0;
    let mut spot_count = 0u32;
    let mut on_demand_count = 0u32;
    let mut type_counts: HashMap<String, u32> = HashMap::new();

    for node in &members {
        let mode = effective_mode(node, node_pool);
        match mode {
            Mode::Spot => spot_count += 1,
            _ => on_demand_count += 1,
        }
        *type_counts.entry(node.instance_type.clone()).or_insert(0) += 1;

        match resolver.price(&node.instance_type, mode, cancel).await {
            Ok(quote) => current_cost += quote.hourly_usd,
            Err(e) => {
                warnings.push(EngineWarning::new(
                    Some(node_pool.name.clone()),
                    "pricing-exhausted",
                    format!("could not price existing node {}: {e}", node.name),
                ));
            }
        }
    }

    let current_mode_mix = match (spot_count > 0, on_demand_count > 0) {
        (true, true) => ModeMix::Mixed,
        (true, false) => ModeMix::Spot,
        _ => ModeMix::OnDemand,
    };

    let mut current_instance_types_with_counts: Vec<String> = type_counts
        .into_iter()
        .map(|(t, n)| format!("{t} ({n})"))
        .collect();
    current_instance_types_with_counts.sort();

    let architecture = break_architecture_tie(&members);

    let demand = Demand {
        node_pool: node_pool.name.clone(),
        cpu_used,
        cpu_alloc,
        mem_used,
        mem_alloc,
        current_cost,
        current_mode_mix,
        current_instance_types_with_counts,
        current_node_count: members.len() as u32,
        architecture,
    };

    (Some(demand), warnings)
}

/// Majority architecture across member nodes, ties breaking to amd64.
fn break_architecture_tie(members: &[&Node]) -> Architecture {
    let amd64 = members.iter().filter(|n| n.architecture == Architecture::Amd64).count();
    let arm64 = members.iter().filter(|n| n.architecture == Architecture::Arm64).count();
    if amd64 >= arm64 {
        Architecture::Amd64
    } else {
        Architecture::Arm64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::source::NoLiveSource;
    use crate::types::{PodPhase, ResourceAmount};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn node(name: &str, instance_type: &str, mode: Mode, arch: Architecture) -> Node {
        Node {
            name: name.to_string(),
            instance_type: instance_type.to_string(),
            architecture: arch,
            mode,
            node_pool_name: Some("pool-a".to_string()),
            allocatable: ResourceAmount::new(4.0, 16.0),
            capacity: ResourceAmount::new(4.0, 16.0),
            creation_time: Utc::now(),
            zone: None,
            labels: HashMap::new(),
            taints: Vec::new(),
        }
    }

    fn pod(name: &str, node_name: &str, cpu: f64, mem: f64) -> Pod {
        Pod {
            namespace: "default".to_string(),
            name: name.to_string(),
            node_name: Some(node_name.to_string()),
            phase: PodPhase::Running,
            requests: ResourceAmount::new(cpu, mem),
        }
    }

    fn pool(members: Vec<&str>) -> NodePool {
        NodePool {
            name: "pool-a".to_string(),
            declared_instance_types: vec![],
            declared_capacity_types: vec![],
            member_nodes: members.into_iter().map(String::from).collect(),
            taints: vec![],
            labels: HashMap::new(),
            min_nodes: None,
        }
    }

    #[tokio::test]
    async fn empty_member_nodes_yields_no_demand() {
        let resolver = PricingResolver::new(Arc::new(NoLiveSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let (demand, warnings) = compute_demand(&pool(vec![]), &[], &[], &resolver, &cancel).await;
        assert!(demand.is_none());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn sums_allocatable_and_counted_pod_requests() {
        let resolver = PricingResolver::new(Arc::new(NoLiveSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let nodes = vec![
            node("n1", "m5.large", Mode::OnDemand, Architecture::Amd64),
            node("n2", "m5.large", Mode::Spot, Architecture::Amd64),
        ];
        let pods = vec![
            pod("p1", "n1", 1.0, 2.0),
            pod("p2", "n2", 1.0, 2.0),
            pod("p3", "other-node", 100.0, 100.0),
        ];
        let (demand, _) = compute_demand(&pool(vec!["n1", "n2"]), &nodes, &pods, &resolver, &cancel)
            .await;
        let demand = demand.unwrap();
        assert_eq!(demand.cpu_alloc, 8.0);
        assert_eq!(demand.cpu_used, 2.0);
        assert_eq!(demand.current_mode_mix, ModeMix::Mixed);
        assert_eq!(demand.current_node_count, 2);
    }

    #[tokio::test]
    async fn pods_on_a_declared_but_absent_node_are_dropped_from_totals() {
        let resolver = PricingResolver::new(Arc::new(NoLiveSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        // "n2" is declared as a member but missing from the live node snapshot.
        let nodes = vec![node("n1", "m5.large", Mode::OnDemand, Architecture::Amd64)];
        let pods = vec![
            pod("p1", "n1", 1.0, 2.0),
            pod("p2", "n2", 100.0, 100.0),
        ];
        let (demand, warnings) = compute_demand(&pool(vec!["n1", "n2"]), &nodes, &pods, &resolver, &cancel)
            .await;
        let demand = demand.unwrap();
        assert_eq!(demand.cpu_alloc, 4.0);
        assert_eq!(demand.cpu_used, 1.0);
        assert_eq!(demand.current_node_count, 1);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_with_cpu_used_over_alloc_appends_a_warning() {
        let resolver = PricingResolver::new(Arc::new(NoLiveSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let nodes = vec![node("n1", "m5.large", Mode::OnDemand, Architecture::Amd64)];
        let pods = vec![pod("p1", "n1", 100.0, 2.0)];
        let (demand, warnings) = compute_demand(&pool(vec!["n1"]), &nodes, &pods, &resolver, &cancel).await;
        let demand = demand.unwrap();
        assert!(demand.cpu_used > demand.cpu_alloc);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "stale-snapshot");
    }
}
