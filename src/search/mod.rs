//! Search Engine (§4.5): finds the cheapest feasible instance-type mix for a
//! NodePool's headroom-adjusted demand. Pure compute — no suspension points,
//! per §5. Grounded on the pack's combinatorial instance-selection optimizers
//! (subset enumeration + branch-and-bound over a small candidate set).

use std::collections::HashMap;

use crate::types::CandidateInstance;

/// Cost-per-hour pre-resolved for one catalog instance type + mode, handed in
/// by the caller since pricing requires suspension and the Search Engine may
/// not suspend.
#[derive(Debug, Clone)]
pub struct PricedCandidate {
    pub instance: CandidateInstance,
    pub hourly_usd: f64,
}

/// A feasible configuration the Search Engine is willing to recommend.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub counts: Vec<(String, u32)>,
    pub total_cpu: f64,
    pub total_mem: f64,
    pub total_cost: f64,
    pub total_nodes: u32,
}

/// Cores-per-GiB trade-off used to rank instance types by cost efficiency
/// (§4.5: "c_ratio fixes the cpu/mem trade, default 4 GiB per core").
const DEFAULT_CPU_MEM_RATIO: f64 = 0.25;

fn effective_size(cpu: f64, mem: f64, c_ratio: f64) -> f64 {
    cpu.min(mem * c_ratio)
}

fn cost_efficiency(c: &PricedCandidate, c_ratio: f64) -> f64 {
    let size = effective_size(c.instance.cpu_cores, c.instance.mem_gib, c_ratio);
    if size <= 0.0 {
        f64::INFINITY
    } else {
        c.hourly_usd / size
    }
}

/// k=1 formula from §4.5: smallest integer count covering both dimensions.
fn single_type_count(required_cpu: f64, required_mem: f64, c: &PricedCandidate) -> u32 {
    let by_cpu = if c.instance.cpu_cores > 0.0 {
        required_cpu / c.instance.cpu_cores
    } else {
        f64::INFINITY
    };
    let by_mem = if c.instance.mem_gib > 0.0 {
        required_mem / c.instance.mem_gib
    } else {
        f64::INFINITY
    };
    by_cpu.max(by_mem).max(0.0).ceil() as u32
}

/// Greedy bin-fill in decreasing cost-efficiency order, followed by a small
/// local-search refinement bounded by the best cost found so far.
fn solve_subset(
    required_cpu: f64,
    required_mem: f64,
    subset: &[&PricedCandidate],
    ceiling: u32,
) -> Option<(HashMap<String, u32>, f64)> {
    let mut ordered: Vec<&PricedCandidate> = subset.to_vec();
    ordered.sort_by(|a, b| {
        cost_efficiency(a, DEFAULT_CPU_MEM_RATIO)
            .partial_cmp(&cost_efficiency(b, DEFAULT_CPU_MEM_RATIO))
            .unwrap()
    });

    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut remaining_cpu = required_cpu;
    let mut remaining_mem = required_mem;

    for (idx, candidate) in ordered.iter().enumerate() {
        if remaining_cpu <= 0.0 && remaining_mem <= 0.0 {
            break;
        }
        let is_last = idx == ordered.len() - 1;
        let take = if is_last {
            single_type_count(remaining_cpu.max(0.0), remaining_mem.max(0.0), candidate)
        } else {
            let by_cpu = if candidate.instance.cpu_cores > 0.0 {
                (remaining_cpu / candidate.instance.cpu_cores).floor()
            } else {
                0.0
            };
            let by_mem = if candidate.instance.mem_gib > 0.0 {
                (remaining_mem / candidate.instance.mem_gib).floor()
            } else {
                0.0
            };
            by_cpu.min(by_mem).max(0.0) as u32
        };
        if take > 0 {
            *counts.entry(candidate.instance.instance_type.clone()).or_insert(0) += take;
            remaining_cpu -= take as f64 * candidate.instance.cpu_cores;
            remaining_mem -= take as f64 * candidate.instance.mem_gib;
        }
    }

    let total_nodes: u32 = counts.values().sum();
    if total_nodes == 0 || total_nodes > ceiling {
        return None;
    }

    let mut best_cost = total_cost(&counts, subset);
    let mut best_counts = counts.clone();

    // Local-search refinement: try nudging one unit from the least-efficient
    // used type to the most-efficient candidate in the subset, keeping the
    // result only if it stays feasible and strictly cheaper (bound = best
    // cost so far).
    if let Some(most_efficient) = ordered.first() {
        let least_efficient_used = ordered
            .iter()
            .rev()
            .find(|c| counts.get(&c.instance.instance_type).copied().unwrap_or(0) > 0);
        if let Some(least) = least_efficient_used {
            if least.instance.instance_type != most_efficient.instance.instance_type {
                let mut candidate_counts = best_counts.clone();
                let current = candidate_counts.get(&least.instance.instance_type).copied().unwrap_or(0);
                if current > 0 {
                    candidate_counts.insert(least.instance.instance_type.clone(), current - 1);
                    let (cpu, mem) = totals(&candidate_counts, subset);
                    let deficit_cpu = (required_cpu - cpu).max(0.0);
                    let deficit_mem = (required_mem - mem).max(0.0);
                    let extra = single_type_count(deficit_cpu, deficit_mem, most_efficient);
                    *candidate_counts
                        .entry(most_efficient.instance.instance_type.clone())
                        .or_insert(0) += extra;
                    let candidate_nodes: u32 = candidate_counts.values().sum();
                    let (cpu2, mem2) = totals(&candidate_counts, subset);
                    let candidate_cost = total_cost(&candidate_counts, subset);
                    if cpu2 >= required_cpu
                        && mem2 >= required_mem
                        && candidate_nodes <= ceiling
                        && candidate_cost < best_cost
                    {
                        best_cost = candidate_cost;
                        best_counts = candidate_counts;
                    }
                }
            }
        }
    }

    best_counts.retain(|_, n| *n > 0);
    Some((best_counts, best_cost))
}

fn totals(counts: &HashMap<String, u32>, subset: &[&PricedCandidate]) -> (f64, f64) {
    let mut cpu = 0.0;
    let mut mem = 0.0;
    for c in subset {
        if let Some(n) = counts.get(&c.instance.instance_type) {
            cpu += *n as f64 * c.instance.cpu_cores;
            mem += *n as f64 * c.instance.mem_gib;
        }
    }
    (cpu, mem)
}

fn total_cost(counts: &HashMap<String, u32>, subset: &[&PricedCandidate]) -> f64 {
    let mut cost = 0.0;
    for c in subset {
        if let Some(n) = counts.get(&c.instance.instance_type) {
            cost += *n as f64 * c.hourly_usd;
        }
    }
    cost
}

fn combinations<'a>(items: &'a [PricedCandidate], k: usize) -> Vec<Vec<&'a PricedCandidate>> {
    fn helper<'a>(
        items: &'a [PricedCandidate],
        start: usize,
        k: usize,
        current: &mut Vec<&'a PricedCandidate>,
        out: &mut Vec<Vec<&'a PricedCandidate>>,
    ) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..items.len() {
            current.push(&items[i]);
            helper(items, i + 1, k, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    let mut current = Vec::new();
    helper(items, 0, k, &mut current, &mut out);
    out
}

/// Runs the k∈{1,2,3} subset search. `ceiling` is `max_recommended_nodes`
/// unless a NodePool-declared `min_nodes` raises the effective floor (the
/// ceiling itself is never lowered by `min_nodes`; a subset whose minimum
/// feasible count is below `min_nodes` is padded up to it as long as it
/// stays within `ceiling`).
pub fn search(
    required_cpu: f64,
    required_mem: f64,
    current_cost: f64,
    catalog: &[PricedCandidate],
    ceiling: u32,
    min_nodes: Option<u32>,
) -> Option<SearchCandidate> {
    let mut best: Option<SearchCandidate> = None;

    for k in 1..=3usize.min(catalog.len().max(1)) {
        if k > catalog.len() {
            break;
        }
        for subset in combinations(catalog, k) {
            let Some((mut counts, mut cost)) = solve_subset(required_cpu, required_mem, &subset, ceiling) else {
                continue;
            };

            if let Some(min_nodes) = min_nodes {
                let current_total: u32 = counts.values().sum();
                if current_total < min_nodes {
                    // Pad with more of the cheapest type in the subset.
                    if let Some(cheapest) = subset
                        .iter()
                        .min_by(|a, b| a.hourly_usd.partial_cmp(&b.hourly_usd).unwrap())
                    {
                        let needed = min_nodes - current_total;
                        if current_total + needed <= ceiling {
                            *counts.entry(cheapest.instance.instance_type.clone()).or_insert(0) += needed;
                            cost = total_cost(&counts, &subset);
                        } else {
                            continue;
                        }
                    }
                }
            }

            let total_nodes: u32 = counts.values().sum();
            if total_nodes == 0 || total_nodes > ceiling || cost >= current_cost {
                continue;
            }

            let (total_cpu, total_mem) = totals(&counts, &subset);
            let mut ordered_counts: Vec<(String, u32)> = counts.into_iter().collect();
            ordered_counts.sort_by(|a, b| a.0.cmp(&b.0));

            let candidate = SearchCandidate {
                counts: ordered_counts,
                total_cpu,
                total_mem,
                total_cost: cost,
                total_nodes,
            };

            best = Some(match best {
                None => candidate,
                Some(existing) => pick_better(existing, candidate),
            });
        }
    }

    best
}

/// Tie-break order from §4.5: lowest cost, then fewest nodes, then fewest
/// distinct types, then lexicographically smallest type names.
fn pick_better(a: SearchCandidate, b: SearchCandidate) -> SearchCandidate {
    use std::cmp::Ordering;
    let cost_cmp = a.total_cost.partial_cmp(&b.total_cost).unwrap_or(Ordering::Equal);
    if cost_cmp != Ordering::Equal {
        return if cost_cmp == Ordering::Less { a } else { b };
    }
    if a.total_nodes != b.total_nodes {
        return if a.total_nodes < b.total_nodes { a } else { b };
    }
    if a.counts.len() != b.counts.len() {
        return if a.counts.len() < b.counts.len() { a } else { b };
    }
    let a_names: Vec<&str> = a.counts.iter().map(|(t, _)| t.as_str()).collect();
    let b_names: Vec<&str> = b.counts.iter().map(|(t, _)| t.as_str()).collect();
    if a_names < b_names {
        a
    } else {
        b
    }
}
