//! Core domain model for the NodePool recommendation engine.
//!
//! These types are plain data — the engine's components (capacity, search,
//! pricing, strategy, learning) all read and produce values from this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CPU instruction-set family. Workloads are pinned to one; the engine never
/// proposes crossing architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase mode. `Unknown` defaults to on-demand for cost purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Spot,
    OnDemand,
    Unknown,
}

impl Mode {
    /// The mode used for cost calculations: `Unknown` is treated as `OnDemand`.
    pub fn effective(&self) -> Mode {
        match self {
            Mode::Unknown => Mode::OnDemand,
            m => *m,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Spot => "spot",
            Mode::OnDemand => "on-demand",
            Mode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pod's lifecycle phase, as reported by the Kubernetes API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// A pod is *counted* toward demand iff its node is set and phase is not
    /// terminal-excluded (Succeeded/Failed).
    pub fn counts_toward_demand(&self) -> bool {
        !matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// Sum of container resource requests. Init containers are excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub cpu_cores: f64,
    pub mem_gib: f64,
}

impl ResourceAmount {
    pub fn new(cpu_cores: f64, mem_gib: f64) -> Self {
        Self { cpu_cores, mem_gib }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(&self, other: &ResourceAmount) -> ResourceAmount {
        ResourceAmount {
            cpu_cores: self.cpu_cores + other.cpu_cores,
            mem_gib: self.mem_gib + other.mem_gib,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub phase: PodPhase,
    pub requests: ResourceAmount,
}

impl Pod {
    /// A pod is counted iff it has a node assigned and its phase counts.
    pub fn is_counted(&self) -> bool {
        self.node_name.is_some() && self.phase.counts_toward_demand()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub instance_type: String,
    pub architecture: Architecture,
    pub mode: Mode,
    pub node_pool_name: Option<String>,
    pub allocatable: ResourceAmount,
    pub capacity: ResourceAmount,
    pub creation_time: DateTime<Utc>,
    pub zone: Option<String>,
    pub labels: HashMap<String, String>,
    pub taints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePool {
    pub name: String,
    pub declared_instance_types: Vec<String>,
    pub declared_capacity_types: Vec<Mode>,
    pub member_nodes: Vec<String>,
    pub taints: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Lower bound on recommended node count for this pool, if declared.
    pub min_nodes: Option<u32>,
}

impl NodePool {
    /// The NodePool-declared mode fallback used when a member node's own mode
    /// is `Unknown` (node.mode takes precedence over this per the spec's
    /// pinned precedence).
    pub fn declared_mode(&self) -> Mode {
        self.declared_capacity_types
            .first()
            .copied()
            .unwrap_or(Mode::OnDemand)
    }
}

/// Per-NodePool demand derived from the live cluster snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demand {
    pub node_pool: String,
    pub cpu_used: f64,
    pub cpu_alloc: f64,
    pub mem_used: f64,
    pub mem_alloc: f64,
    pub current_cost: f64,
    pub current_mode_mix: ModeMix,
    pub current_instance_types_with_counts: Vec<String>,
    pub current_node_count: u32,
    pub architecture: Architecture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeMix {
    Spot,
    OnDemand,
    Mixed,
}

impl std::fmt::Display for ModeMix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModeMix::Spot => "spot",
            ModeMix::OnDemand => "on-demand",
            ModeMix::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// An instance type available from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInstance {
    pub instance_type: String,
    pub cpu_cores: f64,
    pub mem_gib: f64,
    pub architecture: Architecture,
    pub family: String,
    pub is_gpu: bool,
}

/// Which resolution tier produced a Price Quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Live,
    Cache,
    FamilyEstimate,
    Llm,
    Hardcoded,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provenance::Live => "live",
            Provenance::Cache => "cache",
            Provenance::FamilyEstimate => "family-estimate",
            Provenance::Llm => "llm",
            Provenance::Hardcoded => "hardcoded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceQuote {
    pub hourly_usd: f64,
    pub provenance: Provenance,
}

/// A single NodePool's emitted reconfiguration proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub node_pool: String,
    pub current_node_count: u32,
    pub current_instance_types_with_counts: Vec<String>,
    pub current_cost: f64,
    pub recommended_nodes: u32,
    pub recommended_instance_types_with_counts: Vec<String>,
    pub recommended_total_cpu: f64,
    pub recommended_total_mem: f64,
    pub recommended_cost: f64,
    pub cost_savings: f64,
    pub cost_savings_percent: f64,
    pub architecture: Architecture,
    pub capacity_type: Mode,
    pub rationale_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub id: String,
    pub node_pool: String,
    pub strategy: String,
    pub current_state: Demand,
    pub recommendations: Vec<Recommendation>,
    pub risk_level: RiskLevel,
    pub estimated_savings: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub learned_from_history: bool,
    pub learning_insights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceImpact {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserFeedback {
    Approved,
    Rejected,
    Partial,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub plan_id: String,
    pub node_pool: String,
    pub strategy: String,
    pub applied_at: DateTime<Utc>,
    pub predicted_savings: f64,
    pub predicted_confidence: f64,
    pub predicted_risk: RiskLevel,
    pub actual_savings: f64,
    pub actual_cost: f64,
    pub actual_nodes: u32,
    pub actual_instance_types: Vec<String>,
    pub actual_mode: Mode,
    pub performance_impact: PerformanceImpact,
    pub incidents: Vec<String>,
    pub user_feedback: UserFeedback,
    pub success: bool,
    pub accuracy: f64,
    pub lessons: Vec<String>,
}

/// A structured, non-fatal diagnostic attached to a recommendation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineWarning {
    pub node_pool: Option<String>,
    pub code: String,
    pub message: String,
}

impl EngineWarning {
    pub fn new(node_pool: Option<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_pool,
            code: code.into(),
            message: message.into(),
        }
    }
}
