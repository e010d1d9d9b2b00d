//! Agent Orchestrator (§4.8): the per-request driver tying the Capacity
//! Computer, Recommendation Assembler, Strategy Overlay, and Learning Store
//! together into `OptimizationPlan`s. Grounded on the teacher's
//! `inspections/runner.rs::run_inspections` per-target loop, generalized from
//! a fixed inspector list to a per-NodePool pipeline.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capacity::compute_demand;
use crate::catalog::InstanceCatalog;
use crate::cluster::{with_single_retry, ClusterPort};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::learning::LearningStore;
use crate::nl::{NlEnricher, NL_DEADLINE};
use crate::pricing::PricingResolver;
use crate::recommend::{base_confidence, compute_search_results};
use crate::strategy::{self, Strategy};
use crate::types::{EngineWarning, Mode, ModeMix, OptimizationPlan, Recommendation, RiskLevel};

/// Historical success rate above which the Learning Store's own pick for a
/// NodePool overrides the configured default strategy (§4.8 step 3).
const LEARNING_OVERRIDE_THRESHOLD: f64 = 0.7;
const MODE_CHANGE_RISK_WEIGHT: u32 = 2;
const COUNT_REDUCTION_RISK_WEIGHT: u32 = 1;
const COUNT_REDUCTION_RISK_THRESHOLD: f64 = 0.30;

pub struct AgentOrchestrator {
    cluster: Arc<dyn ClusterPort>,
    resolver: Arc<PricingResolver>,
    catalog: Arc<InstanceCatalog>,
    learning: Arc<LearningStore>,
    nl: Option<Arc<dyn NlEnricher>>,
    config: EngineConfig,
}

impl AgentOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterPort>,
        resolver: Arc<PricingResolver>,
        catalog: Arc<InstanceCatalog>,
        learning: Arc<LearningStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cluster,
            resolver,
            catalog,
            learning,
            nl: None,
            config,
        }
    }

    pub fn with_nl_enricher(mut self, nl: Arc<dyn NlEnricher>) -> Self {
        self.nl = Some(nl);
        self
    }

    /// Runs the full recommendation request (§4.8 steps 1–6). Recommendations
    /// are emitted in NodePool-list order from the cluster port (§5).
    pub async fn recommend(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Vec<OptimizationPlan>, Vec<EngineWarning>), EngineError> {
        let node_pools = self.list_node_pools(cancel).await?;
        let nodes = self.list_nodes(cancel).await?;
        let pods = self.list_pods(cancel).await?;

        let mut plans = Vec::new();
        let mut all_warnings = Vec::new();

        for node_pool in &node_pools {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let (plan, mut warnings) = self
                .process_node_pool(node_pool, &nodes, &pods, cancel)
                .await?;
            all_warnings.append(&mut warnings);
            if let Some(plan) = plan {
                plans.push(plan);
            }
        }

        Ok((plans, all_warnings))
    }

    /// Runs the pipeline for a single NodePool, returning `None` when no
    /// recommendation survives (step 6: only non-empty plans are emitted).
    pub async fn process_node_pool(
        &self,
        node_pool: &crate::types::NodePool,
        nodes: &[crate::types::Node],
        pods: &[crate::types::Pod],
        cancel: &CancellationToken,
    ) -> Result<(Option<OptimizationPlan>, Vec<EngineWarning>), EngineError> {
        let (demand, mut warnings) = compute_demand(node_pool, nodes, pods, &self.resolver, cancel).await;
        let Some(demand) = demand else {
            return Ok((None, warnings));
        };

        let results = compute_search_results(
            node_pool,
            &demand,
            &self.resolver,
            &self.catalog,
            self.config.headroom_cpu,
            self.config.headroom_mem,
            self.config.max_recommended_nodes,
            cancel,
        )
        .await;

        let (strategy, learned_from_history) = self.select_strategy(&node_pool.name).await;

        let Some(mut rec) = strategy::apply(strategy, node_pool, &demand, &results, self.config.cost_increase_guard)
        else {
            return Ok((None, warnings));
        };

        if let Some(nl) = &self.nl {
            if !cancel.is_cancelled() {
                match timeout(NL_DEADLINE, nl.enrich_rationale(&rec.rationale_text, cancel)).await {
                    Ok(Ok(text)) => rec.rationale_text = text,
                    Ok(Err(e)) => {
                        warn!("NL rationale enrichment failed for {}: {e}", node_pool.name);
                        warnings.push(EngineWarning::new(
                            Some(node_pool.name.clone()),
                            "nl-enrichment-failed",
                            e.to_string(),
                        ));
                    }
                    Err(_) => {
                        warn!("NL rationale enrichment timed out for {}", node_pool.name);
                        warnings.push(EngineWarning::new(
                            Some(node_pool.name.clone()),
                            "nl-enrichment-timeout",
                            "timed out after 30s",
                        ));
                    }
                }
            }
        }

        let base = base_confidence(rec.cost_savings_percent);
        let confidence = self.learning.adjust_confidence(base, &node_pool.name, strategy.as_str()).await;
        let risk_level = assess_risk(&demand.current_mode_mix, demand.current_node_count, &rec, warnings.len() as u32);
        let estimated_savings = rec.cost_savings;

        let plan = OptimizationPlan {
            id: Uuid::new_v4().to_string(),
            node_pool: node_pool.name.clone(),
            strategy: strategy.as_str().to_string(),
            current_state: demand,
            recommendations: vec![rec],
            risk_level,
            estimated_savings,
            confidence,
            created_at: chrono::Utc::now(),
            learned_from_history,
            learning_insights: self.learning_insights(&node_pool.name).await,
        };

        Ok((Some(plan), warnings))
    }

    pub async fn list_node_pools(&self, cancel: &CancellationToken) -> Result<Vec<crate::types::NodePool>, EngineError> {
        with_single_retry(|| self.cluster.list_node_pools(cancel)).await
    }

    pub async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<crate::types::Node>, EngineError> {
        with_single_retry(|| self.cluster.list_nodes_with_usage(cancel)).await
    }

    pub async fn list_pods(&self, cancel: &CancellationToken) -> Result<Vec<crate::types::Pod>, EngineError> {
        with_single_retry(|| self.cluster.list_pods(cancel)).await
    }

    async fn select_strategy(&self, node_pool_name: &str) -> (Strategy, bool) {
        if let Some((best, rate)) = self.learning.best_strategy_for(node_pool_name).await {
            if rate > LEARNING_OVERRIDE_THRESHOLD {
                return (Strategy::from_str(&best).unwrap(), true);
            }
        }
        (Strategy::from_str(&self.config.strategy_default).unwrap(), false)
    }

    async fn learning_insights(&self, node_pool_name: &str) -> Vec<String> {
        let mut insights = Vec::new();
        if let Some(config) = self.learning.optimal_config(node_pool_name).await {
            insights.push(format!(
                "historically best configuration: {} across {} node(s)",
                config.instance_types.join(", "),
                config.nodes
            ));
        }
        insights
    }
}

fn assess_risk(current_mode_mix: &ModeMix, current_node_count: u32, rec: &Recommendation, risk_factor_count: u32) -> RiskLevel {
    let mode_changed = match current_mode_mix {
        ModeMix::Spot => rec.capacity_type != Mode::Spot,
        ModeMix::OnDemand => rec.capacity_type != Mode::OnDemand,
        ModeMix::Mixed => true,
    };
    let count_reduction_ratio = if current_node_count > 0 {
        (current_node_count as f64 - rec.recommended_nodes as f64) / current_node_count as f64
    } else {
        0.0
    };
    let mut score = 0u32;
    if mode_changed {
        score += MODE_CHANGE_RISK_WEIGHT;
    }
    if count_reduction_ratio > COUNT_REDUCTION_RISK_THRESHOLD {
        score += COUNT_REDUCTION_RISK_WEIGHT;
    }
    score += risk_factor_count;

    if score >= 3 {
        RiskLevel::High
    } else if score >= 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
