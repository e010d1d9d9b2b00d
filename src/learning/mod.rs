//! Learning Store (§4.9): append-only outcome history with derived priors,
//! updated by EMA on each new outcome. Grounded on the pack's prediction/
//! outcome-tracking engine (`Dee66-CostPilot`'s prediction_engine.rs), adapted
//! to the teacher's reader-writer-lock discipline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::warn;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{OutcomeRecord, PerformanceImpact, UserFeedback};

const EMA_ALPHA: f64 = 0.3;
const MIN_ATTEMPTS_FOR_BEST_STRATEGY: u32 = 2;
const MIN_OCCURRENCES_FOR_COMMON_INCIDENT: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct OptimalConfig {
    pub instance_types: Vec<String>,
    pub nodes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct NodePoolPattern {
    pub best_strategy: Option<String>,
    pub best_rate: f64,
    pub avg_savings: f64,
    pub common_incidents: Vec<String>,
    pub optimal_config: Option<OptimalConfig>,
}

#[derive(Debug, Clone, Default)]
struct Patterns {
    strategy_attempts: HashMap<String, (f64, u32)>, // (EMA success rate, attempts)
    nodepool_attempts: HashMap<String, HashMap<String, (f64, u32)>>, // node_pool -> strategy -> (EMA success rate, attempts)
    nodepool: HashMap<String, NodePoolPattern>,
    best_config_savings: HashMap<String, f64>,
}

pub struct LearningStore {
    path: PathBuf,
    outcomes: RwLock<Vec<OutcomeRecord>>,
    patterns: RwLock<Patterns>,
}

impl LearningStore {
    /// Loads all outcomes from `path`; a missing file starts empty and is
    /// non-fatal (§4.9).
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let outcomes = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<Vec<OutcomeRecord>>(&contents).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        let patterns = derive_patterns(&outcomes);
        Self {
            path,
            outcomes: RwLock::new(outcomes),
            patterns: RwLock::new(patterns),
        }
    }

    pub async fn history(&self) -> Vec<OutcomeRecord> {
        self.outcomes.read().await.clone()
    }

    pub async fn history_count(&self) -> usize {
        self.outcomes.read().await.len()
    }

    pub async fn best_strategy_for(&self, node_pool: &str) -> Option<(String, f64)> {
        let patterns = self.patterns.read().await;
        patterns
            .nodepool
            .get(node_pool)
            .and_then(|p| p.best_strategy.clone().map(|s| (s, p.best_rate)))
    }

    pub async fn strategy_rate(&self, strategy: &str) -> f64 {
        let patterns = self.patterns.read().await;
        patterns
            .strategy_attempts
            .get(strategy)
            .map(|(rate, _)| *rate)
            .unwrap_or(0.0)
    }

    pub async fn optimal_config(&self, node_pool: &str) -> Option<OptimalConfig> {
        let patterns = self.patterns.read().await;
        patterns.nodepool.get(node_pool).and_then(|p| p.optimal_config.clone())
    }

    /// `adjust_confidence(base, nodePool, strategy)`: the full §4.8 formula,
    /// owned by the Learning Store since only it knows the historical rates.
    pub async fn adjust_confidence(&self, base: f64, node_pool: &str, strategy: &str) -> f64 {
        let strategy_rate = self.strategy_rate(strategy).await;
        let nodepool_rate = self
            .best_strategy_for(node_pool)
            .await
            .map(|(_, rate)| rate)
            .unwrap_or(0.0);
        (0.6 * base + 0.2 * strategy_rate + 0.2 * nodepool_rate).clamp(0.0, 1.0)
    }

    /// Records a new outcome: computes `success`/`accuracy`/`lessons`,
    /// appends atomically, and updates priors in place via EMA (§4.9).
    pub async fn record(&self, mut outcome: OutcomeRecord) -> Result<(), EngineError> {
        outcome.success = compute_success(&outcome);
        outcome.accuracy = compute_accuracy(outcome.predicted_savings, outcome.actual_savings);
        outcome.lessons = compute_lessons(&outcome);

        {
            let mut outcomes = self.outcomes.write().await;
            outcomes.push(outcome.clone());
            self.persist(&outcomes).await?;
        }

        let mut patterns = self.patterns.write().await;
        apply_ema_update(&mut patterns, &outcome);

        Ok(())
    }

    async fn persist(&self, outcomes: &[OutcomeRecord]) -> Result<(), EngineError> {
        let serialized = serde_json::to_string_pretty(outcomes)
            .map_err(|e| EngineError::LearningIoFailure(e.to_string()))?;
        let tmp_path = self.path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|e| EngineError::LearningIoFailure(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            warn!("learning store atomic rename failed: {e}");
            EngineError::LearningIoFailure(e.to_string())
        })
    }
}

fn compute_success(o: &OutcomeRecord) -> bool {
    if o.user_feedback == UserFeedback::Rejected {
        return false;
    }
    if !o.incidents.is_empty() {
        return false;
    }
    if o.performance_impact == PerformanceImpact::Negative {
        return false;
    }
    if o.actual_savings < 0.0 {
        return false;
    }
    if o.predicted_savings > 0.0 && o.actual_savings < 0.5 * o.predicted_savings {
        return false;
    }
    true
}

fn compute_accuracy(predicted: f64, actual: f64) -> f64 {
    let denom = predicted.max(actual);
    if denom == 0.0 {
        return 1.0;
    }
    (1.0 - (predicted - actual).abs() / denom).clamp(0.0, 1.0)
}

fn compute_lessons(o: &OutcomeRecord) -> Vec<String> {
    let mut lessons = Vec::new();
    if o.accuracy < 0.7 {
        let diff_pct = if o.predicted_savings != 0.0 {
            ((o.predicted_savings - o.actual_savings) / o.predicted_savings * 100.0).abs()
        } else {
            0.0
        };
        lessons.push(format!(
            "predicted savings of ${:.2} missed actual by {:.1}%",
            o.predicted_savings, diff_pct
        ));
    }
    for incident in &o.incidents {
        lessons.push(format!("strategy '{}' caused an incident: {incident}", o.strategy));
    }
    if o.user_feedback == UserFeedback::Rejected {
        lessons.push("user rejected this plan".to_string());
    }
    if o.performance_impact == PerformanceImpact::Negative {
        lessons.push("performance regressed after applying this plan".to_string());
    }
    lessons
}

fn derive_patterns(outcomes: &[OutcomeRecord]) -> Patterns {
    let mut patterns = Patterns::default();
    for outcome in outcomes {
        apply_ema_update(&mut patterns, outcome);
    }
    patterns
}

/// Updates strategy/NodePool attempt tallies and re-derives the NodePool
/// pattern, using the new outcome as an EMA-weighted sample (α=0.3) against
/// the running rate.
fn apply_ema_update(patterns: &mut Patterns, outcome: &OutcomeRecord) {
    let sample = if outcome.success { 1.0 } else { 0.0 };

    let entry = patterns
        .strategy_attempts
        .entry(outcome.strategy.clone())
        .or_insert((0.0, 0));
    entry.0 = EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * entry.0;
    entry.1 += 1;

    let per_pool = patterns
        .nodepool_attempts
        .entry(outcome.node_pool.clone())
        .or_default();
    let pool_entry = per_pool.entry(outcome.strategy.clone()).or_insert((0.0, 0));
    pool_entry.0 = EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * pool_entry.0;
    pool_entry.1 += 1;

    let best_so_far = patterns
        .best_config_savings
        .get(&outcome.node_pool)
        .copied()
        .unwrap_or(f64::MIN);
    let becomes_new_best = outcome.success && outcome.actual_savings > best_so_far;
    if becomes_new_best {
        patterns
            .best_config_savings
            .insert(outcome.node_pool.clone(), outcome.actual_savings);
    }

    let pattern = patterns.nodepool.entry(outcome.node_pool.clone()).or_default();

    // EMA-smoothed average savings across all outcomes for this NodePool.
    let savings_sample = outcome.actual_savings;
    pattern.avg_savings = if pattern.avg_savings == 0.0 {
        savings_sample
    } else {
        EMA_ALPHA * savings_sample + (1.0 - EMA_ALPHA) * pattern.avg_savings
    };

    if becomes_new_best {
        pattern.optimal_config = Some(OptimalConfig {
            instance_types: outcome.actual_instance_types.clone(),
            nodes: outcome.actual_nodes,
        });
    }

    if let Some(per_pool) = patterns.nodepool_attempts.get(&outcome.node_pool) {
        let mut best: Option<(&String, f64)> = None;
        for (strategy, (rate, attempts)) in per_pool {
            if *attempts < MIN_ATTEMPTS_FOR_BEST_STRATEGY {
                continue;
            }
            let rate = *rate;
            if best.as_ref().map(|(_, r)| rate > *r).unwrap_or(true) {
                best = Some((strategy, rate));
            }
        }
        if let Some((strategy, rate)) = best {
            pattern.best_strategy = Some(strategy.clone());
            pattern.best_rate = rate;
        }
    }

    let mut incident_counts: HashMap<String, u32> = HashMap::new();
    // Recompute common incidents across the whole history is not tracked
    // incrementally here; instead each `record` call folds in this
    // outcome's incidents against the running pattern's own list.
    for incident in pattern.common_incidents.iter().cloned() {
        *incident_counts.entry(incident).or_insert(1) += 0;
    }
    for incident in &outcome.incidents {
        *incident_counts.entry(incident.clone()).or_insert(0) += 1;
    }
    pattern.common_incidents = incident_counts
        .into_iter()
        .filter(|(_, n)| *n >= MIN_OCCURRENCES_FOR_COMMON_INCIDENT)
        .map(|(incident, _)| incident)
        .collect();
}
