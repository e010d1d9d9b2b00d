//! Engine configuration surface (§6). Library consumers construct an
//! `EngineConfig` directly or load one from YAML (`EngineConfig::from_yaml_file`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_price_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_catalog_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_headroom() -> f64 {
    0.20
}

fn default_max_recommended_nodes() -> u32 {
    50
}

fn default_cost_increase_guard() -> f64 {
    0.10
}

fn default_history_file() -> String {
    "nodepool-advisor-history.json".to_string()
}

fn default_strategy() -> String {
    "balanced".to_string()
}

fn default_search_worker_pool() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_price_cache_ttl_secs")]
    pub price_cache_ttl_secs: u64,
    #[serde(default = "default_catalog_cache_ttl_secs")]
    pub catalog_cache_ttl_secs: u64,
    #[serde(default = "default_headroom")]
    pub headroom_cpu: f64,
    #[serde(default = "default_headroom")]
    pub headroom_mem: f64,
    #[serde(default = "default_max_recommended_nodes")]
    pub max_recommended_nodes: u32,
    #[serde(default = "default_cost_increase_guard")]
    pub cost_increase_guard: f64,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_strategy")]
    pub strategy_default: String,
    #[serde(default = "default_search_worker_pool")]
    pub search_worker_pool: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            price_cache_ttl_secs: default_price_cache_ttl_secs(),
            catalog_cache_ttl_secs: default_catalog_cache_ttl_secs(),
            headroom_cpu: default_headroom(),
            headroom_mem: default_headroom(),
            max_recommended_nodes: default_max_recommended_nodes(),
            cost_increase_guard: default_cost_increase_guard(),
            history_file: default_history_file(),
            strategy_default: default_strategy(),
            search_worker_pool: default_search_worker_pool(),
        }
    }
}

impl EngineConfig {
    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn catalog_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_cache_ttl_secs)
    }

    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
