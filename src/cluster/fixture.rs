//! In-memory `ClusterPort` used by tests and the demonstration CLI. Mirrors a
//! fixed cluster snapshot — nothing is derived lazily, everything is exactly
//! what was handed to `FixtureClusterPort::new`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::types::{Node, NodePool, Pod};

use super::port::ClusterPort;

#[derive(Debug, Clone, Default)]
pub struct FixtureClusterPort {
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    node_pools: Vec<NodePool>,
}

impl FixtureClusterPort {
    pub fn new(nodes: Vec<Node>, pods: Vec<Pod>, node_pools: Vec<NodePool>) -> Self {
        Self {
            nodes,
            pods,
            node_pools,
        }
    }
}

#[async_trait]
impl ClusterPort for FixtureClusterPort {
    async fn list_nodes_with_usage(&self, _cancel: &CancellationToken) -> Result<Vec<Node>, EngineError> {
        Ok(self.nodes.clone())
    }

    async fn list_pods(&self, _cancel: &CancellationToken) -> Result<Vec<Pod>, EngineError> {
        Ok(self.pods.clone())
    }

    async fn list_node_pools(&self, _cancel: &CancellationToken) -> Result<Vec<NodePool>, EngineError> {
        Ok(self.node_pools.clone())
    }
}
