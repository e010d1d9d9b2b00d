//! The Cluster Port (§4.1): a read-only, snapshot-per-call view of the
//! cluster the engine needs. No caching lives in the port itself — callers
//! re-invoke per request.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::types::{Node, NodePool, Pod};

#[async_trait]
pub trait ClusterPort: Send + Sync {
    /// All nodes, including per-node usage derived from scheduled pod
    /// requests (already summed in by the adapter, or trivially zero for a
    /// fixture that does not track usage separately from `list_pods`).
    async fn list_nodes_with_usage(&self, cancel: &CancellationToken) -> Result<Vec<Node>, EngineError>;

    /// All pods across all namespaces.
    async fn list_pods(&self, cancel: &CancellationToken) -> Result<Vec<Pod>, EngineError>;

    /// All NodePools, with `member_nodes` populated by matching the
    /// well-known NodePool label on each node. A NodePool whose CRD is
    /// absent yields an empty list, not an error.
    async fn list_node_pools(&self, cancel: &CancellationToken) -> Result<Vec<NodePool>, EngineError>;
}

/// Runs a ClusterPort operation once, retrying a single time on a transient
/// `ClusterUnavailable` failure (the port itself never retries; §4.1 puts
/// retry-once in the caller).
pub async fn with_single_retry<T, F, Fut>(mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(EngineError::ClusterUnavailable(_)) => op().await,
        Err(e) => Err(e),
    }
}
