//! Reference `ClusterPort` adapter over `kube`/`k8s-openapi` (§4.1's "reference
//! adapter exists for the Kubernetes cluster API"). Adapted from the teacher
//! repo's `K8sClient` connection bootstrap and `Api<T>` accessor style.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod as K8sPod};
use kube::api::ListParams;
use kube::{Api, Client, Config};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::types::{Architecture, Mode, Node, NodePool, Pod, PodPhase, ResourceAmount};
use crate::utils::resource_quantity::{parse_cpu_str, parse_memory_str};

use super::port::ClusterPort;

/// Well-known labels the adapter reads from Node objects. Matches the
/// conventions of common NodePool-style autoscaling controllers.
const LABEL_ARCH: &str = "kubernetes.io/arch";
const LABEL_NODE_POOL: &str = "karpenter.sh/nodepool";
const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
const LABEL_ZONE: &str = "topology.kubernetes.io/zone";

pub struct K8sClusterPort {
    client: Client,
}

impl K8sClusterPort {
    pub async fn new(config_file: Option<&str>) -> Result<Self, EngineError> {
        if let Some(path) = config_file {
            std::env::set_var("KUBECONFIG", path);
        }
        let config = Config::infer()
            .await
            .map_err(|e| EngineError::ClusterUnavailable(e.to_string()))?;
        let client = Client::try_from(config).map_err(|e| EngineError::ClusterUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn nodes_api(&self) -> Api<K8sNode> {
        Api::all(self.client.clone())
    }

    fn pods_api(&self) -> Api<K8sPod> {
        Api::all(self.client.clone())
    }
}

fn parse_resource_amount(
    map: Option<&std::collections::BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>>,
) -> ResourceAmount {
    let cpu_millis = map
        .and_then(|m| m.get("cpu"))
        .and_then(|q| parse_cpu_str(q.0.as_str()))
        .unwrap_or(0);
    let mem_bytes = map
        .and_then(|m| m.get("memory"))
        .and_then(|q| parse_memory_str(q.0.as_str()))
        .unwrap_or(0);
    ResourceAmount::new(
        cpu_millis as f64 / 1000.0,
        mem_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
    )
}

fn architecture_from_label(labels: &HashMap<String, String>) -> Architecture {
    match labels.get(LABEL_ARCH).map(|s| s.as_str()) {
        Some("arm64") => Architecture::Arm64,
        _ => Architecture::Amd64,
    }
}

fn mode_from_label(labels: &HashMap<String, String>) -> Mode {
    match labels.get(LABEL_CAPACITY_TYPE).map(|s| s.as_str()) {
        Some("spot") => Mode::Spot,
        Some("on-demand") => Mode::OnDemand,
        _ => Mode::Unknown,
    }
}

fn convert_node(n: K8sNode) -> Option<Node> {
    let name = n.metadata.name.clone()?;
    let labels: HashMap<String, String> = n.metadata.labels.clone().unwrap_or_default();
    let status = n.status.as_ref();
    let allocatable = parse_resource_amount(status.and_then(|s| s.allocatable.as_ref()));
    let capacity = parse_resource_amount(status.and_then(|s| s.capacity.as_ref()));
    let instance_type = labels
        .get("node.kubernetes.io/instance-type")
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let creation_time = n
        .metadata
        .creation_timestamp
        .map(|t| t.0)
        .unwrap_or_else(Utc::now);
    let taints = n
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|ts| ts.iter().map(|t| t.key.clone()).collect())
        .unwrap_or_default();

    Some(Node {
        architecture: architecture_from_label(&labels),
        mode: mode_from_label(&labels),
        node_pool_name: labels.get(LABEL_NODE_POOL).cloned(),
        zone: labels.get(LABEL_ZONE).cloned(),
        name,
        instance_type,
        allocatable,
        capacity,
        creation_time,
        labels,
        taints,
    })
}

fn convert_pod(p: K8sPod) -> Option<Pod> {
    let name = p.metadata.name.clone()?;
    let namespace = p.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
    let node_name = p.spec.as_ref().and_then(|s| s.node_name.clone());
    let phase = match p.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    };

    let mut requests = ResourceAmount::zero();
    if let Some(spec) = &p.spec {
        // Init containers are intentionally excluded (spec §3).
        for c in &spec.containers {
            if let Some(r) = c.resources.as_ref().and_then(|r| r.requests.as_ref()) {
                let cpu_millis = r.get("cpu").and_then(|q| parse_cpu_str(q.0.as_str())).unwrap_or(0);
                let mem_bytes = r
                    .get("memory")
                    .and_then(|q| parse_memory_str(q.0.as_str()))
                    .unwrap_or(0);
                requests.cpu_cores += cpu_millis as f64 / 1000.0;
                requests.mem_gib += mem_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
            }
        }
    }

    Some(Pod {
        namespace,
        name,
        node_name,
        phase,
        requests,
    })
}

#[async_trait]
impl ClusterPort for K8sClusterPort {
    async fn list_nodes_with_usage(&self, _cancel: &CancellationToken) -> Result<Vec<Node>, EngineError> {
        let list = self
            .nodes_api()
            .list(&ListParams::default())
            .await
            .map_err(|e| EngineError::ClusterUnavailable(e.to_string()))?;
        Ok(list.items.into_iter().filter_map(convert_node).collect())
    }

    async fn list_pods(&self, _cancel: &CancellationToken) -> Result<Vec<Pod>, EngineError> {
        let list = self
            .pods_api()
            .list(&ListParams::default())
            .await
            .map_err(|e| EngineError::ClusterUnavailable(e.to_string()))?;
        Ok(list.items.into_iter().filter_map(convert_pod).collect())
    }

    async fn list_node_pools(&self, cancel: &CancellationToken) -> Result<Vec<NodePool>, EngineError> {
        // No separate NodePool CRD client is wired here (out of scope per
        // §1 — "the cluster client's raw REST wire details" are external);
        // NodePools are derived by grouping nodes on their NodePool label,
        // which satisfies §4.1's "member_nodes populated by matching a
        // well-known label" contract without a CRD round-trip.
        let nodes = self.list_nodes_with_usage(cancel).await?;
        let mut by_pool: HashMap<String, Vec<String>> = HashMap::new();
        for node in &nodes {
            if let Some(pool) = &node.node_pool_name {
                by_pool.entry(pool.clone()).or_default().push(node.name.clone());
            }
        }
        Ok(by_pool
            .into_iter()
            .map(|(name, member_nodes)| NodePool {
                name,
                declared_instance_types: Vec::new(),
                declared_capacity_types: Vec::new(),
                member_nodes,
                taints: Vec::new(),
                labels: HashMap::new(),
                min_nodes: None,
            })
            .collect())
    }
}
