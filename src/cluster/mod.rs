pub mod fixture;
pub mod k8s_adapter;
pub mod port;

pub use fixture::FixtureClusterPort;
pub use k8s_adapter::K8sClusterPort;
pub use port::{with_single_retry, ClusterPort};
