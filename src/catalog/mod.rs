//! Instance Catalog (§4.3): a TTL-cached view over the Pricing Resolver's
//! `list_available_types`, so that processing many NodePools in one request
//! does not re-query the live catalog per pool. Grounded on the teacher's
//! single-writer-many-readers metrics cache pattern in `src/utils/metrics.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::pricing::PricingResolver;
use crate::types::{Architecture, CandidateInstance};

struct CachedEntry {
    types: Vec<CandidateInstance>,
    fetched_at: Instant,
}

pub struct InstanceCatalog {
    resolver: Arc<PricingResolver>,
    ttl: Duration,
    cache: RwLock<HashMap<Architecture, CachedEntry>>,
}

impl InstanceCatalog {
    pub fn new(resolver: Arc<PricingResolver>, ttl: Duration) -> Self {
        Self {
            resolver,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Candidate instances for an architecture, GPU families always excluded
    /// (the engine never proposes GPU capacity).
    pub async fn list(&self, architecture: Architecture, cancel: &CancellationToken) -> Vec<CandidateInstance> {
        {
            let guard = self.cache.read().await;
            if let Some(entry) = guard.get(&architecture) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return entry.types.clone();
                }
            }
        }

        let fetched = self.resolver.list_available_types(architecture, cancel).await;
        let filtered: Vec<CandidateInstance> = fetched.into_iter().filter(|c| !c.is_gpu).collect();

        let mut guard = self.cache.write().await;
        guard.insert(
            architecture,
            CachedEntry {
                types: filtered.clone(),
                fetched_at: Instant::now(),
            },
        );
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::source::NoLiveSource;

    #[tokio::test]
    async fn repeated_lookups_within_ttl_do_not_requery() {
        let resolver = Arc::new(PricingResolver::new(
            Arc::new(NoLiveSource),
            Duration::from_secs(60),
            "us-east-1",
        ));
        let catalog = InstanceCatalog::new(resolver, Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let first = catalog.list(Architecture::Amd64, &cancel).await;
        let second = catalog.list(Architecture::Amd64, &cancel).await;
        assert_eq!(first.len(), second.len());
        assert!(!first.is_empty());
        assert!(first.iter().all(|c| !c.is_gpu));
    }
}
