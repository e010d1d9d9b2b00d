//! The Pricing Resolver (§4.2): tiered fallback cascade, circuit breaker, and
//! bounded concurrency for live lookups. Grounded on the pack's multi-tier
//! price-estimation resolvers (live quote → cached → derived → fallback),
//! adapted to the teacher's handle-holding style (`Arc<Client>`-like fields).

use log::warn;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::nl::{NlEnricher, NL_DEADLINE};
use crate::types::{Architecture, CandidateInstance, Mode, PriceQuote, Provenance};

use super::cache::{CacheKey, PriceCache, SingleflightSlot};
use super::source::{builtin_catalog, derive_spot_price, hardcoded_price, LivePriceSource};

const LIVE_CALL_DEADLINE: Duration = Duration::from_secs(5);
const BREAKER_OPEN_DURATION: Duration = Duration::from_secs(60);
const BREAKER_TRIP_THRESHOLD: u32 = 2;
const LIVE_WORKER_PERMITS: usize = 8;

#[derive(Debug, Clone, Copy)]
enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

pub struct PricingResolver {
    live: Arc<dyn LivePriceSource>,
    cache: PriceCache,
    nl: Option<Arc<dyn NlEnricher>>,
    breaker: Mutex<CircuitState>,
    live_permits: Arc<Semaphore>,
    region: String,
}

impl PricingResolver {
    pub fn new(live: Arc<dyn LivePriceSource>, cache_ttl: Duration, region: impl Into<String>) -> Self {
        Self {
            live,
            cache: PriceCache::new(cache_ttl),
            nl: None,
            breaker: Mutex::new(CircuitState::Closed { consecutive_failures: 0 }),
            live_permits: Arc::new(Semaphore::new(LIVE_WORKER_PERMITS)),
            region: region.into(),
        }
    }

    pub fn with_nl_enricher(mut self, nl: Arc<dyn NlEnricher>) -> Self {
        self.nl = Some(nl);
        self
    }

    async fn breaker_allows_attempt(&self) -> bool {
        let mut state = self.breaker.lock().await;
        match *state {
            CircuitState::Closed { .. } => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn record_live_success(&self) {
        let mut state = self.breaker.lock().await;
        *state = CircuitState::Closed { consecutive_failures: 0 };
    }

    async fn record_live_failure(&self) {
        let mut state = self.breaker.lock().await;
        *state = match *state {
            CircuitState::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= BREAKER_TRIP_THRESHOLD {
                    warn!("pricing circuit breaker tripped open for {:?}", BREAKER_OPEN_DURATION);
                    CircuitState::Open {
                        until: Instant::now() + BREAKER_OPEN_DURATION,
                    }
                } else {
                    CircuitState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            CircuitState::HalfOpen => CircuitState::Open {
                until: Instant::now() + BREAKER_OPEN_DURATION,
            },
            open @ CircuitState::Open { .. } => open,
        };
    }

    /// Resolves tiers 1–5 for a non-spot (or spot-with-direct-quote) lookup.
    /// Returns `None` only when every tier including hardcoded fails.
    async fn resolve_direct(
        &self,
        instance_type: &str,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Option<(f64, Provenance)> {
        let key = CacheKey::new(instance_type, mode, &self.region);

        if let Some(price) = self.cache.get(&key).await {
            return Some((price, Provenance::Cache));
        }

        let slot = self.cache.enter_singleflight(&key);
        let is_leader = matches!(slot, SingleflightSlot::Leader(_));
        if let SingleflightSlot::Follower(notify) = slot {
            notify.notified().await;
            if let Some(price) = self.cache.get(&key).await {
                return Some((price, Provenance::Cache));
            }
        }

        let result = self.resolve_direct_uncached(instance_type, mode, &key, cancel).await;
        if is_leader {
            if let Some((price, _)) = result {
                self.cache.put(key.clone(), price).await;
            }
            self.cache.finish_singleflight(&key);
        }
        result
    }

    async fn resolve_direct_uncached(
        &self,
        instance_type: &str,
        mode: Mode,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> Option<(f64, Provenance)> {
        // Tier 1: live.
        if self.breaker_allows_attempt().await {
            if cancel.is_cancelled() {
                return None;
            }
            let _permit = self.live_permits.acquire().await.ok()?;
            let call = self.live.fetch_price(instance_type, mode, &self.region, cancel);
            match timeout(LIVE_CALL_DEADLINE, call).await {
                Ok(Ok(price)) => {
                    self.record_live_success().await;
                    return Some((price, Provenance::Live));
                }
                Ok(Err(e)) => {
                    warn!("live pricing lookup failed for {instance_type}: {e}");
                    self.record_live_failure().await;
                }
                Err(_) => {
                    warn!("live pricing lookup timed out for {instance_type}");
                    self.record_live_failure().await;
                }
            }
        }

        // Tier 2 (cache) already checked by the caller for this key.
        let _ = key;

        // Tier 3: family estimate (only meaningful for on-demand-equivalent
        // math; spot's direct quote already failed above).
        if mode.effective() == Mode::OnDemand {
            if let Some(price) = super::source::family_estimate_price(instance_type) {
                return Some((price, Provenance::FamilyEstimate));
            }
        }

        // Tier 4: NL fallback.
        if let Some(nl) = &self.nl {
            if !cancel.is_cancelled() {
                match timeout(NL_DEADLINE, nl.estimate_hourly_price(instance_type, &self.region, cancel)).await {
                    Ok(Ok(price)) => return Some((price, Provenance::Llm)),
                    Ok(Err(e)) => warn!("NL pricing enrichment failed for {instance_type}: {e}"),
                    Err(_) => warn!("NL pricing enrichment timed out for {instance_type}"),
                }
            }
        }

        // Tier 5: hard-coded table.
        hardcoded_price(instance_type).map(|p| (p, Provenance::Hardcoded))
    }

    /// Public contract: `price(type, mode, region, ctx) → (hourly_usd, provenance)`.
    /// `region` is fixed at resolver construction (§6's single-region config);
    /// the parameter in the spec's signature is honored via `self.region`.
    pub async fn price(
        &self,
        instance_type: &str,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<PriceQuote, EngineError> {
        let effective = mode.effective();

        if effective == Mode::Spot {
            if let Some((price, provenance)) = self.resolve_direct(instance_type, Mode::Spot, cancel).await {
                return Ok(PriceQuote {
                    hourly_usd: price,
                    provenance,
                });
            }
            // No direct spot quote above tier 3: derive from on-demand.
            if let Some((on_demand_price, provenance)) =
                self.resolve_direct(instance_type, Mode::OnDemand, cancel).await
            {
                return Ok(PriceQuote {
                    hourly_usd: derive_spot_price(on_demand_price),
                    provenance,
                });
            }
        } else if let Some((price, provenance)) = self.resolve_direct(instance_type, Mode::OnDemand, cancel).await {
            return Ok(PriceQuote {
                hourly_usd: price,
                provenance,
            });
        }

        Err(EngineError::PricingExhausted {
            instance_type: instance_type.to_string(),
            mode: effective.to_string(),
        })
    }

    /// `list_available_types(architecture, ctx) → set of candidate instances`.
    pub async fn list_available_types(
        &self,
        architecture: Architecture,
        cancel: &CancellationToken,
    ) -> Vec<CandidateInstance> {
        if self.breaker_allows_attempt().await && !cancel.is_cancelled() {
            if let Ok(permit) = self.live_permits.acquire().await {
                let call = self.live.list_types(architecture, cancel);
                if let Ok(Ok(types)) = timeout(LIVE_CALL_DEADLINE, call).await {
                    self.record_live_success().await;
                    drop(permit);
                    return types.into_iter().filter(|c| !c.is_gpu).collect();
                }
                self.record_live_failure().await;
            }
        }
        builtin_catalog(architecture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PricingError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenHardcodedSource;

    #[async_trait]
    impl LivePriceSource for FlakyThenHardcodedSource {
        async fn fetch_price(
            &self,
            _instance_type: &str,
            _mode: Mode,
            _region: &str,
            _cancel: &CancellationToken,
        ) -> Result<f64, PricingError> {
            Err(PricingError::Transient("unreachable catalog".into()))
        }

        async fn list_types(
            &self,
            _architecture: Architecture,
            _cancel: &CancellationToken,
        ) -> Result<Vec<CandidateInstance>, PricingError> {
            Err(PricingError::Transient("unreachable catalog".into()))
        }
    }

    struct CountingLiveSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LivePriceSource for CountingLiveSource {
        async fn fetch_price(
            &self,
            _instance_type: &str,
            _mode: Mode,
            _region: &str,
            _cancel: &CancellationToken,
        ) -> Result<f64, PricingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.20)
        }

        async fn list_types(
            &self,
            architecture: Architecture,
            _cancel: &CancellationToken,
        ) -> Result<Vec<CandidateInstance>, PricingError> {
            Ok(builtin_catalog(architecture))
        }
    }

    #[tokio::test]
    async fn falls_through_to_hardcoded_when_live_fails() {
        let resolver = PricingResolver::new(Arc::new(FlakyThenHardcodedSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let quote = resolver.price("m5.large", Mode::OnDemand, &cancel).await.unwrap();
        assert_eq!(quote.provenance, Provenance::Hardcoded);
    }

    #[tokio::test]
    async fn spot_derives_from_on_demand_when_no_direct_quote() {
        let resolver = PricingResolver::new(Arc::new(FlakyThenHardcodedSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let on_demand = resolver.price("m5.large", Mode::OnDemand, &cancel).await.unwrap();
        let spot = resolver.price("m5.large", Mode::Spot, &cancel).await.unwrap();
        assert!((spot.hourly_usd - on_demand.hourly_usd * 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn second_lookup_for_same_key_hits_cache() {
        let source = Arc::new(CountingLiveSource { calls: AtomicU32::new(0) });
        let resolver = PricingResolver::new(source.clone(), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let first = resolver.price("c5.large", Mode::OnDemand, &cancel).await.unwrap();
        let second = resolver.price("c5.large", Mode::OnDemand, &cancel).await.unwrap();
        assert_eq!(first.hourly_usd, second.hourly_usd);
        assert_eq!(second.provenance, Provenance::Cache);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_trips_after_two_failures_and_skips_live_tier() {
        let resolver = PricingResolver::new(Arc::new(FlakyThenHardcodedSource), Duration::from_secs(60), "us-east-1");
        let cancel = CancellationToken::new();
        let _ = resolver.price("c5.xlarge", Mode::OnDemand, &cancel).await;
        let _ = resolver.price("r5.large", Mode::OnDemand, &cancel).await;
        assert!(matches!(
            *resolver.breaker.lock().await,
            CircuitState::Open { .. }
        ));
    }
}
