//! In-process price cache: TTL-bounded LRU plus a singleflight gate so
//! concurrent lookups for the same key collapse into one tier-1 call (§4.2,
//! §5). Grounded on the pack's price-estimation caching pattern, adapted to
//! `tokio::sync` primitives the way the teacher threads `Arc<Client>` handles.

use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

use crate::types::Mode;

/// Cache key: an (instance type, mode, region) triple. Mode is normalized to
/// its `effective()` form before lookup — `Unknown` and `OnDemand` share an
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instance_type: String,
    pub mode: Mode,
    pub region: String,
}

impl CacheKey {
    pub fn new(instance_type: impl Into<String>, mode: Mode, region: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into(),
            mode: mode.effective(),
            region: region.into(),
        }
    }
}

struct Entry {
    price: f64,
    inserted_at: Instant,
}

const DEFAULT_CAPACITY: usize = 4096;

pub struct PriceCache {
    ttl: Duration,
    inner: Mutex<LruCache<CacheKey, Entry>>,
    inflight: DashMap<CacheKey, Arc<Notify>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap())),
            inflight: DashMap::new(),
        }
    }

    /// Returns a cached price if present and not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<f64> {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.price);
            }
            guard.pop(key);
        }
        None
    }

    pub async fn put(&self, key: CacheKey, price: f64) {
        let mut guard = self.inner.lock().await;
        guard.put(
            key,
            Entry {
                price,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Singleflight gate: the first caller for a key becomes the "leader" and
    /// must call `finish` when done; followers wait on the leader's `Notify`
    /// and then re-check the cache themselves.
    pub fn enter_singleflight(&self, key: &CacheKey) -> SingleflightSlot {
        if let Some(existing) = self.inflight.get(key) {
            return SingleflightSlot::Follower(existing.clone());
        }
        let notify = Arc::new(Notify::new());
        match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(notify.clone());
                SingleflightSlot::Leader(key.clone())
            }
            dashmap::mapref::entry::Entry::Occupied(o) => SingleflightSlot::Follower(o.get().clone()),
        }
    }

    pub fn finish_singleflight(&self, key: &CacheKey) {
        if let Some((_, notify)) = self.inflight.remove(key) {
            notify.notify_waiters();
        }
    }
}

pub enum SingleflightSlot {
    Leader(CacheKey),
    Follower(Arc<Notify>),
}
