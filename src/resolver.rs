//! Cache-aside lookup policy for one resource type.
//!
//! A [`CachedResolver`] owns the resource's TTL cache and its hit/miss
//! counters. On a miss it calls the upstream under a deadline and stores the
//! result on success only. Concurrent misses on the same key are collapsed:
//! callers queue on a per-key gate and re-check the cache once they get it,
//! so a burst of identical requests costs one upstream call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::cache::{spawn_purger, TtlCache};
use crate::metrics::CacheCounters;
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Forecast,
    Pollen,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Forecast => "forecast",
            Resource::Pollen => "pollen",
        }
    }
}

pub fn forecast_key(lat: &str, lon: &str) -> String {
    format!("{}-{},{}", Resource::Forecast.as_str(), lat.trim(), lon.trim())
}

/// Postal codes are matched case-insensitively, so `k1a0b1` and `K1A0B1`
/// share one cache entry and one upstream lookup.
pub fn normalize_zip(zip: &str) -> String {
    zip.trim().to_uppercase()
}

pub fn pollen_key(zip: &str) -> String {
    format!("{}-{}", Resource::Pollen.as_str(), normalize_zip(zip))
}

pub struct CachedResolver<V> {
    resource: Resource,
    cache: Arc<TtlCache<V>>,
    counters: Arc<CacheCounters>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    deadline: Duration,
}

impl<V> CachedResolver<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        resource: Resource,
        cache: TtlCache<V>,
        counters: Arc<CacheCounters>,
        deadline: Duration,
    ) -> Self {
        Self {
            resource,
            cache: Arc::new(cache),
            counters,
            in_flight: DashMap::new(),
            deadline,
        }
    }

    pub fn cache(&self) -> &TtlCache<V> {
        &self.cache
    }

    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    pub fn spawn_purger(&self, interval: Duration) -> JoinHandle<()> {
        spawn_purger(Arc::clone(&self.cache), interval, self.resource.as_str())
    }

    /// Serve `key` from the cache, or run `fetch` and cache its result.
    /// Errors from `fetch` (or from missing the deadline) are returned as-is
    /// and leave the cache untouched.
    pub async fn resolve<F, Fut>(&self, key: &str, fetch: F) -> Result<V, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>>,
    {
        if let Some(value) = self.cache.get(key) {
            self.counters.record_hit();
            tracing::debug!(resource = self.resource.as_str(), key, "Cache hit");
            return Ok(value);
        }

        let release = GateRelease {
            in_flight: &self.in_flight,
            key,
            gate: self.in_flight.entry(key.to_string()).or_default().clone(),
        };
        let _permit = release.gate.lock().await;

        // Whoever held the gate before us may have filled the cache
        if let Some(value) = self.cache.get(key) {
            self.counters.record_hit();
            tracing::debug!(resource = self.resource.as_str(), key, "Cache hit after waiting on in-flight fetch");
            return Ok(value);
        }

        self.counters.record_miss();
        tracing::debug!(resource = self.resource.as_str(), key, "Cache miss, calling upstream");

        let result = match tokio::time::timeout(self.deadline, fetch()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.deadline)),
        };

        if let Ok(value) = &result {
            self.cache.set(key, value.clone());
        }

        result
    }
}

/// Drops this caller's claim on a per-key gate, whether `resolve` returned
/// or was cancelled. The map entry goes away with the last claimant, so only
/// one gate per key is ever in circulation.
struct GateRelease<'a> {
    in_flight: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    gate: Arc<Mutex<()>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        // One reference is the map's, one is ours
        self.in_flight
            .remove_if(self.key, |_, gate| Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2);
    }
}
