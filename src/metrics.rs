use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::resolver::Resource;

/// Hit/miss pair for one cached resource type.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Metrics {
    pub forecast: Arc<CacheCounters>,
    pub pollen: Arc<CacheCounters>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Body of `/debug/vars`.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub cmdline: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    #[serde(rename = "Cache hits")]
    pub cache_hits: u64,
    #[serde(rename = "Cache misses")]
    pub cache_misses: u64,
    pub caches: BTreeMap<&'static str, CacheStats>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            forecast: Arc::default(),
            pollen: Arc::default(),
            started_at: Utc::now(),
        }
    }

    pub fn counters(&self, resource: Resource) -> Arc<CacheCounters> {
        match resource {
            Resource::Forecast => Arc::clone(&self.forecast),
            Resource::Pollen => Arc::clone(&self.pollen),
        }
    }

    /// `entries` supplies the current physical size of each resource's cache.
    pub fn snapshot(&self, entries: impl Fn(Resource) -> usize) -> MetricsSnapshot {
        let now = Utc::now();
        let caches: BTreeMap<_, _> = [Resource::Forecast, Resource::Pollen]
            .into_iter()
            .map(|resource| {
                let counters = self.counters(resource);
                (
                    resource.as_str(),
                    CacheStats {
                        hits: counters.hits(),
                        misses: counters.misses(),
                        entries: entries(resource),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            cmdline: redact_cmdline(std::env::args()),
            started_at: self.started_at,
            uptime_seconds: (now - self.started_at).num_seconds(),
            cache_hits: caches.values().map(|c| c.hits).sum(),
            cache_misses: caches.values().map(|c| c.misses).sum(),
            caches,
        }
    }
}

/// Flags whose values must never show up on `/debug/vars`.
const SECRET_FLAGS: [&str; 2] = ["--apikey", "--debug-password"];

const REDACTED: &str = "<redacted>";

/// Masks the values of secret flags, in both `--flag value` and
/// `--flag=value` form.
pub fn redact_cmdline(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut redacted = Vec::new();
    let mut mask_next = false;

    for arg in args {
        if mask_next {
            redacted.push(REDACTED.to_string());
            mask_next = false;
            continue;
        }

        match arg.split_once('=') {
            Some((flag, _)) if SECRET_FLAGS.contains(&flag) => redacted.push(format!("{}={}", flag, REDACTED)),
            _ => {
                mask_next = SECRET_FLAGS.contains(&arg.as_str());
                redacted.push(arg);
            }
        }
    }

    redacted
}
