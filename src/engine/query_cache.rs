use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

use crate::utils::error::WeaveError;
use crate::utils::types::QueryOutput;

/// Result shared between the computing party and its waiters: the output is
/// `Arc`-shared, failures are cloned to every caller in flight.
pub type SharedResult = Result<Arc<QueryOutput>, WeaveError>;

/// Cache key for one query: SHA-256 over the normalized query text.
pub fn fingerprint(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(sql).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize query text so formatting differences share a fingerprint:
/// whitespace runs collapse to one space and everything outside
/// single-quoted string literals is lowercased.
fn normalize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    let mut pending_space = false;
    for ch in sql.trim().chars() {
        if !in_string && ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if ch == '\'' {
            in_string = !in_string;
        }
        if in_string {
            out.push(ch);
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

struct CacheEntry {
    output: Arc<QueryOutput>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Outcome of a cache lookup. A miss is not an error.
pub enum CacheLookup {
    Hit(Arc<QueryOutput>),
    Miss,
}

/// Claim on a fingerprint's execution slot: either this caller leads the
/// computation, or it waits on the leader's watch channel.
pub enum Flight {
    Lead(watch::Sender<Option<SharedResult>>),
    Wait(watch::Receiver<Option<SharedResult>>),
}

/// TTL'd result cache with single-flight de-duplication.
///
/// Entries are keyed by fingerprint and never served past their TTL. The
/// in-flight registry guarantees at most one backend-touching execution per
/// fingerprint at a time; concurrent callers block on the leader's watch
/// channel and receive its published result, success or failure. Entries are
/// evicted on expiry or explicit invalidation only — a schema change at a
/// backend is invisible until then (documented limitation).
pub struct ResultCache {
    enabled: bool,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, watch::Receiver<Option<SharedResult>>>,
}

impl ResultCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn lookup(&self, fingerprint: &str) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        if let Some(entry) = self.entries.get(fingerprint) {
            if !entry.expired() {
                debug!(target: "cache", key = %fingerprint, "cache hit");
                return CacheLookup::Hit(entry.output.clone());
            }
        }
        self.entries.remove_if(fingerprint, |_, entry| entry.expired());
        debug!(target: "cache", key = %fingerprint, "cache miss");
        CacheLookup::Miss
    }

    pub fn store(&self, fingerprint: &str, output: Arc<QueryOutput>) {
        if !self.enabled {
            return;
        }
        debug!(
            target: "cache",
            key = %fingerprint,
            rows = output.row_count(),
            ttl_secs = self.ttl.as_secs(),
            "caching query result"
        );
        self.entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                output,
                created_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    /// Drop one fingerprint's entry.
    pub fn invalidate(&self, fingerprint: &str) {
        self.entries.remove(fingerprint);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Claim the execution slot for a fingerprint. The first caller becomes
    /// the leader and must call [`ResultCache::publish`] exactly once;
    /// everyone else receives a waiter handle.
    pub fn begin(&self, fingerprint: &str) -> Flight {
        match self.in_flight.entry(fingerprint.to_string()) {
            Entry::Occupied(entry) => Flight::Wait(entry.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Flight::Lead(tx)
            }
        }
    }

    /// Publish the leader's result to all waiters and release the slot.
    pub fn publish(
        &self,
        fingerprint: &str,
        tx: watch::Sender<Option<SharedResult>>,
        result: SharedResult,
    ) {
        // Publish before deregistering: waiters already holding the channel
        // observe the value, later callers start a fresh flight.
        let _ = tx.send(Some(result));
        self.in_flight.remove(fingerprint);
    }

    /// Block (without polling) until the leader publishes.
    pub async fn wait(mut rx: watch::Receiver<Option<SharedResult>>) -> SharedResult {
        loop {
            {
                let value = rx.borrow();
                if let Some(result) = value.as_ref() {
                    return result.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Err(WeaveError::Internal(
                    "in-flight execution dropped without publishing a result".to_string(),
                ));
            }
        }
    }
}

/// Counters shared by every query execution. Atomic: a lost update is a
/// correctness bug, not an acceptable race.
#[derive(Default)]
pub struct EngineStatistics {
    queries_executed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_data_transferred: AtomicU64,
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub queries_executed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Rows fetched from backends; cache hits contribute zero.
    pub total_data_transferred: u64,
}

impl EngineStatistics {
    pub fn record_query(&self) {
        self.queries_executed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rows_fetched(&self, rows: u64) {
        self.total_data_transferred.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            cache_misses: self.cache_misses.load(Ordering::SeqCst),
            total_data_transferred: self.total_data_transferred.load(Ordering::SeqCst),
        }
    }
}
