//! Time-bounded cache for the maintenance flag
//!
//! Holds a single entry (flag + when it was fetched) that is reused until the
//! revalidation window passes. Lookup failures are cached as
//! [`MaintenanceFlag::Unknown`] like any other outcome, so a dead content
//! source costs one request per window rather than one per page view.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use site_gate_core::MaintenanceFlag;
use tracing::debug;

use super::lookup::FlagSource;

/// Source of "now" for freshness checks
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The one cached lookup result
#[derive(Debug, Clone, Copy)]
struct CachedFlag {
    flag: MaintenanceFlag,
    fetched_at: Instant,
}

impl CachedFlag {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    lookup_failures: AtomicU64,
}

/// Flag cache in front of a [`FlagSource`]
pub struct FlagCache {
    source: Arc<dyn FlagSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: RwLock<Option<CachedFlag>>,
    stats: CacheStats,
}

impl FlagCache {
    /// Cache `source` for `ttl` using the wall clock
    #[must_use]
    pub fn new(source: Arc<dyn FlagSource>, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    /// Cache `source` for `ttl` using `clock`
    #[must_use]
    pub fn with_clock(source: Arc<dyn FlagSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            ttl,
            entry: RwLock::new(None),
            stats: CacheStats::default(),
        }
    }

    /// Current flag, looked up again once the cached one is older than the TTL.
    ///
    /// Never fails: lookup errors resolve to `Unknown`. Concurrent callers
    /// that all miss each do their own lookup; the last writer wins.
    pub async fn current(&self) -> MaintenanceFlag {
        let now = self.clock.now();
        let cached = *self.entry.read();
        if let Some(entry) = cached.filter(|e| e.is_fresh(now, self.ttl)) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            telemetry_metrics::counter!("site_gate_flag_cache_total", "result" => "hit")
                .increment(1);
            return entry.flag;
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        telemetry_metrics::counter!("site_gate_flag_cache_total", "result" => "miss").increment(1);

        let flag = match self.source.fetch().await {
            Ok(flag) => flag,
            Err(e) => {
                self.stats.lookup_failures.fetch_add(1, Ordering::Relaxed);
                telemetry_metrics::counter!("site_gate_flag_lookup_failures_total", "kind" => e.kind())
                    .increment(1);
                debug!(kind = e.kind(), error = %e, "Maintenance lookup failed, flag unknown");
                MaintenanceFlag::Unknown
            }
        };

        *self.entry.write() = Some(CachedFlag {
            flag,
            fetched_at: self.clock.now(),
        });
        flag
    }

    /// Last stored flag regardless of age, without looking anything up
    #[must_use]
    pub fn peek(&self) -> Option<MaintenanceFlag> {
        self.entry.read().map(|e| e.flag)
    }

    /// Drop the cached entry so the next call looks up again
    pub fn invalidate(&self) {
        *self.entry.write() = None;
    }

    /// Revalidation window
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            lookup_failures: self.stats.lookup_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of flag cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Evaluations served from the cached entry
    pub hits: u64,
    /// Evaluations that triggered a lookup
    pub misses: u64,
    /// Lookups that ended in an error
    pub lookup_failures: u64,
}
