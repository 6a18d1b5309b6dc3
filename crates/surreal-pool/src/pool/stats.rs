//! Request counters and statistics snapshots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Aggregate statistics across every key.
///
/// Connection counts are recomputed from the live entries on each call;
/// the request and error figures are running totals since construction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    /// Requests currently inside `get_connection`.
    pub waiting_requests: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Mean successful acquisition latency in milliseconds.
    pub average_response_time: f64,
    /// Borrowed share of live connections, in percent.
    pub pool_utilization: f64,
    /// Failed connection-creation attempts, counting each retry.
    pub connection_errors: u64,
    pub health_check_failures: u64,
}

impl PoolStats {
    /// Share of requests that succeeded, in percent. 100 when nothing was requested.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 100.0;
        }
        let succeeded = self.total_requests.saturating_sub(self.failed_requests);
        succeeded as f64 / self.total_requests as f64 * 100.0
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Status: {} total, {} active, {} idle | \
             Performance: {} requests, {:.1}% success rate, {:.2}ms avg response | \
             Health: {:.1}% utilization, {} connection errors, {} health check failures | \
             Queue: {} waiting requests",
            self.total_connections,
            self.active_connections,
            self.idle_connections,
            self.total_requests,
            self.success_rate(),
            self.average_response_time,
            self.pool_utilization,
            self.connection_errors,
            self.health_check_failures,
            self.waiting_requests,
        )
    }
}

/// Statistics for a single key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    /// Connections currently borrowed.
    pub active: usize,
    /// Connections sitting idle in the pool.
    pub idle: usize,
    /// Total connections (active + idle).
    pub total: usize,
    /// Number of times an acquisition had to wait for a release.
    pub wait_count: u64,
}

/// Running counters shared by the manager, the connector and the monitors.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_micros: AtomicU64,
    waiting_requests: AtomicU64,
    connection_errors: AtomicU64,
    health_check_failures: AtomicU64,
}

impl PoolCounters {
    /// Count a new request as total and waiting until the guard drops.
    pub(crate) fn begin_request(&self) -> WaitingGuard<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.waiting_requests.fetch_add(1, Ordering::Relaxed);
        WaitingGuard { counters: self }
    }

    pub(crate) fn record_success(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Combine the counters with connection counts observed by the caller.
    pub(crate) fn snapshot(&self, total: usize, active: usize) -> PoolStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let response_micros = self.total_response_micros.load(Ordering::Relaxed);
        let average_response_time = if total_requests == 0 {
            0.0
        } else {
            response_micros as f64 / total_requests as f64 / 1000.0
        };
        let pool_utilization = if total == 0 {
            0.0
        } else {
            active as f64 / total as f64 * 100.0
        };

        PoolStats {
            total_connections: total,
            active_connections: active,
            idle_connections: total - active,
            waiting_requests: self.waiting_requests.load(Ordering::Relaxed),
            total_requests,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
            pool_utilization,
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }
}

/// Decrements `waiting_requests` on every exit path, cancellation included.
pub(crate) struct WaitingGuard<'a> {
    counters: &'a PoolCounters,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counters.waiting_requests.fetch_sub(1, Ordering::Relaxed);
    }
}
