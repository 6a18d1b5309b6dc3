//! Keyed connection pool manager.
//!
//! Connections are pooled per [`PoolKey`], a digest of the full credential
//! set, and handed to callers as shared [`Client`] handles.
//!
//! # Architecture
//!
//! ```text
//! get_connection(credentials)
//!   → PoolKey::derive(credentials)
//!     → per-key pool (created lazily)
//!       → slot permit available?  no → wait (FIFO, bounded by acquire_timeout)
//!       → idle + healthy entry?   yes → claim, validate, return
//!                                  no → create (connect, use, signin; retried) → return
//! release_connection(credentials, client) → entry marked idle, slot returned
//!
//! per-key health monitor (every health_check_interval)
//!   → validate idle entries, evict after 3 consecutive failures
//!   → reap entries idle beyond max_idle_time, down to min_connections
//! ```
//!
//! Each key owns a semaphore with `max_connections` permits. A borrowed entry
//! holds one permit as its lease and an in-flight creation holds another, so
//! the number of live entries per key never exceeds `max_connections`.

mod acquire;
mod connector;
mod monitor;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientFactory, same_client};
use crate::config::PoolConfig;
use crate::credentials::Credentials;
use crate::error::{ConfigError, PoolError, PoolResult};
use crate::key::PoolKey;

use self::monitor::HealthMonitors;
use self::stats::{KeyStats, PoolCounters, PoolStats};

pub use self::connector::{CONNECT_TIMEOUT, VALIDATION_QUERY};
pub use self::monitor::MAX_CONSECUTIVE_ERRORS;

/// A pooled connection with lifecycle metadata.
#[derive(Debug)]
pub(crate) struct PoolEntry {
    /// Unique ID for this entry within the manager.
    pub(crate) id: u64,
    pub(crate) client: Client,
    pub(crate) created_at: Instant,
    /// When the entry was last claimed or returned.
    pub(crate) last_used: Instant,
    pub(crate) last_health_check: Instant,
    pub(crate) healthy: bool,
    pub(crate) consecutive_errors: u32,
    /// Slot permit, held exactly while the entry is borrowed.
    lease: Option<OwnedSemaphorePermit>,
}

impl PoolEntry {
    /// A freshly created entry, already borrowed by its creator.
    pub(crate) fn new(id: u64, client: Client, lease: OwnedSemaphorePermit) -> Self {
        let now = Instant::now();
        Self {
            id,
            client,
            created_at: now,
            last_used: now,
            last_health_check: now,
            healthy: true,
            consecutive_errors: 0,
            lease: Some(lease),
        }
    }

    pub(crate) fn in_use(&self) -> bool {
        self.lease.is_some()
    }

    pub(crate) fn is_available(&self) -> bool {
        !self.in_use() && self.healthy
    }

    pub(crate) fn claim(&mut self, lease: OwnedSemaphorePermit) {
        self.lease = Some(lease);
        self.last_used = Instant::now();
    }

    /// Return the entry to idle. Returns `false` if it was not borrowed.
    pub(crate) fn release(&mut self) -> bool {
        if self.lease.take().is_none() {
            return false;
        }
        self.last_used = Instant::now();
        true
    }

    pub(crate) fn take_lease(&mut self) -> Option<OwnedSemaphorePermit> {
        self.lease.take()
    }

    pub(crate) fn mark_healthy(&mut self, now: Instant) {
        self.healthy = true;
        self.consecutive_errors = 0;
        self.last_health_check = now;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.healthy = false;
        self.consecutive_errors += 1;
    }
}

/// Per-key pool: the entries plus the semaphore bounding them.
#[derive(Debug)]
pub(crate) struct KeyedPool {
    pub(crate) key: PoolKey,
    pub(crate) entries: Mutex<Vec<PoolEntry>>,
    pub(crate) slots: Arc<Semaphore>,
    /// Connections being created under a reserved slot but not yet in
    /// `entries`. Only changed while `entries` is locked, or by a dropped
    /// reservation before its slot is returned.
    pub(crate) creating: AtomicUsize,
    /// Acquisitions that found this key at capacity and had to wait.
    pub(crate) wait_count: AtomicU64,
}

impl KeyedPool {
    fn new(key: PoolKey, max_connections: usize) -> Self {
        Self {
            key,
            entries: Mutex::new(Vec::new()),
            slots: Arc::new(Semaphore::new(max_connections)),
            creating: AtomicUsize::new(0),
            wait_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// `(live entries, borrowed entries)` observed under one lock.
    pub(crate) async fn occupancy(&self) -> (usize, usize) {
        let entries = self.entries.lock().await;
        let active = entries.iter().filter(|e| e.in_use()).count();
        (entries.len(), active)
    }
}

/// Manages connection pools keyed by credential digest.
///
/// Constructed explicitly and shared by reference (typically in an `Arc`)
/// with whatever needs database access. Call [`close`](Self::close) on
/// shutdown to stop the health monitors and close every connection.
pub struct ConnectionPool {
    /// Per-key pools.
    pools: Mutex<HashMap<PoolKey, Arc<KeyedPool>>>,
    /// One background health monitor per key that has created a connection.
    monitors: HealthMonitors,
    config: Arc<PoolConfig>,
    factory: Arc<dyn ClientFactory>,
    counters: Arc<PoolCounters>,
    /// Source of `PoolEntry::id`; ids are never reused across keys.
    next_id: AtomicU64,
    /// Set once by `close()`. Afterwards no per-key pool is created, so
    /// acquisitions fail with `PoolClosed` and releases find nothing to return.
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool with the given configuration and client factory.
    pub fn new(config: PoolConfig, factory: Arc<dyn ClientFactory>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pools: Mutex::new(HashMap::new()),
            monitors: HealthMonitors::new(),
            config: Arc::new(config),
            factory,
            counters: Arc::new(PoolCounters::default()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Borrow a connection for `credentials`.
    ///
    /// Reuses an idle healthy connection when one exists, creates a new one
    /// while the key is below `max_connections`, and otherwise waits up to
    /// `acquire_timeout` for a release.
    pub async fn get_connection(&self, credentials: &Credentials) -> PoolResult<Client> {
        let key = PoolKey::derive(credentials);
        let started = Instant::now();
        let _waiting = self.counters.begin_request();

        let result = match self.pool_for(&key).await {
            Ok(pool) => self.acquire(&pool, credentials).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                let elapsed = started.elapsed();
                self.counters.record_success(elapsed);
                debug!(
                    pool_key = %key.short(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "acquired connection"
                );
            }
            Err(e) => {
                self.counters.record_failure();
                warn!(
                    pool_key = %key.short(),
                    category = %e.category(),
                    error = %e,
                    "failed to acquire connection"
                );
            }
        }
        result
    }

    /// Return a borrowed connection to its pool.
    ///
    /// Unknown pools, unknown clients and repeated releases are ignored.
    pub async fn release_connection(&self, credentials: &Credentials, client: &Client) {
        let key = PoolKey::derive(credentials);
        let Some(pool) = self.pools.lock().await.get(&key).cloned() else {
            warn!(pool_key = %key.short(), "release for unknown pool ignored");
            return;
        };

        let mut entries = pool.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| same_client(&e.client, client)) else {
            debug!(pool_key = %key.short(), "release of unknown connection ignored");
            return;
        };
        if entry.release() {
            debug!(
                pool_key = %key.short(),
                entry = entry.id,
                "returned connection to pool"
            );
        } else {
            debug!(pool_key = %key.short(), entry = entry.id, "connection already idle");
        }
    }

    /// Stop every health monitor, close every connection and clear all
    /// pool state. Safe to call more than once.
    pub async fn close(&self) {
        let pools: Vec<Arc<KeyedPool>> = {
            let mut pools = self.pools.lock().await;
            self.closed.store(true, Ordering::SeqCst);
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in &pools {
            // Wakes waiters on this key with `PoolClosed`.
            pool.slots.close();
        }
        let stopped = self.monitors.stop_all().await;

        let mut clients = Vec::new();
        for pool in &pools {
            let mut entries = pool.entries.lock().await;
            clients.extend(entries.drain(..).map(|e| (pool.key.clone(), e.client)));
        }

        futures::future::join_all(
            clients
                .iter()
                .map(|(key, client)| connector::close_quietly(client, key.short())),
        )
        .await;

        info!(
            pools = pools.len(),
            monitors = stopped,
            closed = clients.len(),
            "connection pool closed"
        );
    }

    /// Aggregate statistics, recomputed from the live entries.
    pub async fn stats(&self) -> PoolStats {
        let pools: Vec<Arc<KeyedPool>> = self.pools.lock().await.values().cloned().collect();
        let mut total = 0;
        let mut active = 0;
        for pool in pools {
            let (size, borrowed) = pool.occupancy().await;
            total += size;
            active += borrowed;
        }
        self.counters.snapshot(total, active)
    }

    /// Statistics for the pool serving `credentials`.
    pub async fn key_stats(&self, credentials: &Credentials) -> KeyStats {
        let key = PoolKey::derive(credentials);
        let Some(pool) = self.pools.lock().await.get(&key).cloned() else {
            return KeyStats::default();
        };
        let (total, active) = pool.occupancy().await;
        KeyStats {
            active,
            idle: total - active,
            total,
            wait_count: pool.wait_count.load(Ordering::Relaxed),
        }
    }

    /// Run one health sweep over every key. Returns the number of entries evicted.
    pub async fn health_check_idle(&self) -> usize {
        let mut evicted = 0;
        for pool in self.all_pools().await {
            evicted += monitor::health_sweep(&pool, &self.config, &self.counters).await;
        }
        evicted
    }

    /// Run one idle-reaper pass over every key. Returns the number of entries reaped.
    pub async fn reap_idle(&self) -> usize {
        let mut reaped = 0;
        for pool in self.all_pools().await {
            reaped += monitor::reap_idle(&pool, &self.config).await;
        }
        reaped
    }

    /// Keys with a running health monitor.
    pub async fn monitored_keys(&self) -> Vec<PoolKey> {
        self.monitors.keys().await
    }

    /// Look up or lazily create the pool for `key`.
    async fn pool_for(&self, key: &PoolKey) -> PoolResult<Arc<KeyedPool>> {
        let mut pools = self.pools.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::pool_closed(key));
        }
        let pool = pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyedPool::new(key.clone(), self.config.max_connections)));
        Ok(Arc::clone(pool))
    }

    async fn all_pools(&self) -> Vec<Arc<KeyedPool>> {
        self.pools.lock().await.values().cloned().collect()
    }
}

// ── Debug ───────────────────────────────────────────────────────────

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::testing::MockFactory;
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials::root("ws://db.local:8000/rpc", "root", "root").with_namespace("app")
    }

    fn test_config() -> PoolConfig {
        PoolConfig {
            max_connections: 3,
            min_connections: 0,
            acquire_timeout: Duration::from_millis(200),
            health_check_interval: Duration::ZERO,
            retry_delay: Duration::from_millis(10),
            ..PoolConfig::default()
        }
    }

    fn make_pool(config: PoolConfig) -> (ConnectionPool, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::default());
        let pool = ConnectionPool::new(config, factory.clone()).unwrap();
        (pool, factory)
    }

    fn as_client(mock: &Arc<crate::testing::MockClient>) -> Client {
        Arc::clone(mock) as Client
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = PoolConfig {
            max_connections: 1,
            min_connections: 2,
            ..PoolConfig::default()
        };
        assert!(ConnectionPool::new(config, Arc::new(MockFactory::default())).is_err());
    }

    // ── get_connection ──────────────────────────────────────────────

    #[tokio::test]
    async fn get_connection_creates_via_factory() {
        let (pool, factory) = make_pool(test_config());
        let client = pool.get_connection(&creds()).await.unwrap();
        assert_eq!(factory.connects(), 1);
        assert!(same_client(&client, &as_client(&factory.client(0))));
    }

    #[tokio::test]
    async fn release_then_get_returns_same_client() {
        let (pool, factory) = make_pool(test_config());
        let c = creds();

        let first = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &first).await;
        let second = pool.get_connection(&c).await.unwrap();

        assert!(same_client(&first, &second));
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn borrowed_connections_are_not_shared() {
        let (pool, factory) = make_pool(test_config());
        let a = pool.get_connection(&creds()).await.unwrap();
        let b = pool.get_connection(&creds()).await.unwrap();
        assert!(!same_client(&a, &b));
        assert_eq!(factory.connects(), 2);
    }

    #[tokio::test]
    async fn different_credentials_get_separate_pools() {
        let (pool, factory) = make_pool(test_config());
        let a = creds();
        let mut b = creds();
        b.password = "other".to_string();

        let ca = pool.get_connection(&a).await.unwrap();
        pool.release_connection(&a, &ca).await;
        pool.get_connection(&b).await.unwrap();

        assert_eq!(factory.connects(), 2);
        assert_eq!(pool.key_stats(&a).await.idle, 1);
        assert_eq!(pool.key_stats(&b).await.active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out_with_context() {
        let config = PoolConfig {
            max_connections: 2,
            ..test_config()
        };
        let (pool, _) = make_pool(config);
        let c = creds();
        pool.get_connection(&c).await.unwrap();
        pool.get_connection(&c).await.unwrap();

        let err = pool.get_connection(&c).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Timeout);
        let ctx = err.context();
        assert_eq!(ctx.pool_key, Some(PoolKey::derive(&c)));
        assert_eq!(ctx.pool_size, Some(2));
        assert_eq!(ctx.active_connections, Some(2));
        assert_eq!(pool.key_stats(&c).await.wait_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_wakes_waiter() {
        let config = PoolConfig {
            max_connections: 1,
            ..test_config()
        };
        let (pool, factory) = make_pool(config);
        let pool = Arc::new(pool);
        let c = creds();

        let held = pool.get_connection(&c).await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            let c = c.clone();
            tokio::spawn(async move { pool.get_connection(&c).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release_connection(&c, &held).await;

        let got = waiter.await.unwrap().unwrap();
        assert!(same_client(&held, &got));
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn creation_failure_carries_pool_context() {
        let config = PoolConfig {
            retry_attempts: 2,
            ..test_config()
        };
        let (pool, factory) = make_pool(config);
        factory.fail_next(10);

        let err = pool.get_connection(&creds()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert_eq!(err.context().pool_size, Some(0));
        assert_eq!(err.context().max_connections, Some(3));

        let stats = pool.stats().await;
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.connection_errors, 2);
        assert_eq!(stats.total_connections, 0);
    }

    #[tokio::test]
    async fn creation_retries_transient_failures() {
        let (pool, factory) = make_pool(test_config());
        factory.fail_next(2);
        assert!(pool.get_connection(&creds()).await.is_ok());
        assert_eq!(factory.connects(), 1);
        assert_eq!(pool.stats().await.connection_errors, 2);
    }

    #[tokio::test]
    async fn failed_creation_frees_its_slot() {
        let config = PoolConfig {
            max_connections: 1,
            retry_attempts: 1,
            ..test_config()
        };
        let (pool, factory) = make_pool(config);
        factory.fail_next(1);
        assert!(pool.get_connection(&creds()).await.is_err());
        assert!(pool.get_connection(&creds()).await.is_ok());
    }

    #[tokio::test]
    async fn authentication_failure_surfaces_as_authentication_error() {
        let (pool, factory) = make_pool(test_config());
        factory.reject_signin.store(true, Ordering::SeqCst);

        let err = pool.get_connection(&creds()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authentication);
        // Not retried, and the half-open client was closed.
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.client(0).closes(), 1);
    }

    // ── validation on reuse ─────────────────────────────────────────

    #[tokio::test]
    async fn failed_validation_discards_entry_and_creates_new_one() {
        let (pool, factory) = make_pool(test_config());
        let c = creds();

        let first = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &first).await;
        factory.client(0).set_unhealthy(true);

        let second = pool.get_connection(&c).await.unwrap();
        assert!(!same_client(&first, &second));
        assert_eq!(factory.client(0).closes(), 1);
        assert_eq!(pool.key_stats(&c).await.total, 1);
    }

    #[tokio::test]
    async fn failed_validation_tries_next_idle_entry() {
        let (pool, factory) = make_pool(test_config());
        let c = creds();

        let a = pool.get_connection(&c).await.unwrap();
        let b = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &a).await;
        pool.release_connection(&c, &b).await;
        factory.client(0).set_unhealthy(true);

        let got = pool.get_connection(&c).await.unwrap();
        assert!(same_client(&got, &b));
        assert_eq!(factory.connects(), 2);
    }

    #[tokio::test]
    async fn validation_disabled_skips_round_trip() {
        let config = PoolConfig {
            enable_connection_validation: false,
            ..test_config()
        };
        let (pool, factory) = make_pool(config);
        let c = creds();

        let first = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &first).await;
        factory.client(0).set_unhealthy(true);

        let second = pool.get_connection(&c).await.unwrap();
        assert!(same_client(&first, &second));
        assert_eq!(factory.client(0).queries.load(Ordering::SeqCst), 0);
    }

    // ── release ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn release_unknown_pool_is_noop() {
        let (pool, factory) = make_pool(test_config());
        let client = pool.get_connection(&creds()).await.unwrap();
        let mut other = creds();
        other.username = "nobody".to_string();

        pool.release_connection(&other, &client).await;
        assert_eq!(pool.key_stats(&creds()).await.active, 1);
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn double_release_is_noop() {
        let config = PoolConfig {
            max_connections: 1,
            ..test_config()
        };
        let (pool, _) = make_pool(config);
        let c = creds();
        let client = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &client).await;
        pool.release_connection(&c, &client).await;

        // The slot was returned once; two borrowers still cannot coexist.
        let _again = pool.get_connection(&c).await.unwrap();
        let stats = pool.key_stats(&c).await;
        assert_eq!((stats.active, stats.idle, stats.total), (1, 0, 1));
    }

    #[tokio::test]
    async fn release_unmatched_client_is_noop() {
        let (pool, _) = make_pool(test_config());
        let c = creds();
        pool.get_connection(&c).await.unwrap();
        let stranger: Client = Arc::new(crate::testing::MockClient::default());
        pool.release_connection(&c, &stranger).await;
        assert_eq!(pool.key_stats(&c).await.active, 1);
    }

    // ── close ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn close_closes_every_connection() {
        let (pool, factory) = make_pool(test_config());
        let c = creds();
        let a = pool.get_connection(&c).await.unwrap();
        let _b = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &a).await;

        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(factory.client(0).closes(), 1);
        assert_eq!(factory.client(1).closes(), 1);
        assert_eq!(pool.stats().await.total_connections, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (pool, factory) = make_pool(test_config());
        pool.get_connection(&creds()).await.unwrap();
        pool.close().await;
        pool.close().await;
        assert_eq!(factory.client(0).closes(), 1);
    }

    #[tokio::test]
    async fn get_connection_after_close_fails() {
        let (pool, _) = make_pool(test_config());
        pool.close().await;
        let err = pool.get_connection(&creds()).await.unwrap_err();
        assert!(matches!(err, PoolError::PoolClosed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn close_fails_pending_waiters() {
        let config = PoolConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            ..test_config()
        };
        let (pool, _) = make_pool(config);
        let pool = Arc::new(pool);
        let _held = pool.get_connection(&creds()).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get_connection(&creds()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close().await;

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PoolError::PoolClosed { .. }));
    }

    #[tokio::test]
    async fn release_after_close_is_noop() {
        let (pool, _) = make_pool(test_config());
        let c = creds();
        let client = pool.get_connection(&c).await.unwrap();
        pool.close().await;
        pool.release_connection(&c, &client).await;
        assert_eq!(pool.stats().await.total_connections, 0);
    }

    // ── stats ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn stats_empty_pool() {
        let (pool, _) = make_pool(test_config());
        let stats = pool.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.idle_connections, 0);
        assert_eq!(stats.waiting_requests, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.pool_utilization, 0.0);
        assert_eq!(stats.average_response_time, 0.0);
    }

    #[tokio::test]
    async fn stats_track_active_and_idle() {
        let (pool, _) = make_pool(test_config());
        let c = creds();
        let a = pool.get_connection(&c).await.unwrap();
        let _b = pool.get_connection(&c).await.unwrap();
        pool.release_connection(&c, &a).await;

        let stats = pool.stats().await;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.idle_connections, 1);
        assert_eq!(stats.pool_utilization, 50.0);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.waiting_requests, 0);
    }

    #[tokio::test]
    async fn key_stats_unknown_key_is_empty() {
        let (pool, _) = make_pool(test_config());
        assert_eq!(pool.key_stats(&creds()).await, KeyStats::default());
    }

    #[tokio::test]
    async fn checkout_release_cycle_no_leak() {
        let config = PoolConfig {
            max_connections: 2,
            ..test_config()
        };
        let (pool, factory) = make_pool(config);
        let c = creds();

        for _ in 0..100 {
            let client = pool.get_connection(&c).await.unwrap();
            pool.release_connection(&c, &client).await;
        }

        assert_eq!(factory.connects(), 1);
        let stats = pool.key_stats(&c).await;
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
    }

    // ── monitor lifecycle ───────────────────────────────────────────

    #[tokio::test]
    async fn monitor_started_on_first_creation() {
        let config = PoolConfig {
            health_check_interval: Duration::from_secs(60),
            ..test_config()
        };
        let (pool, _) = make_pool(config);
        assert!(pool.monitored_keys().await.is_empty());

        pool.get_connection(&creds()).await.unwrap();
        pool.get_connection(&creds()).await.unwrap();
        assert_eq!(pool.monitored_keys().await, vec![PoolKey::derive(&creds())]);

        pool.close().await;
        assert!(pool.monitored_keys().await.is_empty());
    }

    #[tokio::test]
    async fn zero_interval_disables_monitor() {
        let (pool, _) = make_pool(test_config());
        pool.get_connection(&creds()).await.unwrap();
        assert!(pool.monitored_keys().await.is_empty());
    }
}
