//! Per-key background health monitoring and idle reaping.
//!
//! Each key that has created a connection gets one task. Every
//! `health_check_interval` it validates the idle entries, evicts those that
//! failed [`MAX_CONSECUTIVE_ERRORS`] checks in a row, then reaps entries idle
//! longer than `max_idle_time` while keeping `min_connections`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::PoolConfig;
use crate::key::PoolKey;

use super::KeyedPool;
use super::connector;
use super::stats::PoolCounters;

/// Consecutive failed health checks after which an idle entry is evicted.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Registry of running monitor tasks, at most one per key.
pub(crate) struct HealthMonitors {
    slots: Mutex<HashMap<PoolKey, MonitorSlot>>,
}

impl HealthMonitors {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Start the monitor for `pool` unless one is running or monitoring is
    /// disabled by a zero interval.
    pub(crate) async fn ensure_started(
        &self,
        pool: &Arc<KeyedPool>,
        config: &Arc<PoolConfig>,
        counters: &Arc<PoolCounters>,
    ) {
        let period = config.health_check_interval;
        if period.is_zero() {
            return;
        }
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&pool.key) || pool.is_closed() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            Arc::clone(pool),
            Arc::clone(config),
            Arc::clone(counters),
            shutdown_rx,
        ));
        slots.insert(pool.key.clone(), MonitorSlot { handle, shutdown_tx });
        info!(
            pool_key = %pool.key.short(),
            interval_ms = period.as_millis() as u64,
            "health monitor started"
        );
    }

    /// Stop every monitor and wait for its task to finish. Returns how many
    /// were running.
    pub(crate) async fn stop_all(&self) -> usize {
        let slots: Vec<(PoolKey, MonitorSlot)> = self.slots.lock().await.drain().collect();
        let count = slots.len();
        for (key, slot) in slots {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            if let Err(e) = slot.handle.await {
                if !e.is_cancelled() {
                    warn!(pool_key = %key.short(), error = %e, "health monitor task failed");
                }
            }
        }
        count
    }

    pub(crate) async fn keys(&self) -> Vec<PoolKey> {
        self.slots.lock().await.keys().cloned().collect()
    }
}

async fn run(
    pool: Arc<KeyedPool>,
    config: Arc<PoolConfig>,
    counters: Arc<PoolCounters>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let period = config.health_check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                health_sweep(&pool, &config, &counters).await;
                reap_idle(&pool, &config).await;
            }
            _ = shutdown_rx.changed() => {
                debug!(pool_key = %pool.key.short(), "health monitor shutting down");
                break;
            }
        }
    }
}

/// Validate every idle entry concurrently and record the outcome.
///
/// Entries borrowed while the checks ran are left untouched. Returns the
/// number of entries evicted.
pub(crate) async fn health_sweep(pool: &KeyedPool, config: &PoolConfig, counters: &PoolCounters) -> usize {
    let candidates: Vec<(u64, Client)> = {
        let entries = pool.entries.lock().await;
        entries
            .iter()
            .filter(|e| !e.in_use())
            .map(|e| (e.id, Arc::clone(&e.client)))
            .collect()
    };
    if candidates.is_empty() {
        return 0;
    }

    let deadline = config.connection_validation_timeout;
    let results = join_all(candidates.into_iter().map(|(id, client)| async move {
        (id, connector::validate(&client, deadline).await)
    }))
    .await;

    let mut evicted = Vec::new();
    {
        let mut entries = pool.entries.lock().await;
        let now = Instant::now();
        for (id, result) in results {
            let Some(idx) = entries.iter().position(|e| e.id == id) else {
                continue;
            };
            if entries[idx].in_use() {
                continue;
            }
            let evict = match result {
                Ok(()) => {
                    entries[idx].mark_healthy(now);
                    false
                }
                Err(reason) => {
                    counters.record_health_check_failure();
                    let entry = &mut entries[idx];
                    entry.mark_failed();
                    warn!(
                        pool_key = %pool.key.short(),
                        entry = id,
                        consecutive_errors = entry.consecutive_errors,
                        age_s = now.duration_since(entry.created_at).as_secs(),
                        since_healthy_ms = now.duration_since(entry.last_health_check).as_millis() as u64,
                        reason = %reason,
                        "health check failed"
                    );
                    entry.consecutive_errors >= MAX_CONSECUTIVE_ERRORS
                }
            };
            if evict {
                evicted.push(entries.remove(idx));
            }
        }
    }

    if !evicted.is_empty() {
        info!(
            pool_key = %pool.key.short(),
            evicted = evicted.len(),
            "evicting unhealthy connections"
        );
        join_all(
            evicted
                .iter()
                .map(|e| connector::close_quietly(&e.client, pool.key.short())),
        )
        .await;
    }
    evicted.len()
}

/// Remove entries idle longer than `max_idle_time`, oldest first, never
/// dropping the pool below `min_connections`. Returns the number removed.
pub(crate) async fn reap_idle(pool: &KeyedPool, config: &PoolConfig) -> usize {
    let now = Instant::now();
    let (reaped, remaining) = {
        let mut entries = pool.entries.lock().await;
        let mut expired: Vec<(Instant, u64)> = entries
            .iter()
            .filter(|e| !e.in_use() && now.duration_since(e.last_used) > config.max_idle_time)
            .map(|e| (e.last_used, e.id))
            .collect();
        let removable = expired
            .len()
            .min(entries.len().saturating_sub(config.min_connections));
        if removable == 0 {
            return 0;
        }
        expired.sort();
        expired.truncate(removable);

        let mut reaped = Vec::with_capacity(removable);
        let mut idx = 0;
        while idx < entries.len() {
            if expired.iter().any(|&(_, id)| id == entries[idx].id) {
                reaped.push(entries.remove(idx).client);
            } else {
                idx += 1;
            }
        }
        (reaped, entries.len())
    };

    let count = reaped.len();
    info!(
        pool_key = %pool.key.short(),
        reaped = count,
        remaining,
        "reaped idle connections"
    );
    for client in reaped {
        let key = pool.key.clone();
        tokio::spawn(async move {
            connector::close_quietly(&client, key.short()).await;
        });
    }
    count
}
