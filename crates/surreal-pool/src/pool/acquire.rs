//! Slot reservation, reuse and on-demand creation for one key.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{OwnedSemaphorePermit, TryAcquireError};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::credentials::Credentials;
use crate::error::{PoolError, PoolResult};

use super::connector;
use super::{ConnectionPool, KeyedPool, PoolEntry};

/// Outcome of looking for an idle entry while holding a slot.
enum Claim {
    /// An idle healthy entry now holds the slot.
    Reused { id: u64, client: Client },
    /// Nothing reusable; the slot is kept for a new connection. `evicted`
    /// is an unhealthy idle entry removed to make room for it.
    Create {
        reservation: Reservation,
        evicted: Option<Client>,
    },
}

/// A slot held for a connection that has not been pushed to `entries` yet.
///
/// Counted in `KeyedPool::creating` for as long as it lives. Dropping it
/// decrements the count before the slot goes back to the semaphore.
struct Reservation {
    pool: Arc<KeyedPool>,
    lease: Option<OwnedSemaphorePermit>,
}

impl Reservation {
    /// Must be called with `entries` locked.
    fn new(pool: &Arc<KeyedPool>, lease: OwnedSemaphorePermit) -> Self {
        pool.creating.fetch_add(1, Ordering::SeqCst);
        Self {
            pool: Arc::clone(pool),
            lease: Some(lease),
        }
    }

    /// Convert into the lease of a pushed entry. Must be called with
    /// `entries` locked.
    fn into_lease(mut self) -> Option<OwnedSemaphorePermit> {
        self.lease.take()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.creating.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionPool {
    pub(super) async fn acquire(
        &self,
        pool: &Arc<KeyedPool>,
        credentials: &Credentials,
    ) -> PoolResult<Client> {
        let mut lease = self.reserve_slot(pool).await?;
        loop {
            if pool.is_closed() {
                return Err(PoolError::pool_closed(&pool.key));
            }
            match self.claim_or_reserve(pool, lease).await? {
                Claim::Reused { id, client } => {
                    if !self.config.enable_connection_validation {
                        return Ok(client);
                    }
                    match connector::validate(&client, self.config.connection_validation_timeout).await {
                        Ok(()) => return Ok(client),
                        Err(reason) => {
                            warn!(
                                pool_key = %pool.key.short(),
                                entry = id,
                                reason = %reason,
                                "idle connection failed validation, discarding"
                            );
                            lease = self.discard_claimed(pool, id).await?;
                        }
                    }
                }
                Claim::Create { reservation, evicted } => {
                    return self.create_entry(pool, credentials, reservation, evicted).await;
                }
            }
        }
    }

    /// Take one of the key's slots, waiting in FIFO order up to
    /// `acquire_timeout` when none is free.
    async fn reserve_slot(&self, pool: &KeyedPool) -> PoolResult<OwnedSemaphorePermit> {
        match Arc::clone(&pool.slots).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::pool_closed(&pool.key)),
            Err(TryAcquireError::NoPermits) => {}
        }

        pool.wait_count.fetch_add(1, Ordering::Relaxed);
        debug!(pool_key = %pool.key.short(), "pool at capacity, waiting for a release");

        let wait = self.config.acquire_timeout;
        match tokio::time::timeout(wait, Arc::clone(&pool.slots).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::pool_closed(&pool.key)),
            Err(_) => {
                let (size, active) = pool.occupancy().await;
                Err(PoolError::timeout(format!(
                    "no connection released within {}ms",
                    wait.as_millis()
                ))
                .with_pool_context(&pool.key, size, self.config.max_connections)
                .with_active_connections(active))
            }
        }
    }

    async fn claim_or_reserve(
        &self,
        pool: &Arc<KeyedPool>,
        lease: OwnedSemaphorePermit,
    ) -> PoolResult<Claim> {
        let mut entries = pool.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.is_available()) {
            entry.claim(lease);
            debug!(pool_key = %pool.key.short(), entry = entry.id, "reusing idle connection");
            return Ok(Claim::Reused {
                id: entry.id,
                client: Arc::clone(&entry.client),
            });
        }

        // Idle entries hold no slot, so count them together with creations
        // still in flight. Holding a slot while at capacity means unhealthy
        // idle entries are occupying the room; replace the stalest of them.
        let mut evicted = None;
        let live = entries.len() + pool.creating.load(Ordering::SeqCst);
        if live >= self.config.max_connections {
            let stale = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.in_use() && !e.healthy)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(idx, _)| idx);
            match stale {
                Some(idx) => evicted = Some(entries.remove(idx).client),
                None => {
                    return Err(PoolError::system(format!(
                        "slot granted with {live} live connections and none evictable"
                    ))
                    .with_pool_context(&pool.key, entries.len(), self.config.max_connections));
                }
            }
        }
        Ok(Claim::Create {
            reservation: Reservation::new(pool, lease),
            evicted,
        })
    }

    /// Remove a claimed entry that failed validation and hand its slot back
    /// to the caller.
    async fn discard_claimed(&self, pool: &KeyedPool, id: u64) -> PoolResult<OwnedSemaphorePermit> {
        let mut entry = {
            let mut entries = pool.entries.lock().await;
            match entries.iter().position(|e| e.id == id) {
                Some(idx) => entries.remove(idx),
                // Drained by close() while validating.
                None => return Err(PoolError::pool_closed(&pool.key)),
            }
        };
        let lease = entry.take_lease();
        connector::close_quietly(&entry.client, pool.key.short()).await;
        lease.ok_or_else(|| PoolError::system("claimed connection lost its slot"))
    }

    async fn create_entry(
        &self,
        pool: &Arc<KeyedPool>,
        credentials: &Credentials,
        reservation: Reservation,
        evicted: Option<Client>,
    ) -> PoolResult<Client> {
        let key = &pool.key;
        if let Some(stale) = evicted {
            info!(pool_key = %key.short(), "evicting unhealthy idle connection to make room");
            connector::close_quietly(&stale, key.short()).await;
        }

        let client =
            match connector::create_with_retry(self.factory.as_ref(), credentials, &self.config, &self.counters)
                .await
            {
                Ok(client) => client,
                Err(e) => {
                    let (size, _) = pool.occupancy().await;
                    return Err(e.with_pool_context(key, size, self.config.max_connections));
                }
            };

        let size = {
            let mut entries = pool.entries.lock().await;
            if pool.is_closed() {
                drop(entries);
                connector::close_quietly(&client, key.short()).await;
                return Err(PoolError::pool_closed(key));
            }
            let Some(lease) = reservation.into_lease() else {
                drop(entries);
                connector::close_quietly(&client, key.short()).await;
                return Err(PoolError::system("reserved slot lost before the connection was pooled"));
            };
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            entries.push(PoolEntry::new(id, Arc::clone(&client), lease));
            entries.len()
        };
        info!(
            pool_key = %key.short(),
            pool_size = size,
            max = self.config.max_connections,
            "created new connection"
        );

        self.monitors
            .ensure_started(pool, &self.config, &self.counters)
            .await;
        Ok(client)
    }
}
