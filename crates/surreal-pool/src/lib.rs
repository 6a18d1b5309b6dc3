//! surreal-pool: keyed connection pooling for SurrealDB clients.
//!
//! Connections are pooled per credential set and bounded per key:
//! - **credentials**: Endpoint, namespace/database scope and sign-in level
//! - **key**: SHA-256 pool key derived from the full credential set
//! - **config**: `PoolConfig` defaults, TOML overlays and validation
//! - **error**: Categorized `PoolError` with pool context attached
//! - **retry**: Exponential backoff filtered by error category
//! - **client**: The `DatabaseClient` / `ClientFactory` seam the pool drives
//! - **pool**: `ConnectionPool` acquire/release, health monitoring, idle reaping and stats
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use surreal_pool::{ClientFactory, ConnectionPool, Credentials, DatabaseClient, PoolConfig};
//! # async fn demo(factory: Arc<dyn ClientFactory>) -> anyhow::Result<()> {
//! let pool = ConnectionPool::new(PoolConfig::default(), factory)?;
//! let creds = Credentials::root("ws://127.0.0.1:8000/rpc", "root", "root").with_namespace("app");
//!
//! let client = pool.get_connection(&creds).await?;
//! client.query("INFO FOR DB").await.map_err(anyhow::Error::msg)?;
//! pool.release_connection(&creds, &client).await;
//!
//! println!("{}", pool.stats().await);
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod key;
pub mod pool;
pub mod retry;

#[cfg(test)]
mod testing;

pub use client::{BoxFuture, Client, ClientFactory, DatabaseClient, same_client};
pub use config::{PoolConfig, PoolConfigOverlay};
pub use credentials::{AuthLevel, Credentials, Signin};
pub use error::{ConfigError, ErrorCategory, ErrorContext, PoolError, PoolResult};
pub use key::PoolKey;
pub use pool::ConnectionPool;
pub use pool::stats::{KeyStats, PoolStats};
