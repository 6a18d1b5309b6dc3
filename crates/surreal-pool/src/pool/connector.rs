//! Opening, authenticating, validating and closing individual connections.

use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::client::{Client, ClientFactory};
use crate::config::PoolConfig;
use crate::credentials::Credentials;
use crate::error::{PoolError, PoolResult};
use crate::retry::{Backoff, RetryPolicy, retry_with_backoff};

use super::stats::PoolCounters;

/// Deadline for the transport-level connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cheap round-trip used for validation and health checks.
pub const VALIDATION_QUERY: &str = "SELECT 1";

/// Upper bound on the backoff between creation attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Create a connection, retrying connection, timeout and system failures
/// with exponential backoff. Authentication failures return immediately.
pub(crate) async fn create_with_retry(
    factory: &dyn ClientFactory,
    credentials: &Credentials,
    config: &PoolConfig,
    counters: &PoolCounters,
) -> PoolResult<Client> {
    let policy = RetryPolicy::new(
        config.creation_attempts(),
        Backoff::new(config.retry_delay, MAX_RETRY_DELAY),
    );
    retry_with_backoff(&policy, "create_connection", move |_| {
        create_connection(factory, credentials, counters)
    })
    .await
}

async fn create_connection(
    factory: &dyn ClientFactory,
    credentials: &Credentials,
    counters: &PoolCounters,
) -> PoolResult<Client> {
    let started = Instant::now();
    let result = establish(factory, credentials).await;
    match &result {
        Ok(_) => debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            auth_level = %credentials.auth_level,
            "connection established"
        ),
        Err(e) => {
            counters.record_connection_error();
            debug!(category = %e.category(), error = %e, "connection attempt failed");
        }
    }
    result
}

/// Connect, select namespace and database, then sign in.
async fn establish(factory: &dyn ClientFactory, credentials: &Credentials) -> PoolResult<Client> {
    let level = credentials.auth_level;
    let signin = credentials.signin().ok_or_else(|| {
        PoolError::authentication(format!("{level}-level sign-in requires a namespace"), level)
    })?;

    let client = match timeout(CONNECT_TIMEOUT, factory.connect(&credentials.endpoint)).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => return Err(PoolError::connection(format!("connect failed: {e}"))),
        Err(_) => {
            return Err(PoolError::connection(format!(
                "connect timed out after {}ms",
                CONNECT_TIMEOUT.as_millis()
            )));
        }
    };

    if let Some((namespace, database)) = credentials.scope() {
        if let Err(e) = client.use_scope(namespace, database).await {
            close_quietly(&client, "-").await;
            return Err(PoolError::connection(format!(
                "failed to select namespace/database: {e}"
            )));
        }
    }

    if let Err(e) = client.signin(signin).await {
        close_quietly(&client, "-").await;
        return Err(PoolError::authentication(
            format!("{level}-level sign-in rejected: {e}"),
            level,
        ));
    }
    Ok(client)
}

/// Round-trip [`VALIDATION_QUERY`] within `deadline`.
pub(crate) async fn validate(client: &Client, deadline: Duration) -> Result<(), String> {
    match timeout(deadline, client.query(VALIDATION_QUERY)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("validation query failed: {e}")),
        Err(_) => Err(format!("validation timed out after {}ms", deadline.as_millis())),
    }
}

/// Close a client, logging and swallowing any failure.
pub(crate) async fn close_quietly(client: &Client, pool_key: &str) {
    if let Err(e) = client.close().await {
        warn!(pool_key, error = %e, "error closing connection");
    }
}
