//! Pool error types.

use std::fmt;

use thiserror::Error;

use crate::credentials::AuthLevel;
use crate::key::PoolKey;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Coarse failure category, used to decide what the retry policy re-attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Connection,
    Authentication,
    Timeout,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::System => write!(f, "system"),
        }
    }
}

/// Diagnostic context attached to every [`PoolError`].
///
/// Holds sizes and the derived pool key only; never credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub pool_key: Option<PoolKey>,
    pub pool_size: Option<usize>,
    pub max_connections: Option<usize>,
    pub active_connections: Option<usize>,
    pub auth_level: Option<AuthLevel>,
}

impl ErrorContext {
    pub fn for_key(key: &PoolKey) -> Self {
        Self {
            pool_key: Some(key.clone()),
            ..Self::default()
        }
    }
}

/// Errors surfaced by [`ConnectionPool::get_connection`](crate::pool::ConnectionPool::get_connection).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Transport or setup failure while creating a connection.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        context: ErrorContext,
    },

    /// The server rejected the credentials. Never retried.
    #[error("authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// A deadline was reached before the operation finished.
    #[error("timeout: {message}")]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    /// Anything not covered by the categories above.
    #[error("system error: {message}")]
    System {
        message: String,
        context: ErrorContext,
    },

    /// The pool (or this key's pool) was closed.
    #[error("connection pool closed")]
    PoolClosed { context: ErrorContext },
}

impl PoolError {
    pub fn connection(message: impl Into<String>) -> Self {
        PoolError::Connection {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn authentication(message: impl Into<String>, level: AuthLevel) -> Self {
        PoolError::Authentication {
            message: message.into(),
            context: ErrorContext {
                auth_level: Some(level),
                ..ErrorContext::default()
            },
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        PoolError::Timeout {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        PoolError::System {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn pool_closed(key: &PoolKey) -> Self {
        PoolError::PoolClosed {
            context: ErrorContext::for_key(key),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PoolError::Connection { .. } => ErrorCategory::Connection,
            PoolError::Authentication { .. } => ErrorCategory::Authentication,
            PoolError::Timeout { .. } => ErrorCategory::Timeout,
            PoolError::System { .. } | PoolError::PoolClosed { .. } => ErrorCategory::System,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            PoolError::Connection { context, .. }
            | PoolError::Authentication { context, .. }
            | PoolError::Timeout { context, .. }
            | PoolError::System { context, .. }
            | PoolError::PoolClosed { context } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            PoolError::Connection { context, .. }
            | PoolError::Authentication { context, .. }
            | PoolError::Timeout { context, .. }
            | PoolError::System { context, .. }
            | PoolError::PoolClosed { context } => context,
        }
    }

    /// Whether this error's category is in `retryable`.
    ///
    /// A closed pool is never worth retrying, whatever its category.
    pub fn is_retryable_in(&self, retryable: &[ErrorCategory]) -> bool {
        !matches!(self, PoolError::PoolClosed { .. }) && retryable.contains(&self.category())
    }

    /// Attach the pool's occupancy at the time of failure.
    pub fn with_pool_context(mut self, key: &PoolKey, pool_size: usize, max_connections: usize) -> Self {
        let context = self.context_mut();
        context.pool_key = Some(key.clone());
        context.pool_size = Some(pool_size);
        context.max_connections = Some(max_connections);
        self
    }

    /// Attach the number of borrowed connections at the time of failure.
    pub fn with_active_connections(mut self, active: usize) -> Self {
        self.context_mut().active_connections = Some(active);
        self
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pool configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("failed to parse pool configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
