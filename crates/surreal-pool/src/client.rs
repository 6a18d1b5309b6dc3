//! Client seam: the traits the pool drives.
//!
//! The pool never talks to the network itself. A [`ClientFactory`] opens
//! connections and each [`DatabaseClient`] runs scope selection, sign-in,
//! queries and close. Both are injected so the pool can be exercised with
//! in-memory mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::credentials::Signin;

/// Boxed future alias used by the object-safe client traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to a pooled client, as handed out to callers.
pub type Client = Arc<dyn DatabaseClient>;

/// One live connection to the database.
pub trait DatabaseClient: Send + Sync + std::fmt::Debug {
    /// Run a statement and return its raw result.
    fn query<'a>(&'a self, statement: &'a str) -> BoxFuture<'a, Result<serde_json::Value, String>>;

    /// Select the namespace and database subsequent statements run against.
    fn use_scope<'a>(&'a self, namespace: &'a str, database: &'a str)
        -> BoxFuture<'a, Result<(), String>>;

    /// Authenticate this connection.
    fn signin<'a>(&'a self, signin: Signin<'a>) -> BoxFuture<'a, Result<(), String>>;

    /// Close the underlying transport.
    fn close(&self) -> BoxFuture<'_, Result<(), String>>;
}

/// Opens new connections on behalf of the pool.
pub trait ClientFactory: Send + Sync {
    /// Open an unauthenticated connection to `endpoint`.
    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<Client, String>>;
}

/// Whether two handles refer to the same client instance.
pub fn same_client(a: &Client, b: &Client) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
