//! In-memory client and factory shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{BoxFuture, Client, ClientFactory, DatabaseClient};
use crate::credentials::{AuthLevel, Signin};

#[derive(Debug, Default)]
pub(crate) struct MockClient {
    /// Queries fail with an error.
    pub unhealthy: AtomicBool,
    /// Queries never complete.
    pub hang: AtomicBool,
    pub reject_signin: AtomicBool,
    pub fail_use: AtomicBool,
    pub queries: AtomicU32,
    pub closes: AtomicU32,
    pub signins: Mutex<Vec<AuthLevel>>,
}

impl MockClient {
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

impl DatabaseClient for MockClient {
    fn query<'a>(&'a self, _statement: &'a str) -> BoxFuture<'a, Result<serde_json::Value, String>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.unhealthy.load(Ordering::SeqCst) {
                return Err("connection reset by peer".to_string());
            }
            Ok(serde_json::json!([1]))
        })
    }

    fn use_scope<'a>(
        &'a self,
        _namespace: &'a str,
        _database: &'a str,
    ) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            if self.fail_use.load(Ordering::SeqCst) {
                return Err("namespace not found".to_string());
            }
            Ok(())
        })
    }

    fn signin<'a>(&'a self, signin: Signin<'a>) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            self.signins.lock().unwrap().push(signin.level());
            if self.reject_signin.load(Ordering::SeqCst) {
                return Err("There was a problem with authentication".to_string());
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
pub(crate) struct MockFactory {
    pub connect_delay: Duration,
    /// Connects fail while this is non-zero, decrementing each time.
    pub failures_remaining: AtomicU32,
    pub reject_signin: AtomicBool,
    pub fail_use: AtomicBool,
    pub connects: AtomicU32,
    pub clients: Mutex<Vec<Arc<MockClient>>>,
}

impl MockFactory {
    pub fn with_delay(connect_delay: Duration) -> Self {
        Self {
            connect_delay,
            ..Self::default()
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn client(&self, index: usize) -> Arc<MockClient> {
        Arc::clone(&self.clients.lock().unwrap()[index])
    }

    pub fn created(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl ClientFactory for MockFactory {
    fn connect<'a>(&'a self, _endpoint: &'a str) -> BoxFuture<'a, Result<Client, String>> {
        Box::pin(async move {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err("connection refused".to_string());
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let client = Arc::new(MockClient::default());
            client
                .reject_signin
                .store(self.reject_signin.load(Ordering::SeqCst), Ordering::SeqCst);
            client
                .fail_use
                .store(self.fail_use.load(Ordering::SeqCst), Ordering::SeqCst);
            self.clients.lock().unwrap().push(Arc::clone(&client));
            Ok(client as Client)
        })
    }
}
