//! Credential sets and the sign-in payloads derived from them.
//!
//! A [`Credentials`] value identifies one logical target (endpoint, namespace,
//! database, user). It is used for two things only: deriving a
//! [`PoolKey`](crate::key::PoolKey) and authenticating newly created clients.

use std::fmt;

/// Namespace substituted when a credential set leaves it unset.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Database substituted when a credential set leaves it unset.
pub const DEFAULT_DATABASE: &str = "test";

/// Scope at which a user authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AuthLevel {
    /// Root user: username and password only.
    #[default]
    Root,
    /// Namespace user: also sends the namespace.
    Namespace,
    /// Database user: also sends namespace and database.
    Database,
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthLevel::Root => write!(f, "root"),
            AuthLevel::Namespace => write!(f, "namespace"),
            AuthLevel::Database => write!(f, "database"),
        }
    }
}

/// Connection target plus the secrets needed to sign in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Endpoint URL, e.g. `ws://db.local:8000/rpc`.
    pub endpoint: String,
    pub namespace: Option<String>,
    pub database: Option<String>,
    pub username: String,
    pub password: String,
    pub auth_level: AuthLevel,
}

impl Credentials {
    /// Root-level credentials with no namespace or database selected.
    pub fn root(endpoint: &str, username: &str, password: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            namespace: None,
            database: None,
            username: username.to_string(),
            password: password.to_string(),
            auth_level: AuthLevel::Root,
        }
    }

    /// Builder method: select a namespace.
    pub fn with_namespace(self, namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..self
        }
    }

    /// Builder method: select a database.
    pub fn with_database(self, database: &str) -> Self {
        Self {
            database: Some(database.to_string()),
            ..self
        }
    }

    /// Builder method: change the authentication level.
    pub fn with_auth_level(self, auth_level: AuthLevel) -> Self {
        Self { auth_level, ..self }
    }

    /// Namespace with the default substituted for an unset or empty value.
    pub fn namespace_or_default(&self) -> &str {
        non_empty(self.namespace.as_deref()).unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Database with the default substituted for an unset or empty value.
    pub fn database_or_default(&self) -> &str {
        non_empty(self.database.as_deref()).unwrap_or(DEFAULT_DATABASE)
    }

    /// The namespace/database pair to select after connecting, if any.
    ///
    /// Selection only happens when a namespace was supplied; the database
    /// falls back to [`DEFAULT_DATABASE`].
    pub fn scope(&self) -> Option<(&str, &str)> {
        non_empty(self.namespace.as_deref()).map(|ns| (ns, self.database_or_default()))
    }

    /// Build the sign-in payload for this credential set's auth level.
    ///
    /// Returns `None` when a scoped level is requested without a namespace.
    pub fn signin(&self) -> Option<Signin<'_>> {
        let username = self.username.as_str();
        let password = self.password.as_str();
        match self.auth_level {
            AuthLevel::Root => Some(Signin::Root { username, password }),
            AuthLevel::Namespace => Some(Signin::Namespace {
                username,
                password,
                namespace: non_empty(self.namespace.as_deref())?,
            }),
            AuthLevel::Database => Some(Signin::Database {
                username,
                password,
                namespace: non_empty(self.namespace.as_deref())?,
                database: self.database_or_default(),
            }),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_level", &self.auth_level)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Sign-in payload sent to a freshly connected client.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Signin<'a> {
    Root {
        username: &'a str,
        password: &'a str,
    },
    Namespace {
        username: &'a str,
        password: &'a str,
        namespace: &'a str,
    },
    Database {
        username: &'a str,
        password: &'a str,
        namespace: &'a str,
        database: &'a str,
    },
}

impl Signin<'_> {
    pub fn level(&self) -> AuthLevel {
        match self {
            Signin::Root { .. } => AuthLevel::Root,
            Signin::Namespace { .. } => AuthLevel::Namespace,
            Signin::Database { .. } => AuthLevel::Database,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Signin::Root { username, .. }
            | Signin::Namespace { username, .. }
            | Signin::Database { username, .. } => username,
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Signin::Root { password, .. }
            | Signin::Namespace { password, .. }
            | Signin::Database { password, .. } => password,
        }
    }
}

impl fmt::Debug for Signin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Signin");
        s.field("level", &self.level())
            .field("username", &self.username())
            .field("password", &"<redacted>");
        match self {
            Signin::Root { .. } => {}
            Signin::Namespace { namespace, .. } => {
                s.field("namespace", namespace);
            }
            Signin::Database {
                namespace,
                database,
                ..
            } => {
                s.field("namespace", namespace).field("database", database);
            }
        }
        s.finish()
    }
}
