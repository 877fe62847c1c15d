//! Connection configuration.
//!
//! Parsing of connection URLs/DSNs and credential resolution are external
//! collaborators (§1); this module only carries the resolved record the core
//! consumes at construction time.

use std::num::NonZeroUsize;

/// Credential material for a connection, already resolved by an external
/// collaborator. The core never inspects these beyond passing them along to
/// whatever `native` client the connection factory constructs.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Use Application Default Credentials.
    ApplicationDefault,
    /// A short-lived OAuth access token.
    OAuthToken(String),
    /// A service-account credentials JSON document.
    ServiceAccountJson(String),
    /// Use no credentials; only valid against an emulator (`use_plain_text`).
    PlainText,
}

/// Query-time options carried immutably for the lifetime of a connection.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub optimizer_version: Option<String>,
}

/// Immutable, per-connection configuration (§3).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub project: String,
    pub instance: String,
    pub database: String,
    pub worker_threads: NonZeroUsize,
    pub query_options: QueryOptions,
    pub credentials: Credentials,
    pub use_plain_text: bool,
}

impl ConnectionConfig {
    pub fn new(project: impl Into<String>, instance: impl Into<String>, database: impl Into<String>) -> Self {
        ConnectionConfig {
            project: project.into(),
            instance: instance.into(),
            database: database.into(),
            worker_threads: default_worker_threads(),
            query_options: QueryOptions::default(),
            credentials: Credentials::ApplicationDefault,
            use_plain_text: false,
        }
    }

    pub fn with_worker_threads(mut self, n: NonZeroUsize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn with_optimizer_version(mut self, version: impl Into<String>) -> Self {
        self.query_options.optimizer_version = Some(version.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// `projects/{project}/instances/{instance}/databases/{database}`, the resource
    /// name format the native client library addresses databases by.
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }

    pub fn instance_path(&self) -> String {
        format!("projects/{}/instances/{}", self.project, self.instance)
    }
}

fn default_worker_threads() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::new(4).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_is_fully_qualified() {
        let cfg = ConnectionConfig::new("proj", "inst", "db");
        assert_eq!(cfg.database_path(), "projects/proj/instances/inst/databases/db");
        assert_eq!(cfg.instance_path(), "projects/proj/instances/inst");
    }

    #[test]
    fn builder_methods_set_fields() {
        let cfg = ConnectionConfig::new("p", "i", "d")
            .with_optimizer_version("5")
            .with_credentials(Credentials::PlainText);
        assert_eq!(cfg.query_options.optimizer_version.as_deref(), Some("5"));
        assert!(matches!(cfg.credentials, Credentials::PlainText));
    }
}
