use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::query::Query;

const TRANSIENT_MARKERS: &[&str] = &["busy", "connection"];

/// A failure reported by the underlying SQL client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClientError {
    message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Busy or connection failures are expected to clear up on retry.
    pub fn is_transient(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        TRANSIENT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }
}

/// Rows come back as JSON objects keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Value>,
    pub rows_affected: usize,
}

impl ResultSet {
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    pub fn from_rows(rows: Vec<Value>) -> Self {
        Self {
            rows_affected: rows.len(),
            rows,
        }
    }

    pub fn first_i64(&self, column: &str) -> Option<i64> {
        self.rows.first()?.get(column)?.as_i64()
    }
}

/// Connection settings that have passed the configuration gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub auth_token: String,
}

#[async_trait]
pub trait SqlClient: Send + Sync {
    async fn execute(&self, query: &Query) -> Result<ResultSet, ClientError>;

    /// Runs every statement inside one transaction.
    async fn batch(&self, queries: &[Query]) -> Result<(), ClientError>;

    /// Called when the provider drops this client. Implementations release
    /// what they can; shared handles may outlive the call.
    async fn close(&self) {}
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn SqlClient>, ClientError>;
}
