pub mod client;
pub mod postgres;
pub mod query;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::DatabaseConfig;
use client::{ClientFactory, ResultSet, SqlClient};
use query::Query;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error("database is not configured; missing {}", missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },
    #[error("failed to initialize database client: {0}")]
    Connect(String),
    #[error("query failed after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },
    #[error("query failed: {0}")]
    Fatal(String),
    #[error("transaction failed: {0}")]
    Transaction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Linear backoff: the wait after attempt `n` is `n * base_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

enum ClientState {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn SqlClient>),
    Failed(DbError),
}

struct ProviderState {
    config: DatabaseConfig,
    client: ClientState,
}

/// Owns the lazily constructed SQL client shared by every request.
///
/// Construction is serialized by `init_lock`, so concurrent first requests
/// build a single client. A construction failure is cached and returned to
/// every caller until [`DatabaseProvider::reset`] or
/// [`DatabaseProvider::reconfigure`] is called.
pub struct DatabaseProvider {
    factory: Arc<dyn ClientFactory>,
    retry: RetryPolicy,
    state: Mutex<ProviderState>,
    init_lock: tokio::sync::Mutex<()>,
}

impl DatabaseProvider {
    pub fn new(config: DatabaseConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_retry_policy(config, factory, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        config: DatabaseConfig,
        factory: Arc<dyn ClientFactory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            factory,
            retry,
            state: Mutex::new(ProviderState {
                config,
                client: ClientState::Uninitialized,
            }),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_configured(&self) -> bool {
        self.lock_state().config.is_configured()
    }

    /// Fails with [`DbError::NotConfigured`] without touching the client.
    pub fn ensure_configured(&self) -> Result<(), DbError> {
        self.lock_state().config.settings().map(|_| ())
    }

    pub fn status(&self) -> ProviderStatus {
        match self.lock_state().client {
            ClientState::Uninitialized => ProviderStatus::Uninitialized,
            ClientState::Initializing => ProviderStatus::Initializing,
            ClientState::Ready(_) => ProviderStatus::Ready,
            ClientState::Failed(_) => ProviderStatus::Failed,
        }
    }

    fn cached_client(&self) -> Option<Result<Arc<dyn SqlClient>, DbError>> {
        match &self.lock_state().client {
            ClientState::Ready(client) => Some(Ok(Arc::clone(client))),
            ClientState::Failed(error) => Some(Err(error.clone())),
            ClientState::Uninitialized | ClientState::Initializing => None,
        }
    }

    #[tracing::instrument(name = "database_client", skip(self))]
    pub async fn client(&self) -> Result<Arc<dyn SqlClient>, DbError> {
        if let Some(cached) = self.cached_client() {
            return cached;
        }

        let _init = self.init_lock.lock().await;
        // Another request may have finished construction while we waited.
        if let Some(cached) = self.cached_client() {
            return cached;
        }

        let settings = {
            let mut state = self.lock_state();
            let settings = state.config.settings()?;
            state.client = ClientState::Initializing;
            settings
        };

        tracing::debug!("Initializing database client");

        match self.factory.connect(&settings).await {
            Ok(client) => {
                self.lock_state().client = ClientState::Ready(Arc::clone(&client));
                tracing::info!("Database client ready");
                Ok(client)
            }
            Err(err) => {
                let error = DbError::Connect(err.to_string());
                self.lock_state().client = ClientState::Failed(error.clone());
                tracing::error!(error = %error, "Database client initialization failed");
                Err(error)
            }
        }
    }

    /// Eagerly builds the client. Failures are logged and left cached.
    pub async fn open(&self) -> ProviderStatus {
        if !self.is_configured() {
            tracing::warn!("Database is not configured; contact submissions are disabled");
            return self.status();
        }

        if let Err(err) = self.client().await {
            tracing::error!(error = %err, "Database unavailable at startup");
        }
        self.status()
    }

    #[tracing::instrument(name = "database_query", skip(self, query), fields(returns_rows = query.returns_rows()))]
    pub async fn execute_query(&self, query: &Query) -> Result<ResultSet, DbError> {
        let client = self.client().await?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match client.execute(query).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient database error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    tracing::error!(attempts = attempt, error = %err, "Database retries exhausted");
                    return Err(DbError::Transient {
                        attempts: attempt,
                        message: err.message().to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "Database query failed");
                    return Err(DbError::Fatal(err.message().to_string()));
                }
            }
        }
    }

    /// Submits every statement as one atomic batch.
    #[tracing::instrument(name = "database_transaction", skip(self, queries), fields(statements = queries.len()))]
    pub async fn execute_transaction(&self, queries: &[Query]) -> Result<(), DbError> {
        let client = self.client().await?;
        client.batch(queries).await.map_err(|err| {
            tracing::error!(error = %err, "Database transaction failed");
            DbError::Transaction(err.message().to_string())
        })
    }

    /// Closes the cached client and forgets any cached failure.
    pub async fn reset(&self) {
        let _init = self.init_lock.lock().await;
        self.reset_locked().await;
    }

    /// Swaps the connection parameters and resets the client.
    pub async fn reconfigure(&self, config: DatabaseConfig) {
        let _init = self.init_lock.lock().await;
        self.lock_state().config = config;
        self.reset_locked().await;
    }

    async fn reset_locked(&self) {
        let previous = std::mem::replace(&mut self.lock_state().client, ClientState::Uninitialized);
        if let ClientState::Ready(client) = previous {
            client.close().await;
        }
        tracing::info!("Database client reset");
    }
}
