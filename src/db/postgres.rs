use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::RunError;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Bool, Json, Nullable, Text};
use diesel::QueryableByName;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, PoolError};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use url::Url;

use super::client::{ClientError, ClientFactory, ConnectionSettings, ResultSet, SqlClient};
use super::query::{Query, SqlValue};

pub type PgPool = Pool<AsyncPgConnection>;

const POOL_MAX_SIZE: u32 = 16;
const POOL_MIN_IDLE: u32 = 1;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Json)]
    payload: serde_json::Value,
}

/// Builds bb8 pools of diesel-async Postgres connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgClientFactory;

#[async_trait]
impl ClientFactory for PgClientFactory {
    #[tracing::instrument(name = "database_pool_setup", skip_all)]
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn SqlClient>, ClientError> {
        let database_url = connection_url(settings)?;

        tracing::debug!("Initializing database connection pool");

        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);

        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .min_idle(Some(POOL_MIN_IDLE))
            .connection_timeout(CONNECTION_TIMEOUT)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .max_lifetime(Some(MAX_LIFETIME))
            .build(manager)
            .await
            .map_err(|err| ClientError::new(format!("connection failed: {err}")))?;

        tracing::info!(
            max_size = POOL_MAX_SIZE,
            min_idle = POOL_MIN_IDLE,
            connection_timeout_secs = CONNECTION_TIMEOUT.as_secs(),
            "Database connection pool established"
        );

        Ok(Arc::new(PgClient { pool }))
    }
}

pub struct PgClient {
    pool: PgPool,
}

#[async_trait]
impl SqlClient for PgClient {
    async fn execute(&self, query: &Query) -> Result<ResultSet, ClientError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        if query.returns_rows() {
            let rows = bind_query(&row_query(query))
                .load::<JsonRow>(&mut conn)
                .await
                .map_err(client_error)?;
            Ok(ResultSet::from_rows(
                rows.into_iter().map(|row| row.payload).collect(),
            ))
        } else {
            let affected = bind_query(query)
                .execute(&mut conn)
                .await
                .map_err(client_error)?;
            Ok(ResultSet::affected(affected))
        }
    }

    async fn batch(&self, queries: &[Query]) -> Result<(), ClientError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        conn.transaction::<_, DieselError, _>(|conn| {
            async move {
                for query in queries {
                    bind_query(query).execute(conn).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(client_error)
    }

    /// bb8 has no explicit shutdown. This only reports the pool state; the
    /// connections are closed when the provider and every in-flight request
    /// have dropped their handle to this client.
    async fn close(&self) {
        let state = self.pool.state();
        tracing::info!(
            connections = state.connections,
            idle_connections = state.idle_connections,
            "Releasing database connection pool"
        );
    }
}

/// Places the auth token in the password slot of the connection URL.
fn connection_url(settings: &ConnectionSettings) -> Result<String, ClientError> {
    let mut url = Url::parse(&settings.url)
        .map_err(|err| ClientError::new(format!("invalid DATABASE_URL: {err}")))?;

    url.set_password(Some(&settings.auth_token))
        .map_err(|()| ClientError::new("invalid DATABASE_URL: no host to authenticate against"))?;

    Ok(url.into())
}

/// Postgres binds positionally as `$1..$n`; statements are written with `?`.
fn numbered_placeholders(sql: &str) -> String {
    let mut numbered = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    for c in sql.chars() {
        if c == '?' {
            index += 1;
            let _ = write!(numbered, "${index}");
        } else {
            numbered.push(c);
        }
    }
    numbered
}

/// Wraps a row-producing statement so every row comes back as one JSON
/// object, which keeps the client independent of the selected columns.
fn row_query(query: &Query) -> Query {
    Query::new(
        format!(
            "WITH statement_rows AS ({}) SELECT row_to_json(statement_rows) AS payload FROM statement_rows",
            query.sql
        ),
        query.args.clone(),
    )
}

fn bind_query(query: &Query) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    let mut statement = diesel::sql_query(numbered_placeholders(&query.sql)).into_boxed::<Pg>();
    for arg in &query.args {
        statement = match arg {
            SqlValue::Null => statement.bind::<Nullable<Text>, _>(None::<String>),
            SqlValue::Text(value) => statement.bind::<Text, _>(value.clone()),
            SqlValue::Integer(value) => statement.bind::<BigInt, _>(*value),
            SqlValue::Bool(value) => statement.bind::<Bool, _>(*value),
        };
    }
    statement
}

fn pool_error(error: RunError<PoolError>) -> ClientError {
    ClientError::new(format!("connection pool: {error}"))
}

/// Lost connections and serialization conflicts are phrased so that
/// [`ClientError::is_transient`] picks them up.
fn client_error(error: DieselError) -> ClientError {
    match &error {
        DieselError::DatabaseError(
            DatabaseErrorKind::ClosedConnection | DatabaseErrorKind::UnableToSendCommand,
            info,
        ) => ClientError::new(format!("connection lost: {}", info.message())),
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
            ClientError::new(format!("database busy: {}", info.message()))
        }
        _ => ClientError::new(error.to_string()),
    }
}
