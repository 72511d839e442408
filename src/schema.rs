use crate::db::query::Query;
use crate::db::{DatabaseProvider, DbError, ProviderStatus};

pub const MESSAGES_TABLE: &str = "messages";

pub const MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "subject",
    "message",
    "is_read",
    "is_archived",
    "ip_address",
    "user_agent",
    "created_at",
    "updated_at",
];

const CREATE_MESSAGES: &str = "\
CREATE TABLE IF NOT EXISTS messages (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    email VARCHAR(254) NOT NULL,
    subject VARCHAR(200),
    message VARCHAR(5000) NOT NULL,
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    is_archived BOOLEAN NOT NULL DEFAULT FALSE,
    ip_address VARCHAR(45),
    user_agent VARCHAR(500),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const CREATE_TOUCH_FUNCTION: &str = "\
CREATE OR REPLACE FUNCTION messages_touch_updated_at() RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql";

const DROP_TOUCH_TRIGGER: &str = "DROP TRIGGER IF EXISTS messages_updated_at ON messages";

const CREATE_TOUCH_TRIGGER: &str = "\
CREATE TRIGGER messages_updated_at
    BEFORE UPDATE ON messages
    FOR EACH ROW EXECUTE FUNCTION messages_touch_updated_at()";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_messages_email ON messages (email)",
    "CREATE INDEX IF NOT EXISTS idx_messages_is_read ON messages (is_read)",
    "CREATE INDEX IF NOT EXISTS idx_messages_is_archived ON messages (is_archived)",
    "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at DESC)",
];

/// Idempotent DDL for the `messages` table, its update trigger and indexes.
pub fn bootstrap_statements() -> Vec<Query> {
    [
        CREATE_MESSAGES,
        CREATE_TOUCH_FUNCTION,
        DROP_TOUCH_TRIGGER,
        CREATE_TOUCH_TRIGGER,
    ]
    .into_iter()
    .chain(CREATE_INDEXES.iter().copied())
    .map(Query::raw)
    .collect()
}

#[tracing::instrument(name = "schema_bootstrap", skip(provider))]
pub async fn ensure_schema(provider: &DatabaseProvider) -> Result<(), DbError> {
    let statements = bootstrap_statements();
    provider.execute_transaction(&statements).await?;
    tracing::info!(statements = statements.len(), "Database schema ensured");
    Ok(())
}

/// Connects the provider and, once it is ready, applies the schema. Used at
/// startup and whenever an admin resets the client, so a database that was
/// unreachable at boot still gets its table.
pub async fn open_and_bootstrap(provider: &DatabaseProvider) -> Result<ProviderStatus, DbError> {
    let status = provider.open().await;
    if status == ProviderStatus::Ready {
        ensure_schema(provider).await?;
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::testing::{FakeClient, FakeFactory};

    #[test]
    fn test_statements_are_parameterless_and_idempotent() {
        let statements = bootstrap_statements();
        assert_eq!(statements.len(), 8);
        for statement in &statements {
            assert!(statement.args.is_empty());
            assert!(!statement.sql.contains('?'));
        }
        assert!(statements[0].sql.starts_with("CREATE TABLE IF NOT EXISTS messages"));
        assert!(statements
            .iter()
            .any(|statement| statement.sql.contains("(created_at DESC)")));
    }

    #[test]
    fn test_table_declares_every_listed_column() {
        for column in MESSAGE_COLUMNS {
            assert!(CREATE_MESSAGES.contains(&format!("\n    {column} ")), "{column}");
        }
    }

    #[tokio::test]
    async fn test_ensure_schema_runs_one_transaction() {
        let client = Arc::new(FakeClient::default());
        let provider = DatabaseProvider::new(
            DatabaseConfig::new("postgres://db.internal/site", "token"),
            FakeFactory::new(client.clone()),
        );

        ensure_schema(&provider).await.unwrap();

        let batches = client.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], bootstrap_statements());
    }

    #[tokio::test]
    async fn test_bootstrap_waits_for_a_ready_client() {
        let factory = FakeFactory::failing("connection refused");
        let provider = DatabaseProvider::new(
            DatabaseConfig::new("postgres://db.internal/site", "token"),
            factory.clone(),
        );

        assert_eq!(
            open_and_bootstrap(&provider).await,
            Ok(ProviderStatus::Failed)
        );
        assert!(factory.client.batches.lock().unwrap().is_empty());

        *factory.fail_with.lock().unwrap() = None;
        provider.reset().await;
        assert_eq!(open_and_bootstrap(&provider).await, Ok(ProviderStatus::Ready));
        assert_eq!(factory.client.batches.lock().unwrap().len(), 1);
    }
}
