use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfigSource;
use crate::db::query::select_recent;
use crate::db::{DatabaseProvider, DbError, ProviderStatus};
use crate::errors::AppError;
use crate::logging::SecurityEvent;
use crate::models::contact::MessageRecord;
use crate::models::fields::validate_limit;
use crate::models::RawField;
use crate::schema::{MESSAGE_COLUMNS, MESSAGES_TABLE, open_and_bootstrap};
use crate::security::admin::{AdminAuth, require_admin};

const DEFAULT_LIST_LIMIT: u32 = 50;

/// Administrative routes. Every route requires the admin bearer token.
pub fn router(admin: AdminAuth) -> Router {
    Router::new()
        .route("/api/messages", get(list_messages))
        .route("/api/admin/database/reset", post(reset_database))
        .route_layer(middleware::from_fn_with_state(admin, require_admin))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageList {
    success: bool,
    messages: Vec<MessageRecord>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    success: bool,
    status: ProviderStatus,
}

#[tracing::instrument(name = "list_messages", skip(provider))]
pub async fn list_messages(
    Extension(provider): Extension<Arc<DatabaseProvider>>,
    Query(params): Query<ListParams>,
) -> Result<Json<MessageList>, AppError> {
    let limit = match params.limit {
        Some(raw) => validate_limit(&RawField::from(Some(raw)))?,
        None => DEFAULT_LIST_LIMIT,
    };

    let query = select_recent(MESSAGES_TABLE, MESSAGE_COLUMNS, "created_at", Some(limit));
    let result = provider.execute_query(&query).await?;

    let messages = result
        .rows
        .into_iter()
        .map(serde_json::from_value::<MessageRecord>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| DbError::Fatal(format!("unexpected message row: {err}")))?;

    tracing::debug!(count = messages.len(), limit, "Listed contact messages");

    Ok(Json(MessageList {
        success: true,
        messages,
    }))
}

/// Re-reads the database settings, drops the cached client (including a
/// cached construction failure), reconnects and applies the schema.
pub async fn reset_database(
    Extension(provider): Extension<Arc<DatabaseProvider>>,
    Extension(source): Extension<DatabaseConfigSource>,
) -> Result<Json<ResetResponse>, AppError> {
    provider.reconfigure(source.load()).await;
    let status = open_and_bootstrap(&provider).await?;

    crate::log_security_event!(
        SecurityEvent::DatabaseReset,
        status = ?status,
        configured = provider.is_configured(),
        "Database client reset by admin"
    );

    Ok(Json(ResetResponse {
        success: status == ProviderStatus::Ready,
        status,
    }))
}
