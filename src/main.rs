use std::net::SocketAddr;
use std::sync::Arc;

use axum::serve;
use tokio::net::TcpListener;

use contact_gate::config::{AppConfig, DatabaseConfigSource};
use contact_gate::db::postgres::PgClientFactory;
use contact_gate::db::DatabaseProvider;
use contact_gate::routes::build_app;
use contact_gate::security::admin::AdminAuth;
use contact_gate::{logging, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = AppConfig::from_env()?;

    let provider = Arc::new(DatabaseProvider::new(
        config.database.clone(),
        Arc::new(PgClientFactory),
    ));
    if let Err(err) = schema::open_and_bootstrap(&provider).await {
        tracing::error!(error = %err, "Failed to bootstrap messages schema");
    }

    let admin = AdminAuth::from_config(config.admin_token.as_deref());
    let app = build_app(
        provider,
        DatabaseConfigSource::Environment,
        config.trusted_domains.clone(),
        admin,
    )
    .into_make_service_with_connect_info::<SocketAddr>();

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening");

    serve(listener, app).await?;

    Ok(())
}
