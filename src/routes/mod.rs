use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, middleware};

use crate::config::DatabaseConfigSource;
use crate::db::DatabaseProvider;
use crate::security::admin::AdminAuth;
use crate::security::headers::set_security_headers;
use crate::security::payload::MAX_BODY_SIZE_BYTES;
use crate::security::urls::TrustedDomains;

pub mod contact;
pub mod links;
pub mod messages;

pub fn create_router(admin: AdminAuth) -> Router {
    tracing::debug!(admin_enabled = admin.is_enabled(), "Creating application router");
    Router::new()
        .merge(contact::router())
        .merge(links::router())
        .merge(messages::router(admin))
}

/// Full application with shared state and response hardening applied.
pub fn build_app(
    provider: Arc<DatabaseProvider>,
    config_source: DatabaseConfigSource,
    trusted_domains: TrustedDomains,
    admin: AdminAuth,
) -> Router {
    create_router(admin)
        .layer(middleware::from_fn(set_security_headers))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_BYTES))
        .layer(Extension(provider))
        .layer(Extension(config_source))
        .layer(Extension(trusted_domains))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        body::{Body, to_bytes},
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::client::ResultSet;
    use crate::db::query::SqlValue;
    use crate::db::testing::{FakeClient, FakeFactory};

    const ADMIN_TOKEN: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

    const PEER: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);

    fn configured() -> DatabaseConfig {
        DatabaseConfig::new("postgres://db.internal/site", "token")
    }

    fn app_for(provider: Arc<DatabaseProvider>, peer: SocketAddr) -> Router {
        let source = DatabaseConfigSource::Fixed(configured());
        build_app(
            provider,
            source,
            TrustedDomains::default(),
            AdminAuth::from_config(Some(ADMIN_TOKEN)),
        )
        .layer(MockConnectInfo(peer))
    }

    fn app_with(client: Arc<FakeClient>, config: DatabaseConfig) -> Router {
        let provider = Arc::new(DatabaseProvider::new(config, FakeFactory::new(client)));
        app_for(provider, SocketAddr::from(PEER))
    }

    fn app(client: Arc<FakeClient>) -> Router {
        app_with(client, configured())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .header("user-agent", "integration-test")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn admin_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn valid_contact() -> Value {
        json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "subject": "Hello",
            "message": "I would like to get in touch.",
        })
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_write() {
        let client = Arc::new(FakeClient::default());
        let response = app(client.clone())
            .oneshot(post_json(
                "/api/contact",
                json!({"name": "Ada", "email": "ada@example.com", "message": ""}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "message must not be empty");
        assert!(client.executed().is_empty());
    }

    #[tokio::test]
    async fn test_valid_submission_is_stored() {
        let client = Arc::new(FakeClient::default());
        let response = app(client.clone())
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let body = json_body(response).await;
        assert_eq!(body, json!({"success": true, "id": 1}));

        let executed = client.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].sql.starts_with("INSERT INTO messages"));
        assert_eq!(executed[0].args[4], SqlValue::from("203.0.113.9"));
        assert_eq!(executed[0].args[5], SqlValue::from("integration-test"));
    }

    #[tokio::test]
    async fn test_form_encoded_submission_is_accepted() {
        let client = Arc::new(FakeClient::default());
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "name=Ada&email=ada%40example.com&message=Hello+there",
            ))
            .unwrap();

        let response = app(client.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let executed = client.executed();
        assert_eq!(executed[0].args[0], SqlValue::from("Ada"));
        assert_eq!(executed[0].args[4], SqlValue::from("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_unsupported_media_type() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = app(Arc::new(FakeClient::default()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_unconfigured_database_is_service_unavailable() {
        let client = Arc::new(FakeClient::default());
        let app = app_with(client.clone(), DatabaseConfig::default());

        let response = app
            .clone()
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "service temporarily unavailable");
        assert!(client.executed().is_empty());

        let response = app.oneshot(get("/api/contact")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"success": true, "configured": false})
        );
    }

    #[tokio::test]
    async fn test_database_failure_hides_details() {
        let client = FakeClient::scripted(vec![Err(crate::db::client::ClientError::new(
            "relation \"messages\" does not exist",
        ))]);
        let response = app(client)
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "an unexpected error occurred");
    }

    #[tokio::test]
    async fn test_submissions_are_rate_limited() {
        let app = app(Arc::new(FakeClient::default()));
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(post_json("/api/contact", valid_contact()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));

        let response = app.oneshot(get("/api/contact")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_url_check() {
        let app = app(Arc::new(FakeClient::default()));

        let response = app
            .clone()
            .oneshot(get("/api/url-check?url=https%3A%2F%2Fexample.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"success": true, "url": "https://example.com/"})
        );

        let response = app
            .clone()
            .oneshot(get("/api/url-check?url=javascript%3Aalert(1)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(get(
                "/api/url-check?url=https%3A%2F%2Fevil.com%2Fa.png&trusted=true",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("img.clerk.com"));

        let response = app
            .oneshot(get(
                "/api/url-check?url=https%3A%2F%2Fimg.clerk.com%2Fa.png&trusted=true",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let app = app(Arc::new(FakeClient::default()));

        let response = app.clone().oneshot(get("/api/messages")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/database/reset")
            .header(AUTHORIZATION, "Bearer not-the-token")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_messages_newest_first() {
        let row = json!({
            "id": 7,
            "name": "Ada",
            "email": "ada@example.com",
            "subject": null,
            "message": "hi",
            "is_read": false,
            "is_archived": false,
            "ip_address": "203.0.113.9",
            "user_agent": null,
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00+00:00",
        });
        let client = FakeClient::scripted(vec![Ok(ResultSet::from_rows(vec![row]))]);
        let app = app(client.clone());

        let response = app
            .clone()
            .oneshot(admin_request("GET", "/api/messages?limit=10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["messages"][0]["id"], 7);

        let executed = client.executed();
        assert!(executed[0].sql.contains("ORDER BY created_at DESC LIMIT ?"));
        assert_eq!(executed[0].args, vec![SqlValue::Integer(10)]);

        let response = app
            .oneshot(admin_request("GET", "/api/messages?limit=0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_database_reset_reconnects() {
        let client = Arc::new(FakeClient::default());
        let response = app(client)
            .oneshot(admin_request("POST", "/api/admin/database/reset"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"success": true, "status": "ready"})
        );
    }

    #[tokio::test]
    async fn test_reset_recovers_and_bootstraps_schema() {
        let factory = FakeFactory::failing("connection refused");
        let provider = Arc::new(DatabaseProvider::new(configured(), factory.clone()));
        assert_eq!(
            crate::schema::open_and_bootstrap(&provider).await,
            Ok(crate::db::ProviderStatus::Failed)
        );

        *factory.fail_with.lock().unwrap() = None;
        let response = app_for(provider, SocketAddr::from(PEER))
            .oneshot(admin_request("POST", "/api/admin/database/reset"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"success": true, "status": "ready"})
        );
        assert_eq!(factory.client.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_picks_up_fixed_configuration() {
        let client = Arc::new(FakeClient::default());
        let factory = FakeFactory::new(client.clone());
        let provider = Arc::new(DatabaseProvider::new(DatabaseConfig::default(), factory.clone()));
        let app = app_for(provider, SocketAddr::from(PEER));

        let response = app
            .clone()
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/database/reset"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let settings = factory.last_settings.lock().unwrap().clone().unwrap();
        assert_eq!(settings.url, "postgres://db.internal/site");
        assert_eq!(client.batches.lock().unwrap().len(), 1);

        let response = app
            .oneshot(post_json("/api/contact", valid_contact()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_submission_is_payload_too_large() {
        let client = Arc::new(FakeClient::default());
        let message = "a".repeat(70 * 1024);
        let response = app(client.clone())
            .oneshot(post_json(
                "/api/contact",
                json!({"name": "Ada", "email": "ada@example.com", "message": message}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(client.executed().is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submission_logs_only_masked_peer_address() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let provider = Arc::new(DatabaseProvider::new(
            configured(),
            FakeFactory::new(Arc::new(FakeClient::default())),
        ));
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(valid_contact().to_string()))
            .unwrap();
        let response = app_for(provider, SocketAddr::from(([198, 51, 100, 77], 40000)))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("198.51.100.***"), "{output}");
        assert!(!output.contains("198.51.100.77"), "{output}");
        assert!(!output.contains("ada@example.com"), "{output}");
    }
}
