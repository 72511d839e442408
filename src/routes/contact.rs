use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    Extension, Json, Router,
    extract::ConnectInfo,
    http::{HeaderMap, header::USER_AGENT},
    middleware,
    routing::post,
};
use serde::Serialize;

use crate::db::DatabaseProvider;
use crate::errors::AppError;
use crate::logging::{SanitizedEmail, SanitizedIpAddr, SanitizedName, SecurityEvent};
use crate::models::ValidationError;
use crate::models::contact::ContactSubmission;
use crate::security::payload::FormOrJson;
use crate::security::rate_limit::{RateLimiterState, enforce_rate_limit, select_client_ip};

const SUBMISSIONS_PER_WINDOW: u32 = 5;
const SUBMISSION_WINDOW: Duration = Duration::from_secs(10 * 60);

pub fn router() -> Router {
    Router::new().route(
        "/api/contact",
        post(submit_contact)
            .layer(middleware::from_fn_with_state(
                RateLimiterState::new(
                    NonZeroU32::new(SUBMISSIONS_PER_WINDOW).expect("burst must be non-zero"),
                    SUBMISSION_WINDOW,
                ),
                enforce_rate_limit,
            ))
            .get(contact_status),
    )
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    success: bool,
    id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    success: bool,
    configured: bool,
}

#[tracing::instrument(
    name = "submit_contact",
    skip_all,
    fields(email, message_id)
)]
pub async fn submit_contact(
    Extension(provider): Extension<Arc<DatabaseProvider>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    FormOrJson(submission): FormOrJson<ContactSubmission>,
) -> Result<Json<SubmissionResponse>, AppError> {
    provider.ensure_configured()?;

    let client_ip = select_client_ip(&headers, addr.ip());
    let contact = submission
        .validate()
        .inspect_err(|err| log_rejection(err, client_ip))?;

    let name = SanitizedName::new(contact.name());
    let email = SanitizedEmail::new(contact.email());
    tracing::Span::current().record("email", tracing::field::display(&email));
    let user_agent = headers.get(USER_AGENT).and_then(|value| value.to_str().ok());

    let query = contact.into_query(Some(client_ip.to_string()), user_agent);
    let result = provider.execute_query(&query).await?;
    let id = result.first_i64("id");
    if let Some(id) = id {
        tracing::Span::current().record("message_id", id);
    }

    crate::log_security_event!(
        SecurityEvent::SubmissionAccepted,
        name = %name,
        email = %email,
        client_ip = %SanitizedIpAddr::new(client_ip),
        message_id = ?id,
        "Contact message stored"
    );

    Ok(Json(SubmissionResponse { success: true, id }))
}

pub async fn contact_status(
    Extension(provider): Extension<Arc<DatabaseProvider>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        configured: provider.is_configured(),
    })
}

fn log_rejection(error: &ValidationError, client_ip: IpAddr) {
    let client_ip = SanitizedIpAddr::new(client_ip);
    if matches!(error, ValidationError::DangerousContent { .. }) {
        crate::log_security_event!(
            SecurityEvent::DangerousInput,
            client_ip = %client_ip,
            error = %error,
            "Contact submission carried disallowed content"
        );
    } else {
        crate::log_security_event!(
            SecurityEvent::SubmissionRejected,
            client_ip = %client_ip,
            error = %error,
            "Contact submission failed validation"
        );
    }
}
