use axum::{
    Extension, Json, Router,
    extract::Query,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::logging::SecurityEvent;
use crate::security::urls::{TrustedDomains, validate_trusted_url, validate_url};

pub fn router() -> Router {
    Router::new().route("/api/url-check", get(check_url))
}

#[derive(Debug, Deserialize)]
pub struct UrlCheckParams {
    url: Option<String>,
    #[serde(default)]
    trusted: bool,
}

#[derive(Debug, Serialize)]
pub struct UrlCheckResponse {
    success: bool,
    url: String,
}

/// Canonicalizes a link or image source before a page renders it.
pub async fn check_url(
    Extension(trusted_domains): Extension<TrustedDomains>,
    Query(params): Query<UrlCheckParams>,
) -> Result<Json<UrlCheckResponse>, AppError> {
    let candidate = params.url.as_deref();
    let checked = if params.trusted {
        validate_trusted_url(candidate, &trusted_domains)
    } else {
        validate_url(candidate)
    };

    let url = checked.map_err(|err| {
        crate::log_security_event!(
            SecurityEvent::UnsafeUrlRejected,
            trusted = params.trusted,
            error = %err,
            "URL check rejected candidate"
        );
        err
    })?;

    Ok(Json(UrlCheckResponse { success: true, url }))
}
