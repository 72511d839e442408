use axum::{
    Form, async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode, header::CONTENT_LENGTH, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Deserializer;

use crate::errors::AppError;

/// Request body cap, enforced by the `DefaultBodyLimit` layer and checked
/// against a declared `Content-Length` up front.
pub const MAX_BODY_SIZE_BYTES: usize = 64 * 1024;

/// Request body accepted either as JSON or as an URL-encoded form.
#[derive(Debug)]
pub struct FormOrJson<T>(pub T);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

#[async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let kind = body_kind(req.headers())?;
        ensure_declared_length(req.headers())?;

        match kind {
            BodyKind::Json => {
                let body = Bytes::from_request(req, state)
                    .await
                    .map_err(|rejection| body_rejection(rejection.status(), rejection.body_text()))?;
                parse_json(&body).map(FormOrJson)
            }
            BodyKind::Form => {
                let Form(value) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|rejection| body_rejection(rejection.status(), rejection.body_text()))?;
                Ok(FormOrJson(value))
            }
        }
    }
}

/// A body over the limit is a 413 however it was detected.
fn body_rejection(status: StatusCode, detail: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::InvalidBody(detail)
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    let mut deserializer = Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let error = err.into_inner();
        if path.is_empty() || path == "." {
            AppError::InvalidBody(format!("failed to parse JSON payload: {error}"))
        } else {
            AppError::InvalidBody(format!("failed to parse JSON payload at {path}: {error}"))
        }
    })?;

    deserializer
        .end()
        .map_err(|err| AppError::InvalidBody(format!("unexpected trailing data: {err}")))?;

    Ok(value)
}

fn body_kind(headers: &HeaderMap) -> Result<BodyKind, AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        Ok(BodyKind::Json)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(BodyKind::Form)
    } else {
        Err(AppError::UnsupportedMediaType)
    }
}

fn ensure_declared_length(headers: &HeaderMap) -> Result<(), AppError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        Some(length) if length > MAX_BODY_SIZE_BYTES => Err(AppError::PayloadTooLarge),
        _ => Ok(()),
    }
}
