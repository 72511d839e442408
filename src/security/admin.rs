use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use crate::errors::AppError;
use crate::logging::SecurityEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminTokenError {
    #[error("ADMIN_TOKEN is not set")]
    Missing,
    #[error("ADMIN_TOKEN value is too weak; provide at least 32 random characters")]
    Weak,
}

/// Bearer token guarding the administrative routes. Without a usable token
/// the routes answer 503.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    token: Option<Arc<str>>,
}

impl AdminAuth {
    pub fn from_config(token: Option<&str>) -> Self {
        match parse_token(token) {
            Ok(token) => Self {
                token: Some(Arc::from(token)),
            },
            Err(err) => {
                tracing::warn!(error = %err, "Admin routes disabled");
                Self { token: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn verify(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let expected = self.token.as_deref().ok_or(AppError::AdminDisabled)?;

        let header_value = headers
            .get(AUTHORIZATION)
            .ok_or(AppError::MissingAuthHeader)?;

        let header_str = header_value
            .to_str()
            .map_err(|_| AppError::InvalidAuthHeader)?;

        let presented = header_str
            .strip_prefix("Bearer ")
            .ok_or(AppError::InvalidAuthHeader)?;

        if constant_time_eq(presented.trim().as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AppError::InvalidAdminToken)
        }
    }
}

pub async fn require_admin(
    State(auth): State<AdminAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    auth.verify(request.headers())?;

    crate::log_security_event!(
        SecurityEvent::AdminAccessGranted,
        path = %request.uri().path(),
        "Admin request authorized"
    );

    Ok(next.run(request).await)
}

fn parse_token(token: Option<&str>) -> Result<&str, AdminTokenError> {
    let token = token.map(str::trim).ok_or(AdminTokenError::Missing)?;
    ensure_secret_strength(token)?;
    Ok(token)
}

fn ensure_secret_strength(secret: &str) -> Result<(), AdminTokenError> {
    if secret.len() < 32 {
        return Err(AdminTokenError::Weak);
    }

    let unique_chars = secret.chars().collect::<HashSet<_>>();
    if unique_chars.len() < 8 {
        return Err(AdminTokenError::Weak);
    }

    Ok(())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
