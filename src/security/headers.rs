use std::convert::Infallible;

use axum::{
    extract::Request,
    http::{HeaderValue, header::HeaderName},
    middleware::Next,
    response::Response,
};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; frame-ancestors 'none'; base-uri 'none'; form-action 'self'";
const REFERRER_POLICY: &str = "no-referrer";
const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=()";

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", REFERRER_POLICY),
    ("permissions-policy", PERMISSIONS_POLICY),
    ("x-xss-protection", "0"),
    ("cache-control", "no-store"),
];

pub async fn set_security_headers(req: Request, next: Next) -> Result<Response, Infallible> {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    Ok(response)
}
