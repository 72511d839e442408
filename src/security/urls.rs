use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::models::{ValidationError, ValidationResult};

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];
const DEFAULT_TRUSTED_DOMAINS: &[&str] = &["img.clerk.com", "images.clerk.dev"];

fn dangerous_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)javascript:|data:|on\w+\s*=|<script")
            .expect("dangerous URL pattern must compile")
    })
}

/// Checks an untrusted URL and returns its canonical serialization.
pub fn validate_url(input: Option<&str>) -> ValidationResult<String> {
    parse_safe_url(input).map(String::from)
}

fn parse_safe_url(input: Option<&str>) -> ValidationResult<Url> {
    let raw = input.unwrap_or_default();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingValue);
    }

    let parsed = Url::parse(trimmed).map_err(|err| {
        tracing::debug!(error = %err, "URL validation failed: unparseable");
        ValidationError::MalformedUrl
    })?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        tracing::debug!(scheme = parsed.scheme(), "URL validation failed: unsafe scheme");
        return Err(ValidationError::UnsafeScheme);
    }

    // Scanned on the raw input so encoded payloads in the query or fragment
    // are caught before normalization rewrites them.
    if dangerous_pattern().is_match(raw) {
        tracing::debug!("URL validation failed: dangerous pattern");
        return Err(ValidationError::DangerousPattern);
    }

    Ok(parsed)
}

/// Hostnames a URL must resolve to before it is rendered. Entries prefixed
/// with `*.` match the bare domain and any subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDomains(Vec<String>);

impl TrustedDomains {
    /// Replaces the default list; entries are trimmed and lowercased. Blank
    /// entries and wildcards without a domain (`*.`) are dropped.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .filter(|domain| domain.strip_prefix("*.").map_or(true, |suffix| !suffix.is_empty()))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.0.iter().any(|entry| match entry.strip_prefix("*.") {
            Some(suffix) => {
                host == suffix
                    || host
                        .strip_suffix(suffix)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            None => host == *entry,
        })
    }
}

impl Default for TrustedDomains {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_DOMAINS)
    }
}

pub fn validate_trusted_url(
    input: Option<&str>,
    trusted: &TrustedDomains,
) -> ValidationResult<String> {
    let parsed = parse_safe_url(input)?;
    let host = parsed.host_str().unwrap_or_default();

    if !trusted.matches(host) {
        tracing::debug!(host, "URL validation failed: untrusted domain");
        return Err(ValidationError::UntrustedDomain {
            allowed: trusted.entries().to_vec(),
        });
    }

    Ok(parsed.into())
}
