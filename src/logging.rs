use std::fmt;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber; `RUST_LOG` overrides the default `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Sanitized wrapper for email addresses that masks the local part
#[derive(Debug, Clone)]
pub struct SanitizedEmail(String);

impl SanitizedEmail {
    pub fn new(email: impl AsRef<str>) -> Self {
        Self(Self::sanitize(email.as_ref()))
    }

    fn sanitize(email: &str) -> String {
        if let Some((local, domain)) = email.split_once('@') {
            let mut chars = local.chars();
            let masked_local = match (chars.next(), local.chars().count()) {
                (Some(first), len) if len > 2 => format!("{first}***"),
                (_, len) => "*".repeat(len),
            };
            format!("{}@{}", masked_local, domain)
        } else {
            // Invalid email format, mask entirely
            "***@***".to_string()
        }
    }
}

impl fmt::Display for SanitizedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sanitized wrapper for sender names that shows only first and last character
#[derive(Debug, Clone)]
pub struct SanitizedName(String);

impl SanitizedName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Self::sanitize(name.as_ref()))
    }

    fn sanitize(name: &str) -> String {
        let len = name.chars().count();
        let first = name.chars().next();
        let last = name.chars().last();
        match (first, last) {
            (Some(first), Some(last)) if len > 4 => format!("{}***{}", first, last),
            (Some(first), _) if len > 2 => format!("{}***", first),
            _ => "*".repeat(len),
        }
    }
}

impl fmt::Display for SanitizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sanitized wrapper for IP addresses that masks the last octet
#[derive(Debug, Clone)]
pub struct SanitizedIpAddr(String);

impl SanitizedIpAddr {
    pub fn new(ip: impl fmt::Display) -> Self {
        Self(Self::sanitize(&ip.to_string()))
    }

    fn sanitize(ip: &str) -> String {
        // For IPv4, mask the last octet
        if let Some(last_dot) = ip.rfind('.') {
            format!("{}.***", &ip[..last_dot])
        } else if let Some(last_colon) = ip.rfind(':') {
            format!("{}:****", &ip[..last_colon])
        } else {
            "***".to_string()
        }
    }
}

impl fmt::Display for SanitizedIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security event types for structured logging
#[derive(Debug, Clone, Copy)]
pub enum SecurityEvent {
    SubmissionAccepted,
    SubmissionRejected,
    DangerousInput,
    UnsafeUrlRejected,
    RateLimitExceeded,
    AdminAccessGranted,
    AdminAccessDenied,
    DatabaseReset,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::SubmissionAccepted => "submission_accepted",
            SecurityEvent::SubmissionRejected => "submission_rejected",
            SecurityEvent::DangerousInput => "dangerous_input",
            SecurityEvent::UnsafeUrlRejected => "unsafe_url_rejected",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEvent::AdminAccessGranted => "admin_access_granted",
            SecurityEvent::AdminAccessDenied => "admin_access_denied",
            SecurityEvent::DatabaseReset => "database_reset",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::DangerousInput
                | SecurityEvent::UnsafeUrlRejected
                | SecurityEvent::RateLimitExceeded
                | SecurityEvent::AdminAccessDenied
        )
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log a security event with sanitized context
#[macro_export]
macro_rules! log_security_event {
    ($event:expr, $($field:tt)*) => {
        if $event.is_critical() {
            tracing::warn!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        } else {
            tracing::info!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        }
    };
}
