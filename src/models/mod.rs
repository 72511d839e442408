pub mod contact;
pub mod fields;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a URL is required")]
    MissingValue,
    #[error("URL could not be parsed")]
    MalformedUrl,
    #[error("URL scheme must be http or https")]
    UnsafeScheme,
    #[error("URL contains a disallowed pattern")]
    DangerousPattern,
    #[error("URL host is not trusted; allowed domains: {}", allowed.join(", "))]
    UntrustedDomain { allowed: Vec<String> },
    #[error("{field} must be a string")]
    NotAString { field: &'static str },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} is not in a valid format")]
    BadFormat { field: &'static str },
    #[error("{field} contains disallowed content")]
    DangerousContent { field: &'static str },
    #[error("limit must be an integer between 1 and 1000")]
    InvalidLimit,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// An untyped request value, narrowed once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawField {
    Absent,
    Null,
    Text(String),
    Number(f64),
    Other(&'static str),
}

impl RawField {
    pub fn text(value: impl Into<String>) -> Self {
        RawField::Text(value.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawField::Absent => "absent",
            RawField::Null => "null",
            RawField::Text(_) => "string",
            RawField::Number(_) => "number",
            RawField::Other(kind) => kind,
        }
    }
}

impl From<Option<Value>> for RawField {
    fn from(value: Option<Value>) -> Self {
        match value {
            None => RawField::Absent,
            Some(Value::Null) => RawField::Null,
            Some(Value::String(text)) => RawField::Text(text),
            Some(Value::Number(number)) => number
                .as_f64()
                .map(RawField::Number)
                .unwrap_or(RawField::Other("number")),
            Some(Value::Bool(_)) => RawField::Other("boolean"),
            Some(Value::Array(_)) => RawField::Other("array"),
            Some(Value::Object(_)) => RawField::Other("object"),
        }
    }
}

impl From<Option<String>> for RawField {
    fn from(value: Option<String>) -> Self {
        value.map(RawField::Text).unwrap_or(RawField::Absent)
    }
}
