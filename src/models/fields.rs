use std::sync::OnceLock;

use regex::Regex;

use super::{RawField, ValidationError, ValidationResult};

pub const EMAIL_MAX_CHARS: usize = 254;
pub const NAME_MAX_CHARS: usize = 100;
pub const MESSAGE_MAX_CHARS: usize = 5000;
pub const SUBJECT_MAX_CHARS: usize = 200;
pub const LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

const NAME_FORBIDDEN_CHARS: &[char] = &[
    '"', '`', ';', '\u{201C}', '\u{201D}', '\u{201E}', '\u{2018}', '\u{00AB}', '\u{00BB}',
];
const NAME_FORBIDDEN_MARKERS: &[&str] = &["--", "/*", "*/"];
const APOSTROPHES: &[char] = &['\'', '\u{2019}'];

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern must compile")
    })
}

fn sql_keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(union|select|insert|update|delete|drop)\b")
            .expect("keyword pattern must compile")
    })
}

/// Narrows a raw field to a trimmed, non-empty string no longer than `max`
/// characters.
fn required_text(field: &'static str, raw: &RawField, max: usize) -> ValidationResult<String> {
    let RawField::Text(value) = raw else {
        tracing::debug!(field, kind = raw.kind(), "Field validation failed: not a string");
        return Err(ValidationError::NotAString { field });
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    let len = trimmed.chars().count();
    if len > max {
        tracing::debug!(field, length = len, max, "Field validation failed: too long");
        return Err(ValidationError::TooLong { field, max });
    }

    Ok(trimmed.to_string())
}

pub fn validate_email(raw: &RawField) -> ValidationResult<String> {
    let email = required_text("email", raw, EMAIL_MAX_CHARS)?;

    if !email_pattern().is_match(&email) {
        tracing::debug!("Email validation failed: invalid format");
        return Err(ValidationError::BadFormat { field: "email" });
    }

    Ok(email.to_lowercase())
}

pub fn validate_name(raw: &RawField) -> ValidationResult<String> {
    let name = required_text("name", raw, NAME_MAX_CHARS)?;

    if contains_sql_metacharacters(&name) || sql_keyword_pattern().is_match(&name) {
        tracing::debug!("Name validation failed: contains disallowed content");
        return Err(ValidationError::DangerousContent { field: "name" });
    }

    Ok(name)
}

pub fn validate_message(raw: &RawField) -> ValidationResult<String> {
    required_text("message", raw, MESSAGE_MAX_CHARS)
}

/// Subjects are optional: absent, null or blank input normalizes to `None`.
pub fn validate_subject(raw: &RawField) -> ValidationResult<Option<String>> {
    match raw {
        RawField::Absent | RawField::Null => Ok(None),
        RawField::Text(value) if value.trim().is_empty() => Ok(None),
        _ => required_text("subject", raw, SUBJECT_MAX_CHARS).map(Some),
    }
}

pub fn validate_limit(raw: &RawField) -> ValidationResult<u32> {
    let number = match raw {
        RawField::Number(value) => *value,
        RawField::Text(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidLimit)?,
        _ => return Err(ValidationError::InvalidLimit),
    };

    if !number.is_finite() || number.fract() != 0.0 {
        return Err(ValidationError::InvalidLimit);
    }

    let lower = f64::from(*LIMIT_RANGE.start());
    let upper = f64::from(*LIMIT_RANGE.end());
    if number < lower || number > upper {
        return Err(ValidationError::InvalidLimit);
    }

    Ok(number as u32)
}

fn contains_sql_metacharacters(value: &str) -> bool {
    if value.contains(NAME_FORBIDDEN_CHARS)
        || NAME_FORBIDDEN_MARKERS
            .iter()
            .any(|marker| value.contains(marker))
    {
        return true;
    }

    // An apostrophe is only accepted inside a word, as in "O'Connor".
    let chars: Vec<char> = value.chars().collect();
    chars.iter().enumerate().any(|(index, c)| {
        if !APOSTROPHES.contains(c) {
            return false;
        }
        let before = index
            .checked_sub(1)
            .and_then(|i| chars.get(i))
            .is_some_and(|c| c.is_alphabetic());
        let after = chars.get(index + 1).is_some_and(|c| c.is_alphabetic());
        !(before && after)
    })
}
