use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fields::{validate_email, validate_message, validate_name, validate_subject};
use super::{RawField, ValidationResult};
use crate::db::query::{Query, SqlValue, insert};
use crate::schema::MESSAGES_TABLE;

pub const USER_AGENT_MAX_CHARS: usize = 500;

/// Contact form body as received. Every field stays untyped until
/// [`ContactSubmission::validate`] narrows it.
#[derive(Debug, Default, Deserialize)]
pub struct ContactSubmission {
    name: Option<Value>,
    email: Option<Value>,
    subject: Option<Value>,
    message: Option<Value>,
}

/// A submission whose fields all passed validation. Only
/// [`ContactSubmission::validate`] constructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedContact {
    name: String,
    email: String,
    subject: Option<String>,
    message: String,
}

impl ContactSubmission {
    pub fn validate(self) -> ValidationResult<ValidatedContact> {
        let name = validate_name(&RawField::from(self.name))?;
        let email = validate_email(&RawField::from(self.email))?;
        let subject = validate_subject(&RawField::from(self.subject))?;
        let message = validate_message(&RawField::from(self.message))?;

        Ok(ValidatedContact {
            name,
            email,
            subject,
            message,
        })
    }
}

impl ValidatedContact {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Insert statement returning the new row id.
    pub fn into_query(self, ip_address: Option<String>, user_agent: Option<&str>) -> Query {
        let user_agent = user_agent
            .map(|agent| agent.chars().take(USER_AGENT_MAX_CHARS).collect::<String>());

        insert(
            MESSAGES_TABLE,
            [
                ("name", SqlValue::from(self.name)),
                ("email", SqlValue::from(self.email)),
                ("subject", SqlValue::from(self.subject)),
                ("message", SqlValue::from(self.message)),
                ("ip_address", SqlValue::from(ip_address)),
                ("user_agent", SqlValue::from(user_agent)),
            ],
        )
        .returning(&["id"])
    }
}

/// A stored message as listed on the admin route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub is_archived: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
