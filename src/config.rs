use std::net::SocketAddr;

use dotenvy::{dotenv, dotenv_override};
use thiserror::Error;

use crate::db::client::ConnectionSettings;
use crate::db::DbError;
use crate::security::urls::TrustedDomains;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DATABASE_AUTH_TOKEN_VAR: &str = "DATABASE_AUTH_TOKEN";
const BIND_ADDR_VAR: &str = "BIND_ADDR";
const ADMIN_TOKEN_VAR: &str = "ADMIN_TOKEN";
const TRUSTED_DOMAINS_VAR: &str = "TRUSTED_DOMAINS";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_ADDR is not a valid socket address: {0}")]
    InvalidBindAddr(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub admin_token: Option<String>,
    pub trusted_domains: TrustedDomains,
}

impl AppConfig {
    /// Reads `.env` when present, then the process environment. Only a bad
    /// bind address is fatal; every other gap is reported when it is used.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let bind_raw = non_empty_var(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_raw.clone()))?;

        let trusted_domains = non_empty_var(TRUSTED_DOMAINS_VAR)
            .map(|raw| TrustedDomains::new(raw.split(',')))
            .unwrap_or_default();

        let config = Self {
            bind_addr,
            database: DatabaseConfig::from_env(),
            admin_token: non_empty_var(ADMIN_TOKEN_VAR),
            trusted_domains,
        };

        tracing::debug!(
            bind_addr = %config.bind_addr,
            database_configured = config.database.is_configured(),
            admin_enabled = config.admin_token.is_some(),
            trusted_domains = config.trusted_domains.entries().len(),
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Remote database connection parameters. Both must be present before a
/// client is constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            url: non_empty_var(DATABASE_URL_VAR),
            auth_token: non_empty_var(DATABASE_AUTH_TOKEN_VAR),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            (DATABASE_URL_VAR, &self.url),
            (DATABASE_AUTH_TOKEN_VAR, &self.auth_token),
        ]
        .into_iter()
        .filter(|(_, value)| !is_present(value))
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn settings(&self) -> Result<ConnectionSettings, DbError> {
        match (&self.url, &self.auth_token) {
            (Some(url), Some(auth_token)) if self.is_configured() => Ok(ConnectionSettings {
                url: url.trim().to_string(),
                auth_token: auth_token.trim().to_string(),
            }),
            _ => Err(DbError::NotConfigured {
                missing: self.missing(),
            }),
        }
    }
}

/// Where database settings are re-read from when an admin resets the client.
#[derive(Debug, Clone)]
pub enum DatabaseConfigSource {
    /// `.env` (overriding earlier values) and then the process environment.
    Environment,
    Fixed(DatabaseConfig),
}

impl DatabaseConfigSource {
    pub fn load(&self) -> DatabaseConfig {
        match self {
            DatabaseConfigSource::Environment => {
                if let Err(err) = dotenv_override() {
                    tracing::debug!(error = %err, "No .env file reloaded");
                }
                DatabaseConfig::from_env()
            }
            DatabaseConfigSource::Fixed(config) => config.clone(),
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| !value.trim().is_empty())
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_every_parameter() {
        let config = DatabaseConfig::default();
        assert_eq!(config.missing(), vec![DATABASE_URL_VAR, DATABASE_AUTH_TOKEN_VAR]);
        assert!(!config.is_configured());

        let error = config.settings().unwrap_err();
        assert_eq!(
            error.to_string(),
            "database is not configured; missing DATABASE_URL, DATABASE_AUTH_TOKEN"
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = DatabaseConfig {
            url: Some("postgres://db.internal/site".to_string()),
            auth_token: Some("   ".to_string()),
        };
        assert_eq!(config.missing(), vec![DATABASE_AUTH_TOKEN_VAR]);
        assert!(config.settings().is_err());
    }

    #[test]
    fn test_fixed_source_returns_its_config() {
        let config = DatabaseConfig::new("postgres://db.internal/site", "secret");
        assert_eq!(DatabaseConfigSource::Fixed(config.clone()).load(), config);
    }

    #[test]
    fn test_settings_are_trimmed() {
        let config = DatabaseConfig::new(" postgres://db.internal/site ", " secret ");
        assert!(config.is_configured());
        assert_eq!(
            config.settings().unwrap(),
            ConnectionSettings {
                url: "postgres://db.internal/site".to_string(),
                auth_token: "secret".to_string(),
            }
        );
    }
}
