//! Ledger configuration
//!
//! Values come from the process environment, with a `.env` file loaded first
//! when one is present.

use super::funding::InvestmentScope;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// sled database directory
    pub db_path: PathBuf,

    /// Reach of the one-investment-per-investor rule
    pub investment_scope: InvestmentScope,

    /// Fallback filter when RUST_LOG is unset
    pub log_level: String,

    pub environment: Environment,
}

impl LedgerConfig {
    pub const DEFAULT_DB_PATH: &'static str = "loan-ledger.db";

    /// Defaults everywhere except the database location.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            investment_scope: InvestmentScope::default(),
            log_level: "info".to_string(),
            environment: Environment::default(),
        }
    }

    pub fn with_investment_scope(mut self, scope: InvestmentScope) -> Self {
        self.investment_scope = scope;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let db_path = lookup("LOAN_LEDGER_DB_PATH")
            .unwrap_or_else(|| Self::DEFAULT_DB_PATH.to_string());

        let investment_scope = match lookup("LOAN_LEDGER_INVESTMENT_SCOPE") {
            Some(raw) => raw.parse().map_err(ConfigError::InvalidValue)?,
            None => InvestmentScope::default(),
        };

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(LedgerConfig {
            db_path: PathBuf::from(db_path),
            investment_scope,
            log_level,
            environment,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DB_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("dev").unwrap(), Environment::Development);
        assert_eq!(Environment::parse("staging").unwrap(), Environment::Staging);
        assert_eq!(Environment::parse("PROD").unwrap(), Environment::Production);
        assert!(Environment::parse("invalid").is_err());
        assert!(Environment::Production.is_production());
        assert!(!Environment::Staging.is_production());
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = LedgerConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.db_path, PathBuf::from("loan-ledger.db"));
        assert_eq!(config.investment_scope, InvestmentScope::Investor);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_values_are_read_from_environment() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            ("LOAN_LEDGER_DB_PATH", "/var/lib/ledger"),
            ("LOAN_LEDGER_INVESTMENT_SCOPE", "investor_loan"),
            ("RUST_LOG", "loan_ledger=debug"),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.investment_scope, InvestmentScope::InvestorAndLoan);
        assert_eq!(config.log_level, "loan_ledger=debug");
        assert!(config.environment.is_production());
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        let err = LedgerConfig::from_lookup(lookup_from(&[(
            "LOAN_LEDGER_INVESTMENT_SCOPE",
            "everyone",
        )]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue(msg) if msg.contains("everyone")));
    }
}
