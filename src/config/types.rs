//! Configuration types for rolegate
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::error::ConfigError;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Decision engine switches
    pub authorization: AuthorizationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Seed data to load at startup
    pub seed: SeedConfig,
}

/// Deployment environment
///
/// Only non-production environments may run with the engine disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

/// Decision engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// When false, every request is allowed without evaluation
    pub enabled: bool,

    /// Owners of a resource are allowed everything on it
    pub allow_implicit_owner_access: bool,

    /// Environment the engine runs in
    pub environment: Environment,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_implicit_owner_access: true,
            environment: Environment::Production,
        }
    }
}

impl AuthorizationConfig {
    /// Open-access configuration for local development
    pub fn disabled(environment: Environment) -> Self {
        Self {
            enabled: false,
            environment,
            ..Default::default()
        }
    }

    /// Reject open access in production
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled && self.environment.is_production() {
            return Err(ConfigError::Invalid {
                message: "authorization.enabled = false is only permitted when \
                          authorization.environment is development or test"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}

/// Seed data configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Path of a JSON or TOML seed file
    pub path: Option<String>,
}
