//! Error types for rolegate
//!
//! This module defines the error hierarchy used throughout the crate.
//! A decision has three outcomes: allowed, denied, and undetermined. Only the
//! last one is an error ([`AccessError`]); a denial is a normal
//! [`AccessDecision`](crate::access_control::AccessDecision), and becomes an
//! [`AccessDeniedError`] only when a caller asks for one via `require`.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Access undetermined: {0}")]
    Undetermined(#[from] AccessError),

    #[error("Access denied: {0}")]
    AccessDenied(#[from] AccessDeniedError),

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

/// Failures of the underlying query layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("store call cancelled")]
    Cancelled,

    #[error("no free {table} id left")]
    IdsExhausted { table: &'static str },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }
}

/// A decision that could not be reached
///
/// Callers must treat this as a denial (fail closed), but it is reported
/// separately so that "denied" and "undetermined" can be told apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot resolve groups of a '{type_name}' through membership edges, use ancestors instead")]
    GroupEntity { type_name: String },
}

impl AccessError {
    /// Whether the decision was abandoned because the caller cancelled it
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AccessError::Store(StoreError::Cancelled))
    }
}

/// An explicit denial, produced by `require`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Access denied for '{action}' on {resource}: {reason}")]
pub struct AccessDeniedError {
    pub action: String,
    pub resource: String,
    pub reason: String,
}

impl AccessDeniedError {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading seed data
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON seed data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML seed data: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported seed file format: {0}")]
    UnsupportedFormat(String),

    #[error("Store error while seeding: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;
