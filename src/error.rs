//! Error types for the metrics collection engine.
//!
//! Every failure the engine can observe is a [`CollectorError`] variant. Each variant maps
//! onto a [`FailureKind`], and kinds roll up into a [`FailureFamily`]; the retry policy
//! classifies errors through these two levels instead of inspecting messages.

use crate::config::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unsupported engine type: {0}")]
    UnsupportedEngine(String),
    #[error("Invalid port {port} for host {host}")]
    InvalidPort { host: String, port: i64 },
    #[error("No driver registered for engine {engine}")]
    DriverUnavailable { engine: String },
    #[error("Connection timed out after {timeout:?}: {target}")]
    ConnectTimeout { target: String, timeout: Duration },
    #[error("Query timed out after {timeout:?}: {metric}")]
    QueryTimeout { metric: String, timeout: Duration },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("SQL syntax error: {0}")]
    Syntax(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Failed to create pool {key}: {reason}")]
    PoolCreation { key: String, reason: String },
    #[error("Circuit breaker open: {target}")]
    CircuitOpen { target: String },
    #[error("Worker pool for {engine} rejected submission: {reason}")]
    PoolRejected { engine: String, reason: String },
    #[error("Endpoint skipped by failure ledger: {0}")]
    Blacklisted(String),
    #[error("Ledger I/O error: {0}")]
    LedgerIo(String),
    #[error("Catalog error: {0}")]
    Catalog(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = anyhow::Result<T, CollectorError>;

/// Concrete failure classification used for exact-match retry rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Network,
    Authentication,
    Syntax,
    Database,
    Configuration,
    Capacity,
    Unknown,
}

/// Broad family a [`FailureKind`] belongs to, used for supertype matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureFamily {
    /// Anything raised by the database or its driver protocol
    Database,
    /// Socket level failures below the database protocol
    Transport,
    /// Failures that originate inside this process
    Local,
}

impl FailureKind {
    pub fn family(self) -> FailureFamily {
        match self {
            FailureKind::Timeout
            | FailureKind::Authentication
            | FailureKind::Syntax
            | FailureKind::Database => FailureFamily::Database,
            FailureKind::Network => FailureFamily::Transport,
            FailureKind::Configuration | FailureKind::Capacity | FailureKind::Unknown => {
                FailureFamily::Local
            }
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::Network => write!(f, "Network"),
            FailureKind::Authentication => write!(f, "Authentication"),
            FailureKind::Syntax => write!(f, "Syntax"),
            FailureKind::Database => write!(f, "Database"),
            FailureKind::Configuration => write!(f, "Configuration"),
            FailureKind::Capacity => write!(f, "Capacity"),
            FailureKind::Unknown => write!(f, "Unknown"),
        }
    }
}

impl CollectorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CollectorError::Configuration(_)
            | CollectorError::UnsupportedEngine(_)
            | CollectorError::InvalidPort { .. }
            | CollectorError::DriverUnavailable { .. }
            | CollectorError::Catalog(_) => FailureKind::Configuration,
            CollectorError::ConnectTimeout { .. } | CollectorError::QueryTimeout { .. } => {
                FailureKind::Timeout
            }
            CollectorError::Network(_) | CollectorError::PoolCreation { .. } => {
                FailureKind::Network
            }
            CollectorError::Authentication(_) => FailureKind::Authentication,
            CollectorError::Syntax(_) => FailureKind::Syntax,
            CollectorError::Database(_) => FailureKind::Database,
            CollectorError::CircuitOpen { .. }
            | CollectorError::PoolRejected { .. }
            | CollectorError::Blacklisted(_) => FailureKind::Capacity,
            CollectorError::LedgerIo(_) | CollectorError::Internal(_) => FailureKind::Unknown,
        }
    }

    /// True when the failure says the endpoint itself could not be reached.
    ///
    /// These are the failures that get an endpoint recorded in the failure ledger; a slow
    /// or malformed query on a reachable endpoint does not.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CollectorError::ConnectTimeout { .. }
                | CollectorError::Network(_)
                | CollectorError::Authentication(_)
                | CollectorError::PoolCreation { .. }
        )
    }

    /// Capacity rejections never reached the backend
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CollectorError::CircuitOpen { .. } | CollectorError::PoolRejected { .. }
        )
    }
}

impl From<ConfigurationError> for CollectorError {
    fn from(error: ConfigurationError) -> Self {
        CollectorError::Configuration(error.to_string())
    }
}

impl From<serde_yaml::Error> for CollectorError {
    fn from(error: serde_yaml::Error) -> Self {
        CollectorError::Catalog(format!("YAML parse error: {error}"))
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(error: serde_json::Error) -> Self {
        CollectorError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for CollectorError {
    fn from(error: std::io::Error) -> Self {
        CollectorError::LedgerIo(error.to_string())
    }
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => CollectorError::Configuration(e.to_string()),
            sqlx::Error::Io(e) => CollectorError::Network(e.to_string()),
            sqlx::Error::Tls(e) => CollectorError::Network(format!("TLS: {e}")),
            sqlx::Error::PoolTimedOut => CollectorError::ConnectTimeout {
                target: "pool".to_string(),
                timeout: Duration::ZERO,
            },
            sqlx::Error::PoolClosed => CollectorError::PoolRejected {
                engine: "sqlx".to_string(),
                reason: "pool closed".to_string(),
            },
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                classify_database_code(&code, message)
            }
            other => CollectorError::Database(other.to_string()),
        }
    }
}

/// Map a vendor error code onto a collector error.
///
/// Five character codes are SQLSTATE values (PostgreSQL, SQLite extended codes never reach
/// here with that shape); numeric codes are MySQL server error numbers.
fn classify_database_code(code: &str, message: String) -> CollectorError {
    match code {
        "1064" | "1146" | "1054" => CollectorError::Syntax(message),
        "1045" | "1044" => CollectorError::Authentication(message),
        "57014" => CollectorError::QueryTimeout {
            metric: message,
            timeout: Duration::ZERO,
        },
        c if c.len() == 5 && c.starts_with("42") => CollectorError::Syntax(message),
        c if c.len() == 5 && c.starts_with("28") => CollectorError::Authentication(message),
        c if c.len() == 5 && c.starts_with("08") => CollectorError::Network(message),
        _ => CollectorError::Database(message),
    }
}
