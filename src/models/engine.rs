//! Database engine families supported by the collector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CollectorError;

/// A database product family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineType {
    Oracle,
    MySql,
    PostgreSql,
    /// Dameng
    Dm,
    /// In-process SQLite, used for embedded collection and test doubles
    Embedded,
}

impl EngineType {
    pub const ALL: [EngineType; 5] = [
        EngineType::Oracle,
        EngineType::MySql,
        EngineType::PostgreSql,
        EngineType::Dm,
        EngineType::Embedded,
    ];

    /// Canonical lowercase key, used in pool keys, identities and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Oracle => "oracle",
            EngineType::MySql => "mysql",
            EngineType::PostgreSql => "postgresql",
            EngineType::Dm => "dm",
            EngineType::Embedded => "embedded",
        }
    }

    /// Infer the engine from a metric or system file name prefix.
    ///
    /// `oracle-`, `mysql-`, `pg-`/`postgres-`/`postgresql-`, `dm-`/`dameng-`, `embedded-`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        let prefix = lower.split('-').next()?;
        if prefix == lower {
            return None;
        }
        prefix.parse().ok()
    }

    /// Engines whose connection string needs a service name or instance id
    pub fn requires_service_identifier(&self) -> bool {
        matches!(self, EngineType::Oracle)
    }

    /// Engines that resolve a network port
    pub fn requires_port(&self) -> bool {
        !matches!(self, EngineType::Embedded)
    }
}

impl FromStr for EngineType {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "oracle" => Ok(EngineType::Oracle),
            "mysql" => Ok(EngineType::MySql),
            "pg" | "postgres" | "postgresql" => Ok(EngineType::PostgreSql),
            "dm" | "dameng" => Ok(EngineType::Dm),
            "embedded" | "sqlite" | "h2" => Ok(EngineType::Embedded),
            other => Err(CollectorError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl TryFrom<String> for EngineType {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EngineType> for String {
    fn from(engine: EngineType) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_aliases_normalize() {
        assert_eq!("PG".parse::<EngineType>().unwrap(), EngineType::PostgreSql);
        assert_eq!("postgres".parse::<EngineType>().unwrap(), EngineType::PostgreSql);
        assert_eq!("dameng".parse::<EngineType>().unwrap(), EngineType::Dm);
        assert_eq!(" Oracle ".parse::<EngineType>().unwrap(), EngineType::Oracle);
        assert!("db2".parse::<EngineType>().is_err());
    }

    #[test]
    fn test_engine_from_file_name() {
        assert_eq!(
            EngineType::from_file_name("oracle-metrics.yml"),
            Some(EngineType::Oracle)
        );
        assert_eq!(
            EngineType::from_file_name("pg-metrics.yaml"),
            Some(EngineType::PostgreSql)
        );
        assert_eq!(
            EngineType::from_file_name("Dameng-config.yml"),
            Some(EngineType::Dm)
        );
        assert_eq!(EngineType::from_file_name("metrics.yml"), None);
        assert_eq!(EngineType::from_file_name("db2-metrics.yml"), None);
    }

    #[test]
    fn test_engine_serializes_as_canonical_key() {
        let json = serde_json::to_string(&EngineType::PostgreSql).unwrap();
        assert_eq!(json, "\"postgresql\"");
        let parsed: EngineType = serde_json::from_str("\"pg\"").unwrap();
        assert_eq!(parsed, EngineType::PostgreSql);
    }
}
