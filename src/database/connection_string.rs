//! Engine-specific connection strings and the identities derived from them.
//!
//! Everything here is pure: no sockets are opened, so callers can compute the ledger
//! identity of a node before deciding whether to connect at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{CollectorError, Result};
use crate::masking::{mask_connection_string, mask_host};
use crate::models::{EngineType, Node, SystemConfig};

const MYSQL_PARAMS: &str = "connectTimeout=10000&socketTimeout=15000&characterEncoding=utf8";
const POSTGRES_PARAMS: &str = "connectTimeout=10&socketTimeout=15";
const POSTGRES_DEFAULT_DATABASE: &str = "postgres";

/// Resolve the port of a node, rejecting non-positive values for network engines
pub fn resolve_port(engine: EngineType, node: &Node, system: &SystemConfig) -> Result<i64> {
    let port = system.resolve_port(node);
    if engine.requires_port() && port <= 0 {
        return Err(CollectorError::InvalidPort {
            host: mask_host(&node.host),
            port,
        });
    }
    Ok(port)
}

/// Build the connection string for one node.
///
/// Oracle prefers the service form, then the SID form, and finally degrades to a bare
/// `//host:port/` string with a warning. MySQL and PostgreSQL put the service name in
/// the database path. The embedded engine names an in-memory database.
pub fn build_connection_string(
    engine: EngineType,
    node: &Node,
    system: &SystemConfig,
) -> Result<String> {
    let host = node.host.trim();
    if host.is_empty() {
        return Err(CollectorError::Configuration(format!(
            "node of system '{}' has no host",
            system.name
        )));
    }
    let port = resolve_port(engine, node, system)?;

    let connection_string = match engine {
        EngineType::Oracle => match (node.service(), node.sid()) {
            (Some(service), _) => format!("oracle:thin:@//{host}:{port}/{service}"),
            (None, Some(sid)) => format!("oracle:thin:@{host}:{port}:{sid}"),
            (None, None) => {
                warn!(
                    system = %system.name,
                    host = %mask_host(host),
                    "⚠️ Oracle node has neither svc_name nor sid_name, using bare connect string"
                );
                format!("oracle:thin:@//{host}:{port}/")
            }
        },
        EngineType::MySql => {
            let database = node.service().unwrap_or_default();
            format!("mysql://{host}:{port}/{database}?{MYSQL_PARAMS}")
        }
        EngineType::PostgreSql => {
            let database = node.service().unwrap_or(POSTGRES_DEFAULT_DATABASE);
            format!("postgresql://{host}:{port}/{database}?{POSTGRES_PARAMS}")
        }
        EngineType::Dm => format!("dm://{host}:{port}"),
        EngineType::Embedded => {
            let name = node.service().or_else(|| node.sid()).unwrap_or(host);
            format!("sqlite:{name}?mode=memory&cache=shared")
        }
    };

    Ok(connection_string)
}

/// Cache key for a node's pool: `engine-system-host-(svc|sid)`
pub fn pool_key(engine: EngineType, system_name: &str, node: &Node) -> String {
    format!(
        "{}-{}-{}-{}",
        engine.as_str(),
        system_name,
        node.host.trim(),
        node.database_label()
    )
}

/// Human-readable pool name used in logs: `system-host-engine-pool`
pub fn pool_name(engine: EngineType, system_name: &str, node: &Node) -> String {
    format!(
        "{}-{}-{}-pool",
        system_name,
        mask_host(&node.host),
        engine.as_str()
    )
}

/// Engine plus fully resolved connection string; the failure ledger hashes this.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    engine: EngineType,
    connection_string: String,
}

impl ConnectionIdentity {
    pub fn new(engine: EngineType, connection_string: impl Into<String>) -> Self {
        Self {
            engine,
            connection_string: connection_string.into(),
        }
    }

    /// Identity of a node, computed without any I/O
    pub fn for_node(system: &SystemConfig, node: &Node) -> Result<Self> {
        let connection_string = build_connection_string(system.engine, node, system)?;
        Ok(Self::new(system.engine, connection_string))
    }

    pub fn engine(&self) -> EngineType {
        self.engine
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Canonical `engine|connection_string` form fed to the hash
    pub fn canonical(&self) -> String {
        format!("{}|{}", self.engine.as_str(), self.connection_string)
    }

    pub fn masked(&self) -> String {
        mask_connection_string(&self.connection_string)
    }
}

impl fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("engine", &self.engine)
            .field("connection_string", &self.masked())
            .finish()
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.engine, self.masked())
    }
}
