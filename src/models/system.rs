//! Logical database systems and their physical nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::EngineType;

/// Role of a node inside its system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum NodeRole {
    Master,
    Standby,
    #[default]
    Unknown,
}

impl NodeRole {
    /// Lenient role parsing: `primary`/`master`, and `slave` or anything mentioning `standby`
    pub fn parse(raw: &str) -> Self {
        let role = raw.trim().to_lowercase();
        match role.as_str() {
            "primary" | "master" => NodeRole::Master,
            "slave" => NodeRole::Standby,
            r if r.contains("standby") => NodeRole::Standby,
            "" | "unknown" => NodeRole::Unknown,
            _ => {
                warn!(role = %raw, "⚠️ Unsupported node role, expected master/standby");
                NodeRole::Unknown
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Standby => "standby",
            NodeRole::Unknown => "unknown",
        }
    }
}

impl From<Option<String>> for NodeRole {
    fn from(raw: Option<String>) -> Self {
        raw.map(|r| NodeRole::parse(&r)).unwrap_or_default()
    }
}

impl From<NodeRole> for String {
    fn from(role: NodeRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical endpoint of a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub host: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default, alias = "svcName", alias = "service_name")]
    pub svc_name: Option<String>,
    #[serde(default, alias = "sidName", alias = "sid")]
    pub sid_name: Option<String>,
    #[serde(default)]
    pub role: NodeRole,
}

impl Node {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            svc_name: None,
            sid_name: None,
            role: NodeRole::Unknown,
        }
    }

    pub fn with_port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_service(mut self, svc_name: impl Into<String>) -> Self {
        self.svc_name = Some(svc_name.into());
        self
    }

    pub fn with_sid(mut self, sid_name: impl Into<String>) -> Self {
        self.sid_name = Some(sid_name.into());
        self
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Non-blank service name
    pub fn service(&self) -> Option<&str> {
        self.svc_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Non-blank instance identifier
    pub fn sid(&self) -> Option<&str> {
        self.sid_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Service name, else instance identifier; used in pool keys
    pub fn database_label(&self) -> &str {
        self.service().or_else(|| self.sid()).unwrap_or("default")
    }
}

/// Per-system connection pool overrides, layered over the engine defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolOverrides {
    #[serde(default, alias = "maxPoolSize")]
    pub max_pool_size: Option<u32>,
    #[serde(default, alias = "minIdle")]
    pub min_idle: Option<u32>,
    #[serde(default, alias = "connectionTimeout", alias = "connection_timeout")]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default, alias = "idleTimeout", alias = "idle_timeout")]
    pub idle_timeout_ms: Option<u64>,
    #[serde(default, alias = "maxLifetime", alias = "max_lifetime")]
    pub max_lifetime_ms: Option<u64>,
}

/// A logical database deployment with one or more nodes
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Filled from the map key when loaded from a system file
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", alias = "engine")]
    pub engine: EngineType,
    #[serde(default, alias = "enabled")]
    pub enable: bool,
    /// Default port for nodes without their own
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(flatten)]
    pub pool: PoolOverrides,
}

impl SystemConfig {
    pub fn new(name: impl Into<String>, engine: EngineType) -> Self {
        Self {
            name: name.into(),
            engine,
            enable: true,
            port: 0,
            username: None,
            password: None,
            nodes: Vec::new(),
            pool: PoolOverrides::default(),
        }
    }

    pub fn with_port(mut self, port: i64) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_pool_overrides(mut self, pool: PoolOverrides) -> Self {
        self.pool = pool;
        self
    }

    /// Node port, else the system port
    pub fn resolve_port(&self, node: &Node) -> i64 {
        node.port.unwrap_or(self.port)
    }

    /// Nodes with the given role, in declared order
    pub fn nodes_with_role(&self, role: NodeRole) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.role == role).collect()
    }
}

// Credentials never reach log output
impl fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemConfig")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("enable", &self.enable)
            .field("port", &self.port)
            .field("username", &self.username.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("nodes", &self.nodes.len())
            .field("pool", &self.pool)
            .finish()
    }
}
