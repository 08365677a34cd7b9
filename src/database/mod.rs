//! # Database Connectivity
//!
//! Connection strings, engine-tuned pools and the drivers behind them.
//!
//! ## Key Components
//!
//! - [`connection_string`] - Pure connection string construction and ledger identities
//! - [`connection_pool_strategies`] - Per-engine pool defaults and overrides
//! - [`driver`] - The driver seam and the explicit driver capability registry
//! - [`sqlx_driver`] - Built-in PostgreSQL, MySQL and embedded SQLite drivers
//! - [`registry`] - Lazily created, cached pools keyed per node
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dbcli_core::database::{ConnectionRegistry, DriverRegistry};
//! use dbcli_core::models::{EngineType, Node, SystemConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectionRegistry::new(DriverRegistry::initialize());
//! let system = SystemConfig::new("billing", EngineType::PostgreSql)
//!     .with_port(5432)
//!     .with_node(Node::new("db01.internal").with_service("billing"));
//!
//! let source = registry
//!     .acquire("billing", &system.nodes[0], &system, EngineType::PostgreSql)
//!     .await?;
//! let outcome = source.fetch("SELECT count(*) FROM pg_stat_activity").await?;
//! println!("{} rows", outcome.rows.len());
//! # Ok(())
//! # }
//! ```

pub mod connection_pool_strategies;
pub mod connection_string;
pub mod driver;
pub mod registry;
#[cfg(any(feature = "postgres", feature = "mysql", feature = "embedded"))]
pub mod sqlx_driver;

pub use connection_pool_strategies::{PoolConfiguration, PoolMetrics};
pub use connection_string::{build_connection_string, pool_key, pool_name, ConnectionIdentity};
pub use driver::{ConnectRequest, DriverRegistry, EngineDriver, MetricSource, QueryOutcome};
pub use registry::{connect_request, ConnectionRegistry, DEFAULT_LOGIN_TIMEOUT};
