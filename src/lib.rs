#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # dbcli-core
//!
//! Concurrent metrics collection engine for fleets of heterogeneous relational databases.
//!
//! ## Overview
//!
//! A collection run takes a set of database systems (each with one or more nodes) and a
//! catalog of metric definitions (SQL plus result shape, execution mode and thresholds),
//! executes every applicable metric against the right nodes in parallel, and returns one
//! [`MetricResult`] per execution. Failures never abort a run; they become failed results.
//!
//! ## Module Organization
//!
//! - [`models`] - Systems, nodes, metric definitions, thresholds and results
//! - [`database`] - Engine drivers, connection strings and the pooled connection registry
//! - [`ledger`] - Greylist/blacklist of endpoints known to be failing
//! - [`retry`] - Failure classification and retry scheduling
//! - [`resilience`] - Per-system circuit breakers
//! - [`executor`] - Query execution, per-engine worker pools, threshold evaluation
//! - [`orchestration`] - Catalog loading, connectivity probing and collection runs
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`masking`] - Masking of hosts and connection strings for output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use dbcli_core::config::CollectorConfig;
//! use dbcli_core::database::{ConnectionRegistry, DriverRegistry};
//! use dbcli_core::ledger::FailureLedger;
//! use dbcli_core::orchestration::{load_systems_dir, MetricCatalog, Orchestrator};
//!
//! # async fn example() -> dbcli_core::Result<()> {
//! let config = CollectorConfig::load(None)?;
//! let registry = Arc::new(
//!     ConnectionRegistry::new(DriverRegistry::initialize())
//!         .with_login_timeout(config.connectivity.login_timeout()),
//! );
//! let ledger = Arc::new(FailureLedger::open(&config.ledger).await?);
//!
//! let systems = load_systems_dir(Path::new("configs"))?;
//! let catalog = MetricCatalog::load_dir(Path::new("metrics"))?;
//!
//! let orchestrator = Orchestrator::from_config(registry, ledger, &config);
//! let report = orchestrator.collect(&systems, &catalog).await;
//! println!("{}", dbcli_core::models::result::results_to_json(&report.results)?);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod masking;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod retry;

pub use config::CollectorConfig;
pub use database::{ConnectionRegistry, DriverRegistry, EngineDriver, MetricSource};
pub use error::{CollectorError, FailureFamily, FailureKind, Result};
pub use executor::{NodeSelector, QueryExecutor, WorkerPoolManager};
pub use ledger::FailureLedger;
pub use models::{
    EngineType, MetricDefinition, MetricPayload, MetricResult, MetricShape, MetricValue, Node,
    NodeRole, SystemConfig, ThresholdLevel,
};
pub use orchestration::{CollectionReport, CollectionStats, ConnectivityProbe, MetricCatalog, Orchestrator};
pub use resilience::{CircuitBreaker, CircuitBreakerManager};
pub use retry::{RetryPolicy, RetryStrategy};
