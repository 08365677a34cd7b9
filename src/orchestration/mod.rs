//! # Orchestration
//!
//! Collection runs end to end: the definition catalog, pre-flight connectivity probing,
//! planning and fan-out of work units, and run statistics.

pub mod catalog;
pub mod connectivity;
pub mod orchestrator;
pub mod stats;

pub use catalog::{
    engine_for_file, load_metric_file, load_system_file, load_systems_dir, parse_metrics,
    parse_systems, MetricCatalog,
};
pub use connectivity::{ConnectivityProbe, ProbeOutcome, ProbeReport, ProbeStatus};
pub use orchestrator::{CollectionReport, Orchestrator, WorkUnit, DEFAULT_COLLECTION_TIMEOUT};
pub use stats::CollectionStats;
