//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes to the console and, when the log
//! directory is writable, to a JSON file per process.

use chrono::Utc;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::orchestration::CollectionStats;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let pid = process::id();

        let log_dir = PathBuf::from("logs");
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = log_dir.join(format!("{environment}.{pid}.{timestamp}.log"));

        // Console only when the directory or file cannot be created
        let log_file = fs::create_dir_all(&log_dir)
            .and_then(|_| File::create(&log_path))
            .ok();
        let file_enabled = log_file.is_some();

        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(build_filter(&log_level))
        });

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(build_filter(&log_level)),
            )
            .with(file_layer);

        if subscriber.try_init().is_err() {
            // A global subscriber is already set (test harness or embedding application)
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            file_enabled = file_enabled,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// `RUST_LOG` wins over the environment default
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("DBCLI_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the outcome of one collection run
pub fn log_collection_summary(run_id: &str, stats: &CollectionStats) {
    tracing::info!(
        run_id = %run_id,
        systems_total = stats.systems_total,
        systems_skipped = stats.systems_skipped,
        nodes_skipped = stats.nodes_skipped,
        units_planned = stats.units_planned,
        units_completed = stats.units_completed,
        units_abandoned = stats.units_abandoned,
        results_succeeded = stats.results_succeeded,
        results_failed = stats.results_failed,
        units_panicked = stats.units_panicked,
        unhealthy_breakers = ?stats.unhealthy_breakers,
        by_engine = ?stats.results_by_engine,
        timestamp = %Utc::now().to_rfc3339(),
        "📊 COLLECTION_SUMMARY"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
