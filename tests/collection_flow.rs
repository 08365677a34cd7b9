//! End-to-end collection runs against the scripted driver

mod common;

use common::*;
use tokio_test::assert_ok;
use std::sync::Arc;
use std::time::Duration;

use dbcli_core::config::WorkerPoolConfig;
use dbcli_core::database::ConnectionIdentity;
use dbcli_core::error::CollectorError;
use dbcli_core::executor::{PoolSizing, QueryExecutor, WorkerPoolManager};
use dbcli_core::ledger::FailureLedger;
use dbcli_core::masking::mask_host;
use dbcli_core::models::{
    EngineType, ExecutionMode, MetricDefinition, MetricShape, MetricValue, NodeRole,
    ThresholdLevel, ThresholdRule, ThresholdSpec,
};
use dbcli_core::orchestration::{MetricCatalog, Orchestrator};

fn orchestrator(driver: &Arc<ScriptedDriver>, ledger: Arc<FailureLedger>) -> Orchestrator {
    let executor = Arc::new(QueryExecutor::new(registry_with(Arc::clone(driver)), ledger));
    let pools = WorkerPoolManager::with_sizing(
        &WorkerPoolConfig::default(),
        PoolSizing {
            core: 2,
            max: 4,
            queue: 16,
        },
    );
    Orchestrator::new(executor, pools).with_collection_timeout(Duration::from_secs(120))
}

fn uptime(mode: ExecutionMode) -> MetricDefinition {
    MetricDefinition::new("uptime", MetricShape::Single, "SELECT uptime FROM v$instance")
        .with_mode(mode)
}

#[tokio::test]
async fn test_blacklisted_node_is_never_contacted() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT uptime FROM v$instance",
        &["UPTIME"],
        vec![vec![MetricValue::Integer(3600)]],
    ));
    let system = oracle_system(
        "S1",
        &[("10.0.0.1", NodeRole::Master), ("10.0.0.2", NodeRole::Standby)],
    );

    let (dir, config, seed) = temp_ledger();
    let blocked = assert_ok!(ConnectionIdentity::for_node(&system, &system.nodes[1]));
    std::fs::write(&config.blacklist_path, format!("{}\n", seed.hash(&blocked))).unwrap();
    let ledger = Arc::new(assert_ok!(FailureLedger::open(&config).await));

    let catalog = MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::All)]);
    let report = orchestrator(&driver, ledger).collect(&[system], &catalog).await;

    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert!(result.success);
    assert_eq!(result.node.as_str(), mask_host("10.0.0.1"));
    assert_eq!(result.value(), Some(&MetricValue::Integer(3600)));
    assert_eq!(driver.attempts_to("10.0.0.2"), 0);
    assert_eq!(report.stats.nodes_skipped, 1);
    drop(dir);
}

#[tokio::test]
async fn test_name_value_result_reports_value_column() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SHOW GLOBAL STATUS LIKE 'Threads_connected'",
        &["Variable_name", "Value"],
        vec![vec!["Threads_connected".into(), "17".into()]],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S2", &[("db-a.example.com", NodeRole::Master)]);
    let metric = MetricDefinition::new(
        "threads_connected",
        MetricShape::Single,
        "SHOW GLOBAL STATUS LIKE 'Threads_connected'",
    );

    let report = orchestrator(&driver, ledger)
        .collect(&[system], &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![metric]))
        .await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].value(), Some(&MetricValue::from("17")));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_node_is_retried_then_recorded() {
    let driver = Arc::new(
        ScriptedDriver::new(EngineType::Oracle)
            .rows("SELECT uptime FROM v$instance", &["UPTIME"], vec![vec![1_i64.into()]])
            .unreachable("10.0.0.9"),
    );
    let (_dir, config, ledger) = temp_ledger();
    let system = oracle_system(
        "S3",
        &[("10.0.0.8", NodeRole::Master), ("10.0.0.9", NodeRole::Standby)],
    );

    let catalog = MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::All)]);
    let report = orchestrator(&driver, Arc::clone(&ledger)).collect(&[system.clone()], &catalog).await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.stats.results_failed, 1);
    let failed = report.results.iter().find(|r| !r.success).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("connection refused"));

    // one attempt plus five network retries
    assert_eq!(driver.attempts_to("10.0.0.9"), 6);
    assert!(ledger.should_skip_node(&system, &system.nodes[1]));

    let error_log = std::fs::read_to_string(&config.error_log_path).unwrap();
    assert_eq!(error_log.lines().count(), 1);
    assert!(error_log.contains("|S3|"));
    assert!(!error_log.contains("10.0.0.9"));
    let blacklist = std::fs::read_to_string(&config.blacklist_path).unwrap();
    assert_eq!(blacklist.lines().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abandons_slow_units() {
    let driver = Arc::new(
        ScriptedDriver::new(EngineType::Oracle)
            .rows("SELECT 1", &["ONE"], vec![vec![1_i64.into()]])
            .reply(
                "SELECT slow",
                Reply::Slow(Duration::from_secs(600), outcome(&["X"], vec![vec![1_i64.into()]])),
            ),
    );
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S4", &[("10.0.0.4", NodeRole::Master)]);
    let catalog = MetricCatalog::new().with_metrics(
        EngineType::Oracle,
        vec![
            MetricDefinition::new("fast", MetricShape::Single, "SELECT 1"),
            MetricDefinition::new("slow", MetricShape::Single, "SELECT slow"),
        ],
    );

    let orchestrator =
        orchestrator(&driver, ledger).with_collection_timeout(Duration::from_secs(10));
    let report = orchestrator.collect(&[system], &catalog).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].metric_name, "fast");
    assert_eq!(report.stats.units_planned, 2);
    assert_eq!(report.stats.units_abandoned, 1);
    assert!(report.stats.is_partial());
}

#[tokio::test]
async fn test_role_modes_fan_out_to_matching_nodes() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT uptime FROM v$instance",
        &["UPTIME"],
        vec![vec![1_i64.into()]],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let standby_only = oracle_system(
        "S5",
        &[("10.0.5.1", NodeRole::Standby), ("10.0.5.2", NodeRole::Standby)],
    );

    let orchestrator = orchestrator(&driver, ledger);
    let masters = orchestrator
        .collect(
            &[standby_only.clone()],
            &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::Master)]),
        )
        .await;
    assert!(masters.results.is_empty());

    let standbys = orchestrator
        .collect(
            &[standby_only],
            &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::Standby)]),
        )
        .await;
    assert_eq!(standbys.results.len(), 2);
    assert!(standbys.results.iter().all(|r| r.node_role == NodeRole::Standby));
}

#[tokio::test]
async fn test_first_mode_prefers_nodes_outside_the_ledger() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT uptime FROM v$instance",
        &["UPTIME"],
        vec![vec![1_i64.into()]],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system(
        "S6",
        &[("10.0.6.1", NodeRole::Master), ("10.0.6.2", NodeRole::Standby)],
    );
    let failing = ConnectionIdentity::for_node(&system, &system.nodes[0]).unwrap();
    ledger.record_failure("S6", &failing);

    let report = orchestrator(&driver, ledger)
        .collect(
            &[system],
            &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::First)]),
        )
        .await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].node.as_str(), mask_host("10.0.6.2"));
    assert_eq!(driver.connection_attempts(), vec!["10.0.6.2".to_string()]);
}

#[tokio::test]
async fn test_duplicates_and_disabled_systems_are_skipped() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT uptime FROM v$instance",
        &["UPTIME"],
        vec![vec![1_i64.into()]],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let enabled = oracle_system("S7", &[("10.0.7.1", NodeRole::Master)]);
    let mut disabled = oracle_system("S8", &[("10.0.8.1", NodeRole::Master)]);
    disabled.enable = false;

    let catalog = MetricCatalog::new().with_metrics(
        EngineType::Oracle,
        vec![uptime(ExecutionMode::All), uptime(ExecutionMode::All)],
    );
    let report = orchestrator(&driver, ledger).collect(&[enabled, disabled], &catalog).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.stats.systems_total, 2);
    assert_eq!(report.stats.systems_skipped, 1);
    assert_eq!(driver.attempts_to("10.0.8.1"), 0);
}

#[tokio::test]
async fn test_threshold_level_is_attached_to_rows() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT tablespace_name, usage_percent FROM dba_tablespace_usage_metrics",
        &["TABLESPACE_NAME", "USAGE_PERCENT"],
        vec![
            vec!["USERS".into(), 92_i64.into()],
            vec!["SYSTEM".into(), 60_i64.into()],
        ],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S9", &[("10.0.9.1", NodeRole::Master)]);
    let metric = MetricDefinition::new(
        "tablespace_usage",
        MetricShape::Multi,
        "SELECT tablespace_name, usage_percent FROM dba_tablespace_usage_metrics",
    )
    .with_threshold(ThresholdSpec::with_rules(vec![ThresholdRule::new(
        ThresholdLevel::High,
        ">",
        80.0,
    )
    .on_column("usage_percent")]));

    let report = orchestrator(&driver, ledger)
        .collect(&[system], &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![metric]))
        .await;

    assert_eq!(report.results[0].threshold_level, Some(ThresholdLevel::High));
    assert_eq!(report.results[0].payload.row_count(), 2);
}

#[tokio::test]
async fn test_legacy_threshold_on_single_row_uses_first_cell() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).rows(
        "SELECT used_pct, total FROM v$fra_usage",
        &["USED_PCT", "TOTAL"],
        vec![vec![95_i64.into(), 100_i64.into()]],
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S10", &[("10.0.10.1", NodeRole::Master)]);
    let metric = MetricDefinition::new(
        "fra_usage",
        MetricShape::Single,
        "SELECT used_pct, total FROM v$fra_usage",
    )
    .with_columns(["used_pct", "total"])
    .with_threshold(ThresholdSpec::legacy(ThresholdLevel::High, ">", 80.0));

    let report = orchestrator(&driver, ledger)
        .collect(&[system], &MetricCatalog::new().with_metrics(EngineType::Oracle, vec![metric]))
        .await;

    let result = &report.results[0];
    assert!(result.success);
    assert_eq!(result.payload.row_count(), 1);
    assert_eq!(result.threshold_level, Some(ThresholdLevel::High));
}

#[tokio::test]
async fn test_panicked_task_is_counted_apart_from_deadline() {
    let driver = Arc::new(
        ScriptedDriver::new(EngineType::Oracle)
            .rows("SELECT uptime FROM v$instance", &["UPTIME"], vec![vec![60_i64.into()]])
            .reply("SELECT crash FROM dual", Reply::Panic),
    );
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S11", &[("10.0.11.1", NodeRole::Master)]);
    let crash = MetricDefinition::new("crash", MetricShape::Single, "SELECT crash FROM dual");
    let catalog = MetricCatalog::new()
        .with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::First), crash]);

    let report = orchestrator(&driver, ledger).collect(&[system], &catalog).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].metric_name, "uptime");
    assert_eq!(report.stats.units_planned, 2);
    assert_eq!(report.stats.units_panicked, 1);
    assert_eq!(report.stats.units_abandoned, 0);
    assert!(report.stats.is_partial());
}

#[tokio::test(start_paused = true)]
async fn test_failing_system_reported_with_unhealthy_breaker() {
    let driver = Arc::new(ScriptedDriver::new(EngineType::Oracle).reply(
        "SELECT uptime FROM v$instance",
        Reply::Fail(CollectorError::Database("ORA-01034: ORACLE not available".into())),
    ));
    let (_dir, _config, ledger) = temp_ledger();
    let system = oracle_system("S12", &[("10.0.12.1", NodeRole::Master)]);
    let catalog = MetricCatalog::new().with_metrics(EngineType::Oracle, vec![uptime(ExecutionMode::First)]);

    let report = orchestrator(&driver, ledger).collect(&[system], &catalog).await;

    assert!(!report.results[0].success);
    assert_eq!(report.stats.unhealthy_breakers, vec!["S12".to_string()]);
}
