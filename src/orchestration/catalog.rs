//! # Definition Catalog
//!
//! Loads metric definitions (`<engine>-metrics.yml`) and system definitions
//! (`<engine>-config.yml`) from disk. A file that cannot be read or parsed is logged
//! and skipped so one broken file does not stop a collection run.

use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{CollectorError, Result};
use crate::models::{EngineType, MetricDefinition, SystemConfig};

const METRIC_SUFFIXES: [&str; 2] = ["-metrics.yml", "-metrics.yaml"];
const SYSTEM_SUFFIXES: [&str; 2] = ["-config.yml", "-config.yaml"];

/// Metric definitions grouped by engine
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metrics: BTreeMap<EngineType, Vec<MetricDefinition>>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, engine: EngineType, metrics: Vec<MetricDefinition>) {
        self.metrics.entry(engine).or_default().extend(metrics);
    }

    pub fn with_metrics(mut self, engine: EngineType, metrics: Vec<MetricDefinition>) -> Self {
        self.insert(engine, metrics);
        self
    }

    pub fn metrics_for(&self, engine: EngineType) -> &[MetricDefinition] {
        self.metrics.get(&engine).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn engines(&self) -> impl Iterator<Item = EngineType> + '_ {
        self.metrics.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EngineType, &[MetricDefinition])> {
        self.metrics.iter().map(|(engine, m)| (*engine, m.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.metrics.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every `*-metrics.yml` file in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        for path in matching_files(dir, &METRIC_SUFFIXES)? {
            let Some(engine) = engine_for_file(&path) else {
                warn!(file = %path.display(), "⚠️ Cannot infer engine from metric file name, skipping");
                continue;
            };
            match load_metric_file(&path) {
                Ok(metrics) => {
                    debug!(file = %path.display(), engine = %engine, count = metrics.len(), "Loaded metric file");
                    catalog.insert(engine, metrics);
                }
                Err(e) => {
                    error!(file = %path.display(), error = %e, "❌ Failed to load metric file, skipping");
                }
            }
        }
        info!(metrics = catalog.len(), dir = %dir.display(), "📋 Metric catalog loaded");
        Ok(catalog)
    }
}

/// Metric list from one file: a top-level list or `{metrics: [...]}`
pub fn load_metric_file(path: &Path) -> Result<Vec<MetricDefinition>> {
    let content = read_file(path)?;
    parse_metrics(&content)
}

pub fn parse_metrics(content: &str) -> Result<Vec<MetricDefinition>> {
    let value: YamlValue = serde_yaml::from_str(content)?;
    let list = match value {
        YamlValue::Null => return Ok(Vec::new()),
        YamlValue::Sequence(_) => value,
        YamlValue::Mapping(mut map) => map
            .remove("metrics")
            .ok_or_else(|| CollectorError::Catalog("metric file has no `metrics` list".to_string()))?,
        _ => {
            return Err(CollectorError::Catalog(
                "metric file must be a list or a `metrics` mapping".to_string(),
            ))
        }
    };
    Ok(serde_yaml::from_value(list)?)
}

/// Systems from one file: a mapping of system name to system record
pub fn load_system_file(path: &Path) -> Result<Vec<SystemConfig>> {
    let content = read_file(path)?;
    parse_systems(&content, engine_for_file(path))
}

/// Records without `type` take `default_engine`
pub fn parse_systems(content: &str, default_engine: Option<EngineType>) -> Result<Vec<SystemConfig>> {
    let value: YamlValue = serde_yaml::from_str(content)?;
    let map = match value {
        YamlValue::Null => return Ok(Vec::new()),
        YamlValue::Mapping(map) => map,
        _ => {
            return Err(CollectorError::Catalog(
                "system file must map system names to systems".to_string(),
            ))
        }
    };

    let mut systems = Vec::with_capacity(map.len());
    for (key, record) in map {
        let name = match key {
            YamlValue::String(name) => name,
            other => serde_yaml::to_string(&other)?.trim().to_string(),
        };
        let mut record: Mapping = match record {
            YamlValue::Mapping(record) => record,
            _ => {
                warn!(system = %name, "⚠️ System record is not a mapping, skipping");
                continue;
            }
        };

        let has_engine = record.contains_key("type") || record.contains_key("engine");
        if !has_engine {
            let engine = default_engine.ok_or_else(|| {
                CollectorError::Catalog(format!("system {name} has no type and none can be inferred"))
            })?;
            record.insert("type".into(), engine.as_str().into());
        }

        let mut system: SystemConfig = serde_yaml::from_value(YamlValue::Mapping(record))
            .map_err(|e| CollectorError::Catalog(format!("system {name}: {e}")))?;
        system.name = name;
        systems.push(system);
    }
    Ok(systems)
}

/// Load every `*-config.yml` file in `dir`
pub fn load_systems_dir(dir: &Path) -> Result<Vec<SystemConfig>> {
    let mut systems = Vec::new();
    for path in matching_files(dir, &SYSTEM_SUFFIXES)? {
        match load_system_file(&path) {
            Ok(loaded) => {
                debug!(file = %path.display(), count = loaded.len(), "Loaded system file");
                systems.extend(loaded);
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "❌ Failed to load system file, skipping");
            }
        }
    }
    info!(systems = systems.len(), dir = %dir.display(), "📋 System definitions loaded");
    Ok(systems)
}

/// Engine named by a file's prefix
pub fn engine_for_file(path: &Path) -> Option<EngineType> {
    let file_name = path.file_name()?.to_str()?;
    EngineType::from_file_name(file_name)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| CollectorError::Catalog(format!("cannot read {}: {e}", path.display())))
}

fn matching_files(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CollectorError::Catalog(format!("cannot read {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase())
                .is_some_and(|n| suffixes.iter().any(|s| n.ends_with(s)))
        })
        .collect();
    files.sort();
    Ok(files)
}
