//! Worker pool sizing: computed defaults, configuration values, environment overrides.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::WorkerPoolConfig;

pub const ENV_POOL_CORE: &str = "DBCLI_POOL_CORE";
pub const ENV_POOL_MAX: &str = "DBCLI_POOL_MAX";
pub const ENV_POOL_QUEUE: &str = "DBCLI_POOL_QUEUE";

const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Resolved sizes of one engine's worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizing {
    /// Concurrency a pool starts with
    pub core: usize,
    /// Configured maximum; the monitor may grow a pool up to twice this
    pub max: usize,
    /// Submissions that may wait for a worker before submitters are held back
    pub queue: usize,
}

impl PoolSizing {
    /// Defaults derived from the base concurrency alone
    pub fn computed(base_concurrency: usize) -> Self {
        let core = (base_concurrency / 4).max(2);
        Self {
            core,
            max: base_concurrency.max(core),
            queue: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sizing from configuration and the process environment
    pub fn resolve(config: &WorkerPoolConfig) -> Self {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    /// Environment beats configuration, configuration beats computed defaults
    pub fn resolve_with<F>(config: &WorkerPoolConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let computed = Self::computed(config.base_concurrency);

        let core = positive_env(&lookup, ENV_POOL_CORE)
            .or(config.core_size.filter(|n| *n > 0))
            .unwrap_or(computed.core);
        let max = positive_env(&lookup, ENV_POOL_MAX)
            .or(config.max_size.filter(|n| *n > 0))
            .unwrap_or_else(|| config.base_concurrency.max(core));
        let queue = positive_env(&lookup, ENV_POOL_QUEUE)
            .or(config.queue_capacity.filter(|n| *n > 0))
            .unwrap_or(computed.queue);

        if max < core {
            warn!(
                core = core,
                max = max,
                "⚠️ Worker pool max below core size, raising max to core"
            );
        }

        Self {
            core,
            max: max.max(core),
            queue,
        }
    }

    /// Hard ceiling for monitor-driven growth
    pub fn ceiling(&self) -> usize {
        self.max.saturating_mul(2)
    }
}

fn positive_env<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Some(n as usize),
        _ => {
            warn!(key = key, value = %raw, "⚠️ Ignoring invalid worker pool size override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(base: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            base_concurrency: base,
            ..WorkerPoolConfig::default()
        }
    }

    #[test]
    fn test_computed_defaults() {
        assert_eq!(
            PoolSizing::computed(16),
            PoolSizing {
                core: 4,
                max: 16,
                queue: 100
            }
        );
        assert_eq!(PoolSizing::computed(1).core, 2);
        assert_eq!(PoolSizing::computed(1).max, 2);
    }

    #[test]
    fn test_env_beats_config_beats_computed() {
        let mut cfg = config(8);
        cfg.core_size = Some(3);
        cfg.queue_capacity = Some(10);

        let env: HashMap<&str, &str> = [(ENV_POOL_QUEUE, "7")].into_iter().collect();
        let sizing = PoolSizing::resolve_with(&cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(sizing.core, 3);
        assert_eq!(sizing.max, 8);
        assert_eq!(sizing.queue, 7);
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        let env: HashMap<&str, &str> = [(ENV_POOL_CORE, "-4"), (ENV_POOL_MAX, "lots")]
            .into_iter()
            .collect();
        let sizing = PoolSizing::resolve_with(&config(16), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(sizing, PoolSizing::computed(16));
        assert_eq!(sizing.ceiling(), 32);
    }
}
