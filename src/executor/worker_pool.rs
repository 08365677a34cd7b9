//! # Worker Pool Management
//!
//! One bounded worker pool per engine type. A pool starts with `core` workers and lets at
//! most `queue` submissions wait for one. When the queue is full the pool adds workers one
//! at a time up to `max`; only a pool at `max` with a full queue makes the submitter wait
//! for a slot. Pools never share permits, so a slow engine cannot starve the others.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::scaling::{ScalingAction, ScalingPolicy};
use super::sizing::PoolSizing;
use crate::config::WorkerPoolConfig;
use crate::error::{CollectorError, Result};
use crate::models::EngineType;

/// Point-in-time view of one engine pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerPoolStats {
    pub engine: EngineType,
    pub concurrency: usize,
    pub max: usize,
    pub ceiling: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub is_shutdown: bool,
}

impl WorkerPoolStats {
    /// Active workers over the configured max
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.active as f64 / self.max as f64
    }
}

/// Bounded pool for a single engine type
#[derive(Debug)]
pub struct EnginePool {
    engine: EngineType,
    sizing: PoolSizing,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    concurrency: AtomicUsize,
    queued: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    shutdown: AtomicBool,
}

impl EnginePool {
    pub fn new(engine: EngineType, sizing: PoolSizing) -> Self {
        info!(
            "🏊 POOL: Creating worker pool for {} (core: {}, max: {}, queue: {})",
            engine, sizing.core, sizing.max, sizing.queue
        );
        Self {
            engine,
            sizing,
            workers: Arc::new(Semaphore::new(sizing.core)),
            admission: Arc::new(Semaphore::new(sizing.core + sizing.queue)),
            concurrency: AtomicUsize::new(sizing.core),
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> EngineType {
        self.engine
    }

    pub fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    /// Queue `task` on this pool. A full queue first adds a worker (up to `max`), then
    /// makes the caller wait for a slot.
    ///
    /// The handle resolves to [`CollectorError::PoolRejected`] when the pool shuts down
    /// before the task gets a worker.
    pub async fn submit<F, T>(self: &Arc<Self>, task: F) -> Result<JoinHandle<Result<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(self.rejected("pool is shut down"));
        }

        let admission = self.admit().await?;
        let queued = QueuedSlot::enter(Arc::clone(self));

        let pool = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _admission = admission;
            let worker = Arc::clone(&pool.workers).acquire_owned().await;
            drop(queued);
            let _worker =
                worker.map_err(|_| pool.rejected("pool shut down before the task started"))?;

            let _active = ActiveSlot::enter(&pool);
            let output = task.await;
            pool.completed.fetch_add(1, Ordering::Relaxed);
            Ok::<T, CollectorError>(output)
        }))
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        loop {
            match Arc::clone(&self.admission).try_acquire_owned() {
                Ok(permit) => return Ok(permit),
                Err(TryAcquireError::Closed) => return Err(self.rejected("pool is shut down")),
                Err(TryAcquireError::NoPermits) => {
                    let added = self.add_workers(1, self.sizing.max);
                    if added > 0 {
                        debug!(
                            engine = %self.engine,
                            concurrency = self.concurrency.load(Ordering::Acquire),
                            max = self.sizing.max,
                            "➕ POOL: Queue full, adding worker"
                        );
                        continue;
                    }
                    debug!(engine = %self.engine, "POOL: Queue full at max size, submitter waits");
                    return Arc::clone(&self.admission)
                        .acquire_owned()
                        .await
                        .map_err(|_| self.rejected("pool is shut down"));
                }
            }
        }
    }

    /// Add workers, bounded by twice the configured max. Returns the number added.
    pub fn grow(&self, count: usize) -> usize {
        let added = self.add_workers(count, self.sizing.ceiling());
        if added > 0 {
            info!(
                engine = %self.engine,
                added = added,
                concurrency = self.concurrency.load(Ordering::Acquire),
                "📈 POOL: Worker pool grown"
            );
        }
        added
    }

    /// Raise concurrency by up to `count` without passing `limit`
    fn add_workers(&self, count: usize, limit: usize) -> usize {
        let mut current = self.concurrency.load(Ordering::Acquire);
        loop {
            let added = count.min(limit.saturating_sub(current));
            if added == 0 || self.is_shutdown() {
                return 0;
            }
            match self.concurrency.compare_exchange(
                current,
                current + added,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.workers.add_permits(added);
                    self.admission.add_permits(added);
                    return added;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            engine: self.engine,
            concurrency: self.concurrency.load(Ordering::Acquire),
            max: self.sizing.max,
            ceiling: self.sizing.ceiling(),
            queue_capacity: self.sizing.queue,
            queued: self.queued.load(Ordering::Acquire),
            active: self.active.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Relaxed),
            is_shutdown: self.is_shutdown(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Reject new submissions and tasks still waiting for a worker; running tasks finish
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.admission.close();
        self.workers.close();
        info!(engine = %self.engine, "🛑 POOL: Worker pool shut down");
    }

    fn rejected(&self, reason: &str) -> CollectorError {
        CollectorError::PoolRejected {
            engine: self.engine.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Counts a submission as queued until it is dropped
struct QueuedSlot(Arc<EnginePool>);

impl QueuedSlot {
    fn enter(pool: Arc<EnginePool>) -> Self {
        pool.queued.fetch_add(1, Ordering::AcqRel);
        Self(pool)
    }
}

impl Drop for QueuedSlot {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ActiveSlot<'a>(&'a EnginePool);

impl<'a> ActiveSlot<'a> {
    fn enter(pool: &'a EnginePool) -> Self {
        pool.active.fetch_add(1, Ordering::AcqRel);
        Self(pool)
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Lazily created worker pools, one per engine type
#[derive(Debug, Clone)]
pub struct WorkerPoolManager {
    pools: Arc<DashMap<EngineType, Arc<EnginePool>>>,
    sizing: PoolSizing,
    scaling: Arc<ScalingPolicy>,
    monitor_interval: Duration,
    monitor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerPoolManager {
    /// Sizing from configuration plus `DBCLI_POOL_*` environment overrides
    pub fn new(config: &WorkerPoolConfig) -> Self {
        Self::with_sizing(config, PoolSizing::resolve(config))
    }

    pub fn with_sizing(config: &WorkerPoolConfig, sizing: PoolSizing) -> Self {
        info!(
            core = sizing.core,
            max = sizing.max,
            queue = sizing.queue,
            monitor_interval_secs = config.monitor_interval_seconds,
            "🏊 POOL: Initializing worker pool manager"
        );
        Self {
            pools: Arc::new(DashMap::new()),
            sizing,
            scaling: Arc::new(ScalingPolicy::new(
                config.queue_high_water,
                config.utilization_warning,
            )),
            monitor_interval: config.monitor_interval(),
            monitor: Arc::new(Mutex::new(None)),
        }
    }

    pub fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    /// Pool for `engine`, created on first use
    pub fn pool(&self, engine: EngineType) -> Arc<EnginePool> {
        if let Some(existing) = self.pools.get(&engine) {
            return Arc::clone(existing.value());
        }
        let pool = self
            .pools
            .entry(engine)
            .or_insert_with(|| Arc::new(EnginePool::new(engine, self.sizing)));
        Arc::clone(pool.value())
    }

    /// Submit `task` to the pool of `engine`
    ///
    /// ```
    /// use dbcli_core::config::WorkerPoolConfig;
    /// use dbcli_core::executor::{PoolSizing, WorkerPoolManager};
    /// use dbcli_core::models::EngineType;
    ///
    /// # tokio_test::block_on(async {
    /// let sizing = PoolSizing { core: 2, max: 4, queue: 8 };
    /// let pools = WorkerPoolManager::with_sizing(&WorkerPoolConfig::default(), sizing);
    /// let handle = pools.submit(EngineType::MySql, async { 6 * 7 }).await.unwrap();
    /// assert_eq!(handle.await.unwrap(), Ok(42));
    /// # });
    /// ```
    pub async fn submit<F, T>(&self, engine: EngineType, task: F) -> Result<JoinHandle<Result<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool(engine).submit(task).await
    }

    pub fn stats(&self) -> Vec<WorkerPoolStats> {
        let mut stats: Vec<WorkerPoolStats> =
            self.pools.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by_key(|s| s.engine);
        stats
    }

    /// One monitor pass over every pool. Returns the number of pools grown.
    pub fn run_scaling_pass(&self) -> usize {
        let pools: Vec<Arc<EnginePool>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut grown = 0;
        for pool in pools {
            let stats = pool.stats();
            if stats.is_shutdown {
                continue;
            }
            debug!(
                engine = %stats.engine,
                queued = stats.queued,
                active = stats.active,
                concurrency = stats.concurrency,
                completed = stats.completed,
                "POOL: Worker pool status"
            );
            if let ScalingAction::ScaleUp { count } = self.scaling.evaluate(&stats) {
                if pool.grow(count) > 0 {
                    grown += 1;
                }
            }
        }
        grown
    }

    /// Start the background monitor; calling it again is a no-op
    pub fn start_monitor(&self) {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return;
        }

        let manager = self.clone();
        let period = self.monitor_interval.max(Duration::from_millis(100));
        *slot = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                manager.run_scaling_pass();
            }
        }));
        info!(
            interval_secs = period.as_secs(),
            "🔄 POOL: Worker pool monitor started"
        );
    }

    /// Stop the monitor and shut every pool down
    pub fn shutdown(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
        for entry in self.pools.iter() {
            entry.value().shutdown();
        }
        if !self.pools.is_empty() {
            warn!(pools = self.pools.len(), "🛑 POOL: All worker pools shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn sizing(core: usize, max: usize, queue: usize) -> PoolSizing {
        PoolSizing { core, max, queue }
    }

    fn manager(sizing: PoolSizing, high_water: usize) -> WorkerPoolManager {
        let config = WorkerPoolConfig {
            queue_high_water: high_water,
            ..WorkerPoolConfig::default()
        };
        WorkerPoolManager::with_sizing(&config, sizing)
    }

    #[tokio::test]
    async fn test_same_engine_shares_pool() {
        let manager = manager(sizing(2, 4, 10), 50);
        let a = manager.pool(EngineType::MySql);
        let b = manager.pool(EngineType::MySql);
        let c = manager.pool(EngineType::Oracle);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_submit_runs_task() {
        let manager = manager(sizing(2, 4, 10), 50);
        let handle = manager.submit(EngineType::MySql, async { 21 * 2 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), Ok(42));
        assert_eq!(manager.stats()[0].completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_holds_back_submitter() {
        let manager = manager(sizing(1, 1, 1), 50);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = manager
            .submit(EngineType::MySql, async move {
                let _ = release_rx.await;
            })
            .await
            .unwrap();
        let second = manager.submit(EngineType::MySql, async {}).await.unwrap();

        let third = tokio::time::timeout(
            Duration::from_secs(1),
            manager.submit(EngineType::MySql, async {}),
        )
        .await;
        assert!(third.is_err(), "third submission should wait for a slot");

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        let third = manager.submit(EngineType::MySql, async {}).await.unwrap();
        third.await.unwrap().unwrap();
    }

    async fn settle(pool: &EnginePool, active: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.stats().active != active {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("pool did not reach expected activity");
    }

    #[tokio::test]
    async fn test_full_queue_adds_workers_up_to_max() {
        let manager = manager(sizing(1, 3, 1), 50);
        let pool = manager.pool(EngineType::Oracle);
        let started = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let started = Arc::clone(&started);
            let mut rx = release_rx.clone();
            let submitted = tokio::time::timeout(
                Duration::from_secs(1),
                manager.submit(EngineType::Oracle, async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.wait_for(|released| *released).await;
                }),
            )
            .await;
            handles.push(submitted.expect("submission accepted").unwrap());
        }

        settle(&pool, 3).await;
        let stats = pool.stats();
        assert_eq!(stats.concurrency, 3);
        assert_eq!(stats.queued, 1);
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert!((stats.utilization() - 1.0).abs() < f64::EPSILON);

        let fifth = tokio::time::timeout(
            Duration::from_millis(200),
            manager.submit(EngineType::Oracle, async {}),
        )
        .await;
        assert!(fifth.is_err(), "pool at max with a full queue holds the submitter");

        release_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(pool.stats().concurrency, 3);
    }

    #[tokio::test]
    async fn test_pools_are_isolated() {
        let manager = manager(sizing(1, 1, 0), 50);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let blocked = manager
            .submit(EngineType::Oracle, async move {
                let _ = release_rx.await;
            })
            .await
            .unwrap();

        let other = manager.submit(EngineType::MySql, async { 1 }).await.unwrap();
        assert_eq!(other.await.unwrap(), Ok(1));

        release_tx.send(()).unwrap();
        blocked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_scaling_pass_grows_backlogged_pool() {
        let manager = manager(sizing(1, 2, 10), 2);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let mut rx = release_rx.clone();
            handles.push(
                manager
                    .submit(EngineType::PostgreSql, async move {
                        let _ = rx.wait_for(|released| *released).await;
                    })
                    .await
                    .unwrap(),
            );
        }
        tokio::task::yield_now().await;

        assert_eq!(manager.run_scaling_pass(), 1);
        assert_eq!(manager.stats()[0].concurrency, 3);
        assert_eq!(manager.run_scaling_pass(), 1);
        assert_eq!(manager.stats()[0].concurrency, 4);
        assert_eq!(manager.run_scaling_pass(), 0, "ceiling is twice the max");

        release_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_submissions() {
        let manager = manager(sizing(1, 1, 1), 50);
        manager.pool(EngineType::Dm);
        manager.shutdown();

        let rejected = manager.submit(EngineType::Dm, async {}).await;
        assert!(matches!(rejected, Err(CollectorError::PoolRejected { .. })));
        assert!(manager.stats()[0].is_shutdown);
    }
}
