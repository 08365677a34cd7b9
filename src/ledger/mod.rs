//! # Failure Ledger
//!
//! Remembers connection identities that recently failed so that no time is spent on
//! endpoints known to be down.
//!
//! Two tiers are consulted:
//!
//! - **Greylist**: in-memory, hash to insertion instant. Entries older than the TTL
//!   (15 minutes by default) count as absent and are evicted when next checked.
//! - **Blacklist**: hashes loaded from the persisted blacklist file at startup. They stay
//!   in force for the lifetime of the process unless [`FailureLedger::clear`] is called.
//!
//! Failures recorded during a run go to the greylist immediately and are queued for
//! [`FailureLedger::persist`], which appends them to the blacklist file and writes an
//! operator-readable line (timestamp, system, masked connection string) to the error log.

mod hashing;
pub mod persistence;

pub use hashing::IdentityHasher;
pub use persistence::ErrorLogEntry;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::database::ConnectionIdentity;
use crate::error::Result;
use crate::models::{Node, SystemConfig};

#[derive(Debug, Clone)]
struct PendingFailure {
    hash: String,
    entry: ErrorLogEntry,
}

#[derive(Debug)]
pub struct FailureLedger {
    hasher: IdentityHasher,
    greylist_ttl: Duration,
    greylist: DashMap<String, Instant>,
    blacklist: DashSet<String>,
    pending: Mutex<Vec<PendingFailure>>,
    blacklist_path: PathBuf,
    error_log_path: PathBuf,
    // Serializes file appends within this process
    write_lock: tokio::sync::Mutex<()>,
}

impl FailureLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            hasher: IdentityHasher::new(config.hash_key.clone()),
            greylist_ttl: config.greylist_ttl(),
            greylist: DashMap::new(),
            blacklist: DashSet::new(),
            pending: Mutex::new(Vec::new()),
            blacklist_path: config.blacklist_path.clone(),
            error_log_path: config.error_log_path.clone(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a ledger and merge the configured blacklist file into it
    pub async fn open(config: &LedgerConfig) -> Result<Self> {
        let ledger = Self::new(config);
        let path = ledger.blacklist_path.clone();
        ledger.load_persisted(&path).await?;
        Ok(ledger)
    }

    pub fn hash(&self, identity: &ConnectionIdentity) -> String {
        self.hasher.hash(identity)
    }

    /// True when the identity is blacklisted or greylisted within the TTL
    pub fn should_skip(&self, identity: &ConnectionIdentity) -> bool {
        self.contains_hash(&self.hash(identity))
    }

    fn contains_hash(&self, hash: &str) -> bool {
        if self.blacklist.contains(hash) {
            return true;
        }
        let expired = match self.greylist.get(hash) {
            Some(recorded_at) => recorded_at.elapsed() >= self.greylist_ttl,
            None => return false,
        };
        if expired {
            self.greylist
                .remove_if(hash, |_, recorded_at| recorded_at.elapsed() >= self.greylist_ttl);
            debug!(hash = %short(hash), "Greylist entry expired");
            return false;
        }
        true
    }

    /// Node-level skip decision. Nodes whose identity cannot be built are not skipped;
    /// the executor reports their configuration error instead.
    pub fn should_skip_node(&self, system: &SystemConfig, node: &Node) -> bool {
        ConnectionIdentity::for_node(system, node)
            .map(|identity| self.should_skip(&identity))
            .unwrap_or(false)
    }

    /// System-level skip decision: every node with a host must be in the ledger
    pub fn should_skip_system(&self, system: &SystemConfig) -> bool {
        let mut candidates = system
            .nodes
            .iter()
            .filter(|node| !node.host.trim().is_empty())
            .peekable();
        if candidates.peek().is_none() {
            return false;
        }
        candidates.all(|node| self.should_skip_node(system, node))
    }

    /// Greylist the identity now and queue it for persistence
    pub fn record_failure(&self, system_name: &str, identity: &ConnectionIdentity) {
        let hash = self.hash(identity);
        self.greylist.insert(hash.clone(), Instant::now());

        let mut pending = self.pending.lock();
        if pending.iter().all(|p| p.hash != hash) {
            pending.push(PendingFailure {
                hash: hash.clone(),
                entry: ErrorLogEntry {
                    system_name: system_name.to_string(),
                    masked_connection: identity.masked(),
                },
            });
        }
        drop(pending);

        warn!(
            system = %system_name,
            connection = %identity,
            hash = %short(&hash),
            "⛔ Connection failure recorded in ledger"
        );
    }

    /// Merge a persisted blacklist file; returns the number of hashes loaded
    pub async fn load_persisted(&self, path: &Path) -> Result<usize> {
        let hashes = persistence::load_blacklist(path).await?;
        let loaded = hashes.len();
        for hash in hashes {
            self.blacklist.insert(hash);
        }
        if loaded > 0 {
            info!(path = %path.display(), entries = loaded, "📋 Blacklist loaded");
        }
        Ok(loaded)
    }

    /// Write every queued failure to the configured files; returns new blacklist lines
    pub async fn persist(&self) -> Result<usize> {
        let drained: Vec<PendingFailure> = std::mem::take(&mut *self.pending.lock());
        if drained.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let hashes: Vec<String> = drained.iter().map(|p| p.hash.clone()).collect();
        let entries: Vec<ErrorLogEntry> = drained.iter().map(|p| p.entry.clone()).collect();

        let outcome = async {
            let written = persistence::append_blacklist(&self.blacklist_path, &hashes).await?;
            let logged = persistence::append_error_log(&self.error_log_path, &entries).await?;
            Ok::<_, crate::error::CollectorError>((written, logged))
        }
        .await;

        match outcome {
            Ok((written, logged)) => {
                info!(
                    blacklist = %self.blacklist_path.display(),
                    written,
                    logged,
                    "💾 Failure ledger persisted"
                );
                Ok(written)
            }
            Err(e) => {
                // Keep the entries for the next attempt
                self.pending.lock().extend(drained);
                Err(e)
            }
        }
    }

    /// Forget every in-memory entry; persisted files are left untouched
    pub fn clear(&self) {
        self.greylist.clear();
        self.blacklist.clear();
        self.pending.lock().clear();
        info!("🧹 Failure ledger cleared");
    }

    pub fn greylist_len(&self) -> usize {
        self.greylist.len()
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn blacklist_path(&self) -> &Path {
        &self.blacklist_path
    }

    pub fn error_log_path(&self) -> &Path {
        &self.error_log_path
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineType;

    fn config(dir: &Path) -> LedgerConfig {
        LedgerConfig {
            blacklist_path: dir.join("blacklist.txt"),
            error_log_path: dir.join("errors.txt"),
            ..LedgerConfig::default()
        }
    }

    fn system() -> SystemConfig {
        SystemConfig::new("s1", EngineType::MySql)
            .with_port(3306)
            .with_node(Node::new("10.0.0.1").with_service("app"))
            .with_node(Node::new("10.0.0.2").with_service("app"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_greylist_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(&config(dir.path()));
        let identity = ConnectionIdentity::new(EngineType::MySql, "mysql://h:3306/app");

        ledger.record_failure("s1", &identity);
        assert!(ledger.should_skip(&identity));

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert!(ledger.should_skip(&identity));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!ledger.should_skip(&identity));
        assert_eq!(ledger.greylist_len(), 0);
    }

    #[tokio::test]
    async fn test_system_skipped_only_when_every_node_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(&config(dir.path()));
        let system = system();

        let first = ConnectionIdentity::for_node(&system, &system.nodes[0]).unwrap();
        ledger.record_failure("s1", &first);
        assert!(ledger.should_skip_node(&system, &system.nodes[0]));
        assert!(!ledger.should_skip_node(&system, &system.nodes[1]));
        assert!(!ledger.should_skip_system(&system));

        let second = ConnectionIdentity::for_node(&system, &system.nodes[1]).unwrap();
        ledger.record_failure("s1", &second);
        assert!(ledger.should_skip_system(&system));
    }

    #[tokio::test]
    async fn test_system_without_nodes_is_not_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(&config(dir.path()));
        assert!(!ledger.should_skip_system(&SystemConfig::new("empty", EngineType::Oracle)));
    }

    #[tokio::test]
    async fn test_persist_then_reopen_blacklists() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ledger = FailureLedger::new(&cfg);
        let identity = ConnectionIdentity::new(EngineType::PostgreSql, "postgresql://10.1.1.1:5432/postgres");

        ledger.record_failure("pg", &identity);
        ledger.record_failure("pg", &identity);
        assert_eq!(ledger.pending_len(), 1);
        assert_eq!(ledger.persist().await.unwrap(), 1);
        assert_eq!(ledger.pending_len(), 0);

        let reopened = FailureLedger::open(&cfg).await.unwrap();
        assert_eq!(reopened.blacklist_len(), 1);
        assert!(reopened.should_skip(&identity));

        let log = tokio::fs::read_to_string(&cfg.error_log_path).await.unwrap();
        assert!(log.contains("|pg|postgresql://***.***.1.1:5432/postgres"));

        reopened.clear();
        assert!(!reopened.should_skip(&identity));
    }
}
