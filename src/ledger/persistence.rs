//! Line-oriented files backing the failure ledger.
//!
//! Both files are append-only. Existing content is read before every append so that a
//! line already present is never written twice.

use chrono::Local;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;

/// One human-readable error log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub system_name: String,
    pub masked_connection: String,
}

impl ErrorLogEntry {
    /// The de-duplication key: everything after the timestamp
    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.system_name, self.masked_connection)
    }
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// True when the file has content whose last line is not terminated
async fn missing_final_newline(path: &Path) -> Result<bool> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes.last().is_some_and(|b| *b != b'\n')),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut buffer = String::new();
    if missing_final_newline(path).await? {
        buffer.push('\n');
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Hashes stored in a blacklist file; blank lines and `#` comments are skipped
pub async fn load_blacklist(path: &Path) -> Result<HashSet<String>> {
    let entries: HashSet<String> = read_lines(path)
        .await?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    debug!(path = %path.display(), entries = entries.len(), "Loaded blacklist file");
    Ok(entries)
}

/// Append hashes not already in the file; returns how many were written
pub async fn append_blacklist(path: &Path, hashes: &[String]) -> Result<usize> {
    let mut seen = load_blacklist(path).await?;
    let fresh: Vec<String> = hashes
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect();
    append_lines(path, &fresh).await?;
    Ok(fresh.len())
}

/// Append `timestamp|system|masked` lines not already logged; returns how many were written
pub async fn append_error_log(path: &Path, entries: &[ErrorLogEntry]) -> Result<usize> {
    let mut seen: HashSet<String> = read_lines(path)
        .await?
        .into_iter()
        .filter_map(|line| line.split_once('|').map(|(_, rest)| rest.trim().to_string()))
        .collect();

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let fresh: Vec<String> = entries
        .iter()
        .filter(|entry| seen.insert(entry.dedup_key()))
        .map(|entry| format!("{timestamp}|{}", entry.dedup_key()))
        .collect();
    append_lines(path, &fresh).await?;
    Ok(fresh.len())
}
