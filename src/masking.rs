//! # Data Masking
//!
//! Partial redaction of endpoint details before they leave the engine. Results, log lines
//! and the operator error log only ever carry masked hosts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,3}\.){2}(\d{1,3}\.\d{1,3})\b").expect("static IPv4 pattern")
    })
}

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(user|username|password)=([^&;]*)").expect("static credential pattern")
    })
}

/// Returns true for a dotted quad with every octet in 0..=255
pub fn is_ipv4(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.len() <= 3
                && p.chars().all(|c| c.is_ascii_digit())
                && p.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// `10.1.2.3` becomes `***.***.2.3`; anything that is not an IPv4 address is returned unchanged
pub fn mask_ip_address(ip: &str) -> String {
    let trimmed = ip.trim();
    if !is_ipv4(trimmed) {
        return ip.to_string();
    }
    let parts: Vec<&str> = trimmed.split('.').collect();
    format!("***.***.{}.{}", parts[2], parts[3])
}

/// `db01.corp.example.com` becomes `***.***.com`; `db01` becomes `db**`
pub fn mask_hostname(hostname: &str) -> String {
    let trimmed = hostname.trim();
    if trimmed.contains('.') {
        let tld = trimmed.rsplit('.').next().unwrap_or_default();
        return format!("***.***.{tld}");
    }
    let len = trimmed.chars().count();
    if len <= 2 {
        return "*".repeat(len);
    }
    let prefix: String = trimmed.chars().take(2).collect();
    format!("{prefix}{}", "*".repeat(len - 2))
}

/// Dispatch to IP or hostname masking
pub fn mask_host(host: &str) -> String {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else if is_ipv4(trimmed) {
        mask_ip_address(trimmed)
    } else {
        mask_hostname(trimmed)
    }
}

/// Redact credentials and IPv4 addresses embedded in a connection string
pub fn mask_connection_string(connection_string: &str) -> String {
    let without_credentials = credential_pattern().replace_all(connection_string, "$1=***");
    ipv4_pattern()
        .replace_all(&without_credentials, "***.***.$1")
        .into_owned()
}

/// Keep the first three characters of a database name
pub fn mask_database_name(name: &str) -> String {
    let len = name.chars().count();
    if len <= 3 {
        return name.to_string();
    }
    let prefix: String = name.chars().take(3).collect();
    format!("{prefix}***")
}

/// A host identifier that has been masked.
///
/// The only way to build one is from a raw host, so a `MaskedHost` can never carry an
/// unmasked address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskedHost(String);

impl MaskedHost {
    pub fn from_host(host: &str) -> Self {
        Self(mask_host(host))
    }

    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaskedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
