use sha2::{Digest, Sha256};

use crate::config::DEFAULT_LEDGER_HASH_KEY;
use crate::database::ConnectionIdentity;

/// Keyed one-way hash of connection identities.
///
/// The output depends only on the key and the identity, so a hash written by one run
/// matches the same endpoint in every later run that uses the same key.
#[derive(Clone)]
pub struct IdentityHasher {
    key: String,
}

impl IdentityHasher {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Lowercase hex SHA-256 of `key || engine|connection_string`
    pub fn hash(&self, identity: &ConnectionIdentity) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(identity.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_HASH_KEY)
    }
}

impl std::fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHasher").finish_non_exhaustive()
    }
}
