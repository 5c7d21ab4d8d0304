//! Service configuration.

use crate::error::{VaultError, VaultResult};
use repping_crypto::KdfParams;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scopes the application provisions right after unlock.
pub const DEFAULT_SCOPES: &[&str] = &[
    "table:accounts",
    "table:contacts",
    "table:products",
    "table:profiles",
    "table:notes",
    "table:conversations",
    "table:messages",
    "table:proposals",
];

/// Configuration for [`CryptoService`](crate::CryptoService).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Stable account identifier. Binds the KDF salt and keys the registry.
    pub account_id: String,

    /// Argon2id cost parameters for the master key.
    pub kdf: KdfParams,

    /// Scopes provisioned by `prewarm_defaults`.
    pub default_scopes: Vec<String>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            kdf: KdfParams::default(),
            default_scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CryptoConfig {
    /// Default configuration for one account.
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Overrides the KDF cost.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Parses a JSON configuration document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> VaultResult<Self> {
        serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Rejects configurations that cannot work and warns on weak KDF cost.
    pub fn validate(&self) -> VaultResult<()> {
        if self.account_id.trim().is_empty() {
            return Err(VaultError::Config("account_id must not be empty".into()));
        }
        if self.kdf.iterations == 0 {
            return Err(VaultError::Config("kdf.iterations must be at least 1".into()));
        }
        if self.kdf.parallelism == 0 {
            return Err(VaultError::Config("kdf.parallelism must be at least 1".into()));
        }
        // Argon2 requires 8 KiB of memory per lane.
        let min_memory = self.kdf.parallelism.saturating_mul(8);
        if self.kdf.memory_kib < min_memory {
            return Err(VaultError::Config(format!(
                "kdf.memory_kib {} is below the Argon2 minimum {min_memory}",
                self.kdf.memory_kib
            )));
        }
        if self.default_scopes.iter().any(|s| s.is_empty()) {
            return Err(VaultError::Config("default_scopes contains an empty scope".into()));
        }

        let recommended = KdfParams::default();
        if self.kdf.memory_kib < recommended.memory_kib {
            warn!(
                memory_kib = self.kdf.memory_kib,
                recommended = recommended.memory_kib,
                "argon2 memory below recommended production value"
            );
        }
        if self.kdf.iterations < recommended.iterations {
            warn!(
                iterations = self.kdf.iterations,
                recommended = recommended.iterations,
                "argon2 iterations below recommended production value"
            );
        }

        Ok(())
    }
}
