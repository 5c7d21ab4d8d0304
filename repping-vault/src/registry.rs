//! Key registry: the service's only view of the remote record store.
//!
//! The registry holds two kinds of public, non-secret records per account:
//! the unlock verifier (a canary ciphertext under the master key) and one
//! marker per provisioned scope. Neither reveals key material.
//!
//! `InMemoryKeyRegistry` is the default for tests and single-process use.
//! Deployments implement [`KeyRegistry`] over their backing table.

use crate::error::RegistryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repping_crypto::EncryptedData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Announces that a scope has been provisioned for an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMarker {
    pub scope: String,
    /// Fingerprint of the scope keys that first provisioned the scope.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl ScopeMarker {
    pub fn new(scope: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            fingerprint: fingerprint.into(),
            created_at: Utc::now(),
        }
    }
}

/// Storage seam for unlock verifiers and scope markers.
///
/// Writes are first-write-wins: a write that finds an existing value keeps
/// it and returns it, so concurrent writers from several sessions converge.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Loads the account's unlock verifier, if one was ever stored.
    async fn load_verifier(&self, account_id: &str) -> RegistryResult<Option<EncryptedData>>;

    /// Stores the verifier unless one exists. Returns the stored verifier.
    async fn store_verifier(
        &self,
        account_id: &str,
        verifier: &EncryptedData,
    ) -> RegistryResult<EncryptedData>;

    /// Loads the marker for `scope`, if it was ever provisioned.
    async fn scope_marker(
        &self,
        account_id: &str,
        scope: &str,
    ) -> RegistryResult<Option<ScopeMarker>>;

    /// Registers the marker unless one exists. Returns the stored marker.
    async fn register_scope(
        &self,
        account_id: &str,
        marker: &ScopeMarker,
    ) -> RegistryResult<ScopeMarker>;
}

#[derive(Default)]
struct AccountEntry {
    verifier: Option<EncryptedData>,
    scopes: HashMap<String, ScopeMarker>,
}

/// Process-local registry. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryKeyRegistry {
    accounts: Arc<RwLock<HashMap<String, AccountEntry>>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes registered for an account.
    pub async fn scope_count(&self, account_id: &str) -> usize {
        self.accounts
            .read()
            .await
            .get(account_id)
            .map_or(0, |entry| entry.scopes.len())
    }

    /// Whether a verifier exists for an account.
    pub async fn has_verifier(&self, account_id: &str) -> bool {
        self.accounts
            .read()
            .await
            .get(account_id)
            .is_some_and(|entry| entry.verifier.is_some())
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn load_verifier(&self, account_id: &str) -> RegistryResult<Option<EncryptedData>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .and_then(|entry| entry.verifier.clone()))
    }

    async fn store_verifier(
        &self,
        account_id: &str,
        verifier: &EncryptedData,
    ) -> RegistryResult<EncryptedData> {
        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(account_id.to_string()).or_default();
        Ok(entry.verifier.get_or_insert_with(|| verifier.clone()).clone())
    }

    async fn scope_marker(
        &self,
        account_id: &str,
        scope: &str,
    ) -> RegistryResult<Option<ScopeMarker>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .and_then(|entry| entry.scopes.get(scope).cloned()))
    }

    async fn register_scope(
        &self,
        account_id: &str,
        marker: &ScopeMarker,
    ) -> RegistryResult<ScopeMarker> {
        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(account_id.to_string()).or_default();
        Ok(entry
            .scopes
            .entry(marker.scope.clone())
            .or_insert_with(|| marker.clone())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repping_crypto::{encrypt, generate_random_key};

    #[tokio::test]
    async fn verifier_first_write_wins() {
        let registry = InMemoryKeyRegistry::new();
        let key = generate_random_key();
        let first = encrypt(&key, b"one").unwrap();
        let second = encrypt(&key, b"two").unwrap();

        assert_eq!(registry.store_verifier("acct", &first).await.unwrap(), first);
        assert_eq!(registry.store_verifier("acct", &second).await.unwrap(), first);
        assert_eq!(registry.load_verifier("acct").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn scope_marker_first_write_wins() {
        let registry = InMemoryKeyRegistry::new();
        let a = ScopeMarker::new("table:accounts", "aaaa");
        let b = ScopeMarker::new("table:accounts", "bbbb");

        registry.register_scope("acct", &a).await.unwrap();
        let stored = registry.register_scope("acct", &b).await.unwrap();
        assert_eq!(stored.fingerprint, "aaaa");
        assert_eq!(registry.scope_count("acct").await, 1);
    }

    #[tokio::test]
    async fn accounts_are_isolated() {
        let registry = InMemoryKeyRegistry::new();
        registry
            .register_scope("acct-1", &ScopeMarker::new("table:accounts", "aaaa"))
            .await
            .unwrap();

        assert!(registry
            .scope_marker("acct-2", "table:accounts")
            .await
            .unwrap()
            .is_none());
        assert!(!registry.has_verifier("acct-1").await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let registry = InMemoryKeyRegistry::new();
        let clone = registry.clone();
        registry
            .register_scope("acct", &ScopeMarker::new("table:notes", "cccc"))
            .await
            .unwrap();
        assert_eq!(clone.scope_count("acct").await, 1);
    }
}
