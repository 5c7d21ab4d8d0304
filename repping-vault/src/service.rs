//! The session-scoped encryption service.
//!
//! A `CryptoService` is locked until `unlock` derives the master key from the
//! passphrase. Scope keys are derived lazily from the master key, provisioned
//! once against the [`KeyRegistry`], and cached until `lock`.

use crate::config::CryptoConfig;
use crate::error::{FieldError, VaultError, VaultResult};
use crate::record::{DecryptedFields, EncryptedFields, EncryptedRecord, StoredField};
use crate::registry::{KeyRegistry, ScopeMarker};
use repping_crypto::{
    decrypt_with_aad, derive_key, encrypt_with_aad, BlindIndex, DerivedKey, RecordAad, Salt,
    ScopeKeys,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Canary sealed under the master key and kept in the registry.
/// Decrypting it proves a passphrase derives the account's established key.
const VERIFIER_PLAINTEXT: &[u8] = b"repping-unlock-verifier-v1";

type ScopeCell = Arc<OnceCell<Arc<ScopeKeys>>>;

/// Source of session ids. A key obtained under one session is never
/// handed out once that session is locked or replaced.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct Session {
    id: u64,
    master: DerivedKey,
    scopes: HashMap<String, ScopeCell>,
}

impl Session {
    fn new(master: DerivedKey) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            master,
            scopes: HashMap::new(),
        }
    }
}

/// Field encryption, decryption and blind indexing for one account.
///
/// Clones share the same session, so one unlock serves every task holding
/// a clone.
#[derive(Clone)]
pub struct CryptoService {
    config: Arc<CryptoConfig>,
    registry: Arc<dyn KeyRegistry>,
    state: Arc<RwLock<Option<Session>>>,
}

impl fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoService")
            .field("account_id", &self.config.account_id)
            .finish_non_exhaustive()
    }
}

impl CryptoService {
    /// Creates a locked service. Fails if the configuration is invalid.
    pub fn new(config: CryptoConfig, registry: Arc<dyn KeyRegistry>) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            registry,
            state: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    pub fn account_id(&self) -> &str {
        &self.config.account_id
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Derives the master key and checks it against the account's verifier.
    ///
    /// The first successful unlock of an account enrolls the verifier.
    /// Unlocking again with the same passphrase keeps the session and its
    /// scope cache. A rejected passphrase leaves the current state as it was.
    pub async fn unlock(&self, passphrase: &str) -> VaultResult<()> {
        if is_blank(passphrase) {
            return Err(VaultError::Authentication("passphrase must not be empty".into()));
        }

        let master = self.derive_master(passphrase).await?;

        if self.holds_master(&master).await {
            debug!(account_id = %self.config.account_id, "already unlocked with this passphrase");
            return Ok(());
        }

        self.verify_or_enroll(&master).await?;

        let mut state = self.state.write().await;
        if let Some(session) = state.as_ref() {
            if session.master.ct_eq(&master) {
                return Ok(());
            }
        }
        *state = Some(Session::new(master));
        info!(account_id = %self.config.account_id, "crypto service unlocked");
        Ok(())
    }

    /// Drops the master key and every cached scope key. Idempotent.
    pub async fn lock(&self) {
        if self.state.write().await.take().is_some() {
            info!(account_id = %self.config.account_id, "crypto service locked");
        }
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn derive_master(&self, passphrase: &str) -> VaultResult<DerivedKey> {
        let passphrase = Zeroizing::new(passphrase.to_string());
        let salt = Salt::for_account(&self.config.account_id);
        let params = self.config.kdf.clone();

        tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt, &params))
            .await
            .map_err(|e| VaultError::Authentication(format!("key derivation task failed: {e}")))?
            .map_err(|e| VaultError::Authentication(e.to_string()))
    }

    async fn holds_master(&self, master: &DerivedKey) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|session| session.master.ct_eq(master))
    }

    async fn verify_or_enroll(&self, master: &DerivedKey) -> VaultResult<()> {
        let account_id = self.config.account_id.as_str();

        let verifier = match self.registry.load_verifier(account_id).await? {
            Some(verifier) => verifier,
            None => {
                let fresh = encrypt_with_aad(master, VERIFIER_PLAINTEXT, account_id.as_bytes())
                    .map_err(|e| VaultError::Encryption(e.to_string()))?;
                let stored = self.registry.store_verifier(account_id, &fresh).await?;
                if stored == fresh {
                    info!(account_id, "enrolled unlock verifier");
                }
                stored
            }
        };

        match decrypt_with_aad(master, &verifier, account_id.as_bytes()) {
            Ok(plaintext) if plaintext == VERIFIER_PLAINTEXT => Ok(()),
            _ => {
                warn!(account_id, "unlock rejected: passphrase does not match account");
                Err(VaultError::Authentication("wrong passphrase".into()))
            }
        }
    }

    async fn ensure_unlocked(&self) -> VaultResult<()> {
        if self.state.read().await.is_none() {
            return Err(VaultError::NotUnlocked);
        }
        Ok(())
    }

    // ========================================================================
    // Scope keys
    // ========================================================================

    /// Returns the keys for `scope`, provisioning it on first use.
    ///
    /// Concurrent first calls for one scope share a single provisioning
    /// round trip. A failed attempt is not cached. If the service is locked
    /// (or re-unlocked) while provisioning is in flight, the call fails with
    /// [`VaultError::NotUnlocked`] instead of returning the stale keys.
    pub async fn get_or_create_scope_keys(&self, scope: &str) -> VaultResult<Arc<ScopeKeys>> {
        {
            let state = self.state.read().await;
            let session = state.as_ref().ok_or(VaultError::NotUnlocked)?;
            if let Some(keys) = session.scopes.get(scope).and_then(|cell| cell.get()) {
                return Ok(Arc::clone(keys));
            }
        }

        if is_blank(scope) {
            return Err(VaultError::Provisioning("scope name must not be empty".into()));
        }

        let (cell, master, session_id) = {
            let mut state = self.state.write().await;
            let session = state.as_mut().ok_or(VaultError::NotUnlocked)?;
            let cell = Arc::clone(session.scopes.entry(scope.to_string()).or_default());
            (cell, session.master.clone(), session.id)
        };

        let keys = cell
            .get_or_try_init(|| self.provision_scope(&master, scope))
            .await?;
        let keys = Arc::clone(keys);

        let current = self.state.read().await.as_ref().map(|session| session.id);
        if current != Some(session_id) {
            debug!(scope, "session ended while provisioning; discarding scope keys");
            return Err(VaultError::NotUnlocked);
        }
        Ok(keys)
    }

    async fn provision_scope(
        &self,
        master: &DerivedKey,
        scope: &str,
    ) -> VaultResult<Arc<ScopeKeys>> {
        let account_id = self.config.account_id.as_str();
        let keys = ScopeKeys::derive(master, scope)
            .map_err(|e| VaultError::Provisioning(e.to_string()))?;

        let marker = match self.registry.scope_marker(account_id, scope).await? {
            Some(marker) => marker,
            None => {
                let marker = ScopeMarker::new(scope, keys.fingerprint());
                let stored = self.registry.register_scope(account_id, &marker).await?;
                debug!(scope, fingerprint = %stored.fingerprint, "registered scope marker");
                stored
            }
        };

        if marker.fingerprint != keys.fingerprint() {
            warn!(
                scope,
                expected = %marker.fingerprint,
                derived = %keys.fingerprint(),
                "scope fingerprint mismatch"
            );
            return Err(VaultError::Provisioning(format!(
                "scope {scope} was provisioned under a different master key"
            )));
        }

        debug!(scope, "scope keys ready");
        Ok(Arc::new(keys))
    }

    /// Provisions each scope in order, stopping at the first failure.
    pub async fn prewarm<S: AsRef<str>>(&self, scopes: &[S]) -> VaultResult<()> {
        for scope in scopes {
            self.get_or_create_scope_keys(scope.as_ref()).await?;
        }
        debug!(count = scopes.len(), "prewarmed scopes");
        Ok(())
    }

    /// Provisions the configured default scopes.
    pub async fn prewarm_defaults(&self) -> VaultResult<()> {
        self.prewarm(self.config.default_scopes.as_slice()).await
    }

    // ========================================================================
    // Field operations
    // ========================================================================

    /// Seals every field under the scope key, bound to `(record_type, record_id)`.
    ///
    /// All-or-nothing: any failure returns an error and no partial output.
    /// Bad arguments or a sealing failure give [`VaultError::Encryption`]; a
    /// scope key that cannot be provisioned gives the retriable
    /// [`VaultError::Provisioning`].
    pub async fn encrypt_fields(
        &self,
        scope: &str,
        record_type: &str,
        record_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> VaultResult<EncryptedFields> {
        self.ensure_unlocked().await?;
        check_record_args(record_type, record_id).map_err(VaultError::Encryption)?;
        if fields.is_empty() {
            return Err(VaultError::Encryption("no fields to encrypt".into()));
        }
        if fields.keys().any(|name| is_blank(name)) {
            return Err(VaultError::Encryption("field name must not be empty".into()));
        }

        let keys = self.get_or_create_scope_keys(scope).await?;
        let aad = RecordAad::new(record_type, record_id);

        let sealed = fields
            .iter()
            .map(|(name, value)| {
                encrypt_with_aad(keys.encryption(), value.as_bytes(), aad.as_bytes())
                    .map(|data| (name.clone(), data))
                    .map_err(|e| VaultError::Encryption(format!("field {name}: {e}")))
            })
            .collect::<VaultResult<BTreeMap<_, _>>>()?;

        debug!(scope, record_type, record_id, fields = sealed.len(), "encrypted fields");
        Ok(EncryptedFields::new(sealed))
    }

    /// Encrypts `fields` and attaches blind indexes for the `indexed` names.
    pub async fn encrypt_record(
        &self,
        scope: &str,
        record_type: &str,
        record_id: &str,
        fields: &BTreeMap<String, String>,
        indexed: &[&str],
    ) -> VaultResult<EncryptedFields> {
        self.ensure_unlocked().await?;
        if let Some(missing) = indexed.iter().find(|name| !fields.contains_key(**name)) {
            return Err(VaultError::Encryption(format!(
                "indexed field {missing} is not among the fields to encrypt"
            )));
        }

        let mut encrypted = self
            .encrypt_fields(scope, record_type, record_id, fields)
            .await?;

        let keys = self.get_or_create_scope_keys(scope).await?;
        for &name in indexed {
            if let Some(value) = fields.get(name) {
                let index =
                    repping_crypto::compute_blind_index(keys.blind_index(), value.as_bytes())
                        .map_err(|e| {
                            VaultError::Encryption(format!("blind index {name}: {e}"))
                        })?;
                encrypted.attach_blind_index(name.to_string(), index);
            }
        }
        Ok(encrypted)
    }

    /// Best-effort decryption of the requested fields of one record.
    ///
    /// Fields absent from `record` are skipped. Fields that fail are
    /// reported in [`DecryptedFields::failures`] and logged; the rest
    /// decrypt normally.
    pub async fn decrypt_fields(
        &self,
        scope: &str,
        record_type: &str,
        record_id: &str,
        record: &EncryptedRecord,
        field_names: &[&str],
    ) -> VaultResult<DecryptedFields> {
        self.ensure_unlocked().await?;
        check_record_args(record_type, record_id).map_err(VaultError::Decryption)?;

        let keys = self.get_or_create_scope_keys(scope).await?;
        let aad = RecordAad::new(record_type, record_id);

        let mut out = DecryptedFields::default();
        for &name in field_names {
            let Some(stored) = record.get(name) else {
                continue;
            };
            match open_field(keys.encryption(), stored, &aad) {
                Ok(value) => {
                    out.values.insert(name.to_string(), value);
                }
                Err(err) => {
                    warn!(
                        scope,
                        record_type,
                        record_id,
                        field = name,
                        error = %err,
                        "field decryption failed"
                    );
                    out.failures.insert(name.to_string(), err);
                }
            }
        }
        Ok(out)
    }

    /// Deterministic keyed hash of `plaintext` for equality search in `scope`.
    pub async fn compute_blind_index(
        &self,
        scope: &str,
        plaintext: &str,
    ) -> VaultResult<BlindIndex> {
        self.ensure_unlocked().await?;
        let keys = self.get_or_create_scope_keys(scope).await?;
        repping_crypto::compute_blind_index(keys.blind_index(), plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))
    }
}

/// Passphrases, scopes, record types, record ids and field names share one
/// rule: empty or whitespace-only values are rejected.
pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn check_record_args(record_type: &str, record_id: &str) -> Result<(), String> {
    if is_blank(record_type) {
        return Err("record type must not be empty".into());
    }
    if is_blank(record_id) {
        return Err("record id must not be empty".into());
    }
    Ok(())
}

fn open_field(
    key: &DerivedKey,
    stored: &StoredField,
    aad: &RecordAad,
) -> Result<String, FieldError> {
    let sealed = match stored {
        StoredField::Sealed(sealed) => sealed,
        StoredField::Malformed(reason) => return Err(FieldError::Malformed(reason.clone())),
    };
    let bytes =
        decrypt_with_aad(key, sealed, aad.as_bytes()).map_err(|_| FieldError::Authentication)?;
    String::from_utf8(bytes).map_err(|_| FieldError::InvalidUtf8)
}
