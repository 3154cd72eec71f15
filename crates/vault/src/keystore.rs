//! Device-bound master key management.
//!
//! The master key is 32 random bytes, hex-encoded into the platform key store
//! (OS keychain) under a single entry. It never touches the key-value store or
//! an exported file. Deleting the entry crypto-shreds every `aes-v1` record.
//!
//! When the key store cannot be used, [`KeyManager`] can degrade to a constant
//! fallback key. That path is logged, counted and visible through
//! [`MasterKey::is_fallback`] and [`KeyStatus::InsecureFallback`].

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock as StdRwLock},
};

use {
    rand::RngCore,
    sha2::{Digest, Sha256},
    tokio::sync::RwLock,
    zeroize::Zeroizing,
};

use crate::error::VaultError;

/// Length of the master key in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Default key-store entry holding the master key.
pub const DEFAULT_KEY_ENTRY: &str = "solace_master_key";

/// Constant used when the key store is unavailable. Not a secret.
const FALLBACK_KEY_MATERIAL: &str = "fallback-key-for-encryption-12345678901234567890123456789012";

/// The device master key.
pub struct MasterKey {
    bytes: Zeroizing<[u8; MASTER_KEY_LEN]>,
    /// Representation kept in the key store; the legacy XOR scheme keys off it.
    encoded: Zeroizing<String>,
    fallback: bool,
}

impl MasterKey {
    /// Generate a fresh key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        rand::rng().fill_bytes(bytes.as_mut());
        let encoded = Zeroizing::new(hex::encode(bytes.as_slice()));
        Self {
            bytes,
            encoded,
            fallback: false,
        }
    }

    /// Rebuild a key from its stored hex encoding.
    pub fn from_encoded(encoded: &str) -> Result<Self, VaultError> {
        let decoded = Zeroizing::new(hex::decode(encoded.trim())?);
        if decoded.len() != MASTER_KEY_LEN {
            return Err(VaultError::KeyStoreUnavailable(format!(
                "stored master key has wrong length: {} (expected {MASTER_KEY_LEN})",
                decoded.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        Ok(Self {
            bytes,
            encoded: Zeroizing::new(encoded.trim().to_string()),
            fallback: false,
        })
    }

    fn insecure_fallback() -> Self {
        let digest = Sha256::digest(FALLBACK_KEY_MATERIAL.as_bytes());
        let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        bytes.copy_from_slice(&digest);
        Self {
            bytes,
            encoded: Zeroizing::new(FALLBACK_KEY_MATERIAL.to_string()),
            fallback: true,
        }
    }

    pub fn bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Whether this is the constant key used while the key store is down.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Platform-protected secret storage.
pub trait KeyStore: Send + Sync {
    /// Read the secret stored under `id`, `None` when absent.
    fn load(&self, id: &str) -> Result<Option<String>, VaultError>;
    fn store(&self, id: &str, secret: &str) -> Result<(), VaultError>;
    /// Remove `id`. Removing a missing entry succeeds.
    fn delete(&self, id: &str) -> Result<(), VaultError>;
}

// ── OS keychain ─────────────────────────────────────────────────────────────

/// Key store backed by the OS keychain through the `keyring` crate.
#[cfg(feature = "keyring")]
pub struct KeyringStore {
    service: String,
}

#[cfg(feature = "keyring")]
impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, id: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(&self.service, id)
            .map_err(|e| VaultError::KeyStoreUnavailable(format!("keyring init: {e}")))
    }
}

#[cfg(feature = "keyring")]
impl KeyStore for KeyringStore {
    fn load(&self, id: &str) -> Result<Option<String>, VaultError> {
        match self.entry(id)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!("load {id}: {e}"))),
        }
    }

    fn store(&self, id: &str, secret: &str) -> Result<(), VaultError> {
        self.entry(id)?
            .set_password(secret)
            .map_err(|e| VaultError::KeyStoreUnavailable(format!("store {id}: {e}")))
    }

    fn delete(&self, id: &str) -> Result<(), VaultError> {
        match self.entry(id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!("delete {id}: {e}"))),
        }
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Process-local key store, for tests and headless environments.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: StdRwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, id: &str) -> Result<Option<String>, VaultError> {
        let guard = self
            .entries
            .read()
            .map_err(|_| VaultError::KeyStoreUnavailable("lock poisoned".into()))?;
        Ok(guard.get(id).cloned())
    }

    fn store(&self, id: &str, secret: &str) -> Result<(), VaultError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| VaultError::KeyStoreUnavailable("lock poisoned".into()))?;
        guard.insert(id.to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), VaultError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| VaultError::KeyStoreUnavailable("lock poisoned".into()))?;
        guard.remove(id);
        Ok(())
    }
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn load(&self, id: &str) -> Result<Option<String>, VaultError> {
        (**self).load(id)
    }

    fn store(&self, id: &str, secret: &str) -> Result<(), VaultError> {
        (**self).store(id, secret)
    }

    fn delete(&self, id: &str) -> Result<(), VaultError> {
        (**self).delete(id)
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// Master key state exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// No key has been loaded in this process yet.
    NotLoaded,
    /// Key loaded from (or created in) the platform key store.
    Secure,
    /// Key store failed; records are protected by the constant fallback key.
    InsecureFallback,
}

/// Loads, creates and deletes the master key.
///
/// The loaded key is cached behind a `RwLock`; `None` means not yet loaded.
pub struct KeyManager<K: KeyStore> {
    store: K,
    entry: String,
    allow_insecure_fallback: bool,
    cached: RwLock<Option<Arc<MasterKey>>>,
}

impl<K: KeyStore> KeyManager<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            entry: DEFAULT_KEY_ENTRY.to_string(),
            allow_insecure_fallback: true,
            cached: RwLock::new(None),
        }
    }

    /// Use a different key-store entry name.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Allow or forbid the constant fallback key.
    #[must_use]
    pub fn with_insecure_fallback(mut self, allow: bool) -> Self {
        self.allow_insecure_fallback = allow;
        self
    }

    /// Return the master key, creating and persisting it on first use.
    ///
    /// Repeated calls return the same key until [`delete_master_key`](Self::delete_master_key).
    pub async fn get_or_create_master_key(&self) -> Result<Arc<MasterKey>, VaultError> {
        if let Some(key) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(key));
        }

        let mut guard = self.cached.write().await;
        if let Some(key) = guard.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = match self.load_or_create() {
            Ok(key) => key,
            Err(VaultError::KeyStoreUnavailable(reason)) if self.allow_insecure_fallback => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    %reason,
                    "secure key store unavailable, using INSECURE fallback master key"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = reason;
                #[cfg(feature = "metrics")]
                solace_metrics::counter!(solace_metrics::keystore::FALLBACK_TOTAL).increment(1);
                MasterKey::insecure_fallback()
            },
            Err(e) => return Err(e),
        };

        let key = Arc::new(key);
        *guard = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Delete the master key from the key store and drop the cached copy.
    pub async fn delete_master_key(&self) -> Result<(), VaultError> {
        *self.cached.write().await = None;
        self.store.delete(&self.entry)?;

        #[cfg(feature = "tracing")]
        tracing::info!("master key deleted");
        #[cfg(feature = "metrics")]
        solace_metrics::counter!(solace_metrics::keystore::KEYS_DELETED_TOTAL).increment(1);

        Ok(())
    }

    pub async fn status(&self) -> KeyStatus {
        match self.cached.read().await.as_ref() {
            None => KeyStatus::NotLoaded,
            Some(key) if key.is_fallback() => KeyStatus::InsecureFallback,
            Some(_) => KeyStatus::Secure,
        }
    }

    fn load_or_create(&self) -> Result<MasterKey, VaultError> {
        if let Some(encoded) = self.store.load(&self.entry)? {
            return MasterKey::from_encoded(&encoded).map_err(|e| match e {
                VaultError::KeyStoreUnavailable(_) => e,
                other => VaultError::KeyStoreUnavailable(format!("stored master key: {other}")),
            });
        }

        let key = MasterKey::generate();
        self.store.store(&self.entry, key.encoded())?;

        #[cfg(feature = "tracing")]
        tracing::info!(entry = %self.entry, "master key created");
        #[cfg(feature = "metrics")]
        solace_metrics::counter!(solace_metrics::keystore::KEYS_CREATED_TOTAL).increment(1);

        Ok(key)
    }
}
