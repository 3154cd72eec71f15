//! Encryption at rest and password-protected backups for the local journal.
//!
//! Records are encrypted under a device master key held in the OS keychain
//! and tagged with their format so legacy values can be read and upgraded.
//! Backups are sealed with a password-derived key pair (PBKDF2, AES-256-CTR,
//! HMAC-SHA256) and verified before anything is restored.
//! [`DataProtection`] ties the pieces together for callers.

pub mod aes_cbc;
pub mod backup;
pub mod error;
pub mod kdf;
pub mod keystore;
pub mod legacy_xor;
pub mod record;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod traits;

#[cfg(feature = "keyring")]
pub use keystore::KeyringStore;
pub use {
    aes_cbc::AesCbcCipher,
    backup::{BackupCodec, BackupFile, EncryptedBackup},
    error::VaultError,
    keystore::{KeyManager, KeyStatus, KeyStore, MasterKey, MemoryKeyStore},
    record::{RecordFormat, StoredRecord},
    service::{DataProtection, ImportOutcome, PlainExportConsent, ResetOutcome},
    snapshot::Snapshot,
    store::{KvStore, MemoryKvStore, SqliteKvStore},
    traits::RecordCipher,
};

/// Run database migrations for the vault crate.
///
/// Creates the `kv_entries` table. Call once at startup before building a
/// [`SqliteKvStore`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
