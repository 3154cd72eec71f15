//! Wires config into a ready [`DataProtection`] instance.

use std::path::PathBuf;

use {
    solace_config::SolaceConfig,
    solace_vault::{DataProtection, KeyManager, SqliteKvStore},
    sqlx::sqlite::SqlitePoolOptions,
    tracing::debug,
};

#[cfg(feature = "keyring")]
pub type Keys = solace_vault::KeyringStore;
#[cfg(not(feature = "keyring"))]
pub type Keys = solace_vault::MemoryKeyStore;

pub type Vault = DataProtection<SqliteKvStore, Keys>;

/// Open the record database, apply migrations and build the facade.
pub async fn open(config: &SolaceConfig, data_dir: Option<PathBuf>) -> anyhow::Result<Vault> {
    let base = data_dir.unwrap_or_else(solace_config::data_dir);
    let path = config.storage.database_path(&base);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let url = config.storage.database_url(&base);
    debug!(database = %path.display(), "opening record store");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await?;
    solace_vault::run_migrations(&pool).await?;

    let keys = KeyManager::new(key_store(config))
        .with_entry(config.keystore.entry.clone())
        .with_insecure_fallback(config.keystore.allow_insecure_fallback);

    Ok(DataProtection::new(SqliteKvStore::new(pool), keys))
}

#[cfg(feature = "keyring")]
fn key_store(config: &SolaceConfig) -> Keys {
    solace_vault::KeyringStore::new(config.keystore.service.clone())
}

#[cfg(not(feature = "keyring"))]
fn key_store(_config: &SolaceConfig) -> Keys {
    tracing::warn!("built without keyring support; the master key lives only in memory");
    solace_vault::MemoryKeyStore::new()
}
