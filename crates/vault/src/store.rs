//! Persistent key-value store holding the tagged record strings.

use {
    async_trait::async_trait,
    sqlx::SqlitePool,
    std::collections::BTreeMap,
    tokio::sync::RwLock,
};

use crate::error::VaultError;

/// String key-value storage for logical records.
///
/// Values are stored exactly as given; encryption happens above this layer.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;
    async fn remove(&self, keys: &[&str]) -> Result<(), VaultError>;
    async fn keys(&self) -> Result<Vec<String>, VaultError>;

    /// Remove `remove`, then write `entries`, as one atomic step. Either
    /// every change lands or none does.
    async fn replace(
        &self,
        remove: &[&str],
        entries: &[(String, String)],
    ) -> Result<(), VaultError>;
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Store kept entirely in memory.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), VaultError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn replace(
        &self,
        remove: &[&str],
        entries: &[(String, String)],
    ) -> Result<(), VaultError> {
        // Holding the write lock for the whole update keeps it atomic.
        let mut current = self.entries.write().await;
        for key in remove {
            current.remove(*key);
        }
        for (key, value) in entries {
            current.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

// ── SQLite ──────────────────────────────────────────────────────────────────

/// SQLite-backed store using the `kv_entries` table.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `kv_entries` table.
    ///
    /// Production databases get the table from the crate migrations; this is
    /// for tests running against in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<(), VaultError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                key        TEXT    PRIMARY KEY,
                value      TEXT    NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

const UPSERT: &str = "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
     ON CONFLICT(key) DO UPDATE SET
       value = excluded.value,
       updated_at = excluded.updated_at";

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, VaultError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn replace(
        &self,
        remove: &[&str],
        entries: &[(String, String)],
    ) -> Result<(), VaultError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for key in remove {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }
        for (key, value) in entries {
            sqlx::query(UPSERT)
                .bind(key)
                .bind(value)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
