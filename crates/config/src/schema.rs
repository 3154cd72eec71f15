//! Config schema types (storage, keystore, backup, metrics).

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolaceConfig {
    pub storage: StorageConfig,
    pub keystore: KeystoreConfig,
    pub backup: BackupConfig,
    pub metrics: MetricsConfig,
}

/// Where the record database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file. Relative paths resolve against the user data directory.
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("solace.db"),
        }
    }
}

impl StorageConfig {
    /// Absolute database path, anchored at `base` when relative.
    pub fn database_path(&self, base: &std::path::Path) -> PathBuf {
        if self.database.is_absolute() {
            self.database.clone()
        } else {
            base.join(&self.database)
        }
    }

    /// `sqlite://` connection URL that creates the file on first use.
    pub fn database_url(&self, base: &std::path::Path) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path(base).display())
    }
}

/// OS keychain entry holding the master key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub service: String,
    pub entry: String,
    /// Fall back to a fixed, publicly known key when the keychain is
    /// unusable. Records written under it are effectively unprotected.
    pub allow_insecure_fallback: bool,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            service: "solace".into(),
            entry: "solace_master_key".into(),
            allow_insecure_fallback: true,
        }
    }
}

/// Backup export and import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for exported files. Defaults to the working directory.
    pub export_dir: Option<PathBuf>,
    /// Backup password, normally given as `${SOLACE_BACKUP_PASSWORD}`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Secret<String>>,
}

impl BackupConfig {
    /// Where an export named `file_name` is written.
    pub fn export_path(&self, file_name: &str) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(file_name)
    }

    /// Configured password, ignoring unresolved `${...}` placeholders.
    pub fn resolved_password(&self) -> Option<&str> {
        self.password
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
            .filter(|value| !crate::env_subst::is_placeholder(value))
    }
}

/// Metrics collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
