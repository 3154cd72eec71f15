//! Configuration loading, validation and env substitution.
//!
//! Config files: `solace.toml`, `solace.yaml`, `solace.yml` or `solace.json`.
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{BackupConfig, KeystoreConfig, MetricsConfig, SolaceConfig, StorageConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
