//! Metric name and label definitions.
//!
//! All metric names used by solace are defined here so the set of exported
//! series is documented in one place.

/// Local record store metrics
pub mod records {
    /// Records read, labelled by stored format
    pub const READS_TOTAL: &str = "solace_record_reads_total";
    /// Records written (always `aes-v1`)
    pub const WRITES_TOTAL: &str = "solace_record_writes_total";
    /// Legacy records rewritten under the current format, by source format
    pub const MIGRATIONS_TOTAL: &str = "solace_record_migrations_total";
    /// Records that could not be decoded
    pub const DECODE_ERRORS_TOTAL: &str = "solace_record_decode_errors_total";
}

/// Backup export/import metrics
pub mod backup {
    /// Backups exported, labelled by format (`encrypted` / `plain`)
    pub const EXPORTS_TOTAL: &str = "solace_backup_exports_total";
    /// Backups imported successfully, labelled by format
    pub const IMPORTS_TOTAL: &str = "solace_backup_imports_total";
    /// Failed imports, labelled by error type
    pub const IMPORT_ERRORS_TOTAL: &str = "solace_backup_import_errors_total";
    /// Time spent in key derivation plus cipher work, in seconds
    pub const CODEC_DURATION_SECONDS: &str = "solace_backup_codec_duration_seconds";
}

/// Master key metrics
pub mod keystore {
    /// Master keys generated
    pub const KEYS_CREATED_TOTAL: &str = "solace_keystore_keys_created_total";
    /// Times the insecure fallback key was handed out
    pub const FALLBACK_TOTAL: &str = "solace_keystore_fallback_total";
    /// Master keys deleted by a full reset
    pub const KEYS_DELETED_TOTAL: &str = "solace_keystore_keys_deleted_total";
}

/// Common label keys used across metrics
pub mod labels {
    pub const FORMAT: &str = "format";
    pub const ERROR_TYPE: &str = "error_type";
    pub const OPERATION: &str = "operation";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Backup codec duration buckets (in seconds)
    /// Covers 10ms to 30s; PBKDF2 at 100k rounds dominates
    pub static CODEC_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });
}
