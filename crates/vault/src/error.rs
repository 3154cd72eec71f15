//! Vault error types.

/// Errors produced by vault operations.
///
/// Backup-import failures are deliberately coarse: a wrong password and a
/// tampered file both surface as [`VaultError::Integrity`].
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The platform key store could not be read or written.
    #[error("secure key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// Backup password is shorter than the minimum length.
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    /// Backup was written by an old format version that is no longer decoded.
    #[error("backup version {version} can no longer be restored: {message}")]
    UnsupportedLegacyVersion {
        version: String,
        message: &'static str,
    },

    /// File is not a backup this build understands.
    #[error("unsupported backup format: {0}")]
    UnsupportedFormat(String),

    /// MAC mismatch: wrong password, or a corrupted or tampered file.
    #[error("integrity check failed")]
    Integrity,

    /// MAC verified but the plaintext did not parse.
    #[error("backup decoded but its contents are unreadable: {0}")]
    Decode(String),

    /// A stored record could not be decoded under the current master key.
    #[error("record {key} could not be decrypted: {reason}")]
    RecordDecrypt { key: String, reason: String },

    /// Unencrypted export requested without both confirmations.
    #[error("unencrypted export requires two explicit confirmations")]
    PlainExportNotConfirmed,

    /// Encryption primitive rejected its inputs.
    #[error("cipher error: {0}")]
    CipherError(String),

    /// Hex decoding failed.
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Short stable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyStoreUnavailable(_) => "key_store_unavailable",
            Self::WeakPassword { .. } => "weak_password",
            Self::UnsupportedLegacyVersion { .. } => "unsupported_legacy_version",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Integrity => "integrity",
            Self::Decode(_) => "decode",
            Self::RecordDecrypt { .. } => "record_decrypt",
            Self::PlainExportNotConfirmed => "plain_export_not_confirmed",
            Self::CipherError(_) => "cipher",
            Self::Hex(_) | Self::Base64(_) => "encoding",
            Self::Database(_) => "database",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }

    pub(crate) fn record(key: &str, reason: impl Into<String>) -> Self {
        Self::RecordDecrypt {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
