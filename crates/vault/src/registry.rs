//! Backup file versions and whether this build will open them.

use crate::error::VaultError;

/// Version written by every export.
pub const CURRENT_VERSION: &str = "2.1";

/// Known backup format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupVersion {
    /// AES-GCM era. The implementation that wrote it is no longer trusted.
    V2_0,
    /// PBKDF2 + AES-256-CTR + HMAC-SHA256, encrypt-then-MAC.
    V2_1,
}

/// What import does with a given version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Supported,
    Rejected { message: &'static str },
}

const REGISTRY: &[(&str, BackupVersion, Trust)] = &[
    (
        "2.0",
        BackupVersion::V2_0,
        Trust::Rejected {
            message: "backups from version 2.0 cannot be restored by this release; \
                      export a new backup from an up-to-date install",
        },
    ),
    ("2.1", BackupVersion::V2_1, Trust::Supported),
];

impl BackupVersion {
    pub fn lookup(version: &str) -> Option<(Self, Trust)> {
        REGISTRY
            .iter()
            .find(|(v, ..)| *v == version)
            .map(|(_, version, trust)| (*version, *trust))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V2_0 => "2.0",
            Self::V2_1 => "2.1",
        }
    }
}

/// Resolve a version string to a version this build decodes.
///
/// Rejected versions fail with [`VaultError::UnsupportedLegacyVersion`],
/// unknown ones with [`VaultError::UnsupportedFormat`].
pub fn resolve(version: &str) -> Result<BackupVersion, VaultError> {
    match BackupVersion::lookup(version) {
        Some((version, Trust::Supported)) => Ok(version),
        Some((version, Trust::Rejected { message })) => {
            Err(VaultError::UnsupportedLegacyVersion {
                version: version.as_str().to_string(),
                message,
            })
        },
        None => Err(VaultError::UnsupportedFormat(format!(
            "unknown backup version {version:?}"
        ))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_supported() {
        assert_eq!(resolve(CURRENT_VERSION).unwrap(), BackupVersion::V2_1);
    }

    #[test]
    fn v2_0_is_rejected_with_message() {
        let err = resolve("2.0").unwrap_err();
        match err {
            VaultError::UnsupportedLegacyVersion { version, message } => {
                assert_eq!(version, "2.0");
                assert!(message.contains("export a new backup"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_version_is_unsupported_format() {
        assert!(matches!(resolve("3.0"), Err(VaultError::UnsupportedFormat(_))));
        assert!(matches!(resolve(""), Err(VaultError::UnsupportedFormat(_))));
    }

    #[test]
    fn every_entry_round_trips_through_as_str() {
        for (name, version, _) in REGISTRY {
            assert_eq!(version.as_str(), *name);
        }
    }
}
