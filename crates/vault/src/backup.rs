//! Password-protected backup files.
//!
//! Export: PBKDF2 derives an encryption key and an independent MAC key from
//! the password and a random salt. The JSON snapshot is encrypted with
//! AES-256-CTR, then HMAC-SHA256 is computed over `salt ‖ iv ‖ ciphertext`.
//! Every binary field is hex encoded.
//!
//! Import verifies the MAC in constant time before anything is decrypted.

use {
    ctr::cipher::{KeyIvInit, StreamCipher},
    hmac::{Hmac, Mac},
    rand::RngCore,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    sha2::Sha256,
};

use crate::{
    error::VaultError,
    kdf::{self, KdfParams},
    registry::{self, CURRENT_VERSION},
    snapshot::Snapshot,
};

// Only the low 32-bit word of the counter block increments, wrapping
// without carry, so older exports decrypt byte for byte.
type Aes256Ctr = ctr::Ctr32BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Shortest password accepted for export and import.
pub const MIN_PASSWORD_LEN: usize = 4;

const IV_LEN: usize = 16;

/// The encrypted part of a backup file, all binary fields hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBackup {
    pub version: String,
    pub salt: String,
    pub iv: String,
    /// Earlier exports named this field `ct`.
    #[serde(alias = "ct")]
    pub ciphertext: String,
    pub mac: String,
}

/// A backup file as read from or written to disk.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupFile {
    Encrypted(EncryptedBackup),
    /// Written only after the caller passed the plain-export confirmation.
    Plain(Snapshot),
}

#[derive(Serialize)]
struct EncryptedFileRef<'a> {
    encrypted: bool,
    #[serde(flatten)]
    backup: &'a EncryptedBackup,
}

impl BackupFile {
    /// Parse file bytes.
    ///
    /// A file must say what it is: `encrypted` as a JSON bool, or a `version`
    /// for a bare encrypted envelope. Every version, top-level or nested, goes
    /// through the registry before any other field is read, so a rejected
    /// version fails the same way whatever else the file contains.
    pub fn parse(bytes: &[u8]) -> Result<Self, VaultError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::UnsupportedFormat(format!("file is not JSON: {e}")))?;
        let Value::Object(fields) = value else {
            return Err(VaultError::UnsupportedFormat(
                "file is not a JSON object".to_string(),
            ));
        };

        if let Some(version) = fields.get("version") {
            let version = version.as_str().ok_or_else(|| {
                VaultError::UnsupportedFormat("backup version is not a string".to_string())
            })?;
            registry::resolve(version)?;
        }

        let flag = fields.get("encrypted").map(Value::as_bool);
        match (flag, fields.contains_key("version")) {
            (Some(Some(false)), _) => {
                let snapshot = serde_json::from_value(Value::Object(fields)).map_err(|e| {
                    VaultError::UnsupportedFormat(format!("invalid snapshot: {e}"))
                })?;
                Ok(Self::Plain(snapshot))
            },
            (Some(Some(true)), _) | (None, true) => Self::parse_encrypted(fields),
            (Some(None), _) => Err(VaultError::UnsupportedFormat(
                "encrypted flag is not a boolean".to_string(),
            )),
            (None, false) => Err(VaultError::UnsupportedFormat(
                "not a backup file: no encrypted flag or version".to_string(),
            )),
        }
    }

    fn parse_encrypted(fields: Map<String, Value>) -> Result<Self, VaultError> {
        let envelope = unwrap_legacy_envelope(fields)?;
        let version = envelope
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| VaultError::UnsupportedFormat("missing backup version".to_string()))?;
        registry::resolve(version)?;

        let backup: EncryptedBackup = serde_json::from_value(Value::Object(envelope))
            .map_err(|e| VaultError::UnsupportedFormat(format!("invalid encrypted backup: {e}")))?;
        if [&backup.salt, &backup.iv, &backup.ciphertext, &backup.mac]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(VaultError::UnsupportedFormat(
                "encrypted backup has empty fields".to_string(),
            ));
        }
        Ok(Self::Encrypted(backup))
    }

    /// Serialize as pretty-printed JSON with a top-level `encrypted` flag.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = match self {
            Self::Encrypted(backup) => serde_json::to_vec_pretty(&EncryptedFileRef {
                encrypted: true,
                backup,
            })?,
            Self::Plain(snapshot) => serde_json::to_vec_pretty(snapshot)?,
        };
        Ok(bytes)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }
}

/// Older exports nested the encrypted fields as a JSON string under `data`.
fn unwrap_legacy_envelope(
    mut fields: Map<String, Value>,
) -> Result<Map<String, Value>, VaultError> {
    match fields.remove("data") {
        None => Ok(fields),
        Some(Value::String(inner)) => match serde_json::from_str(&inner) {
            Ok(Value::Object(inner)) => Ok(inner),
            _ => Err(VaultError::UnsupportedFormat(
                "data field is not an encrypted backup".to_string(),
            )),
        },
        Some(Value::Object(inner)) => Ok(inner),
        Some(_) => Err(VaultError::UnsupportedFormat(
            "data field is not an encrypted backup".to_string(),
        )),
    }
}

/// Encrypts snapshots into [`EncryptedBackup`]s and back.
#[derive(Debug, Clone, Default)]
pub struct BackupCodec {
    params: KdfParams,
}

impl BackupCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with non-default KDF parameters. Files written this way only
    /// open with a codec using the same parameters.
    #[doc(hidden)]
    pub fn with_params(params: KdfParams) -> Self {
        Self { params }
    }

    /// Encrypt `snapshot` under `password`. The snapshot is serialized as is.
    pub fn export(
        &self,
        snapshot: &Snapshot,
        password: &str,
    ) -> Result<EncryptedBackup, VaultError> {
        check_password(password)?;
        let plaintext = serde_json::to_vec(snapshot)?;
        self.seal(&plaintext, password)
    }

    /// Verify and decrypt `backup`.
    ///
    /// A wrong password and a modified file both fail with
    /// [`VaultError::Integrity`].
    pub fn import(
        &self,
        backup: &EncryptedBackup,
        password: &str,
    ) -> Result<Snapshot, VaultError> {
        registry::resolve(&backup.version)?;
        check_password(password)?;

        let salt = decode_field("salt", &backup.salt)?;
        let iv = decode_field("iv", &backup.iv)?;
        let mut data = decode_field("ciphertext", &backup.ciphertext)?;
        let mac = decode_field("mac", &backup.mac)?;
        if iv.len() != IV_LEN {
            return Err(VaultError::UnsupportedFormat(format!(
                "iv has wrong length: {} (expected {IV_LEN})",
                iv.len()
            )));
        }

        let keys = kdf::derive_key_pair(password.as_bytes(), &salt, &self.params)?;
        compute_mac(keys.mac_key(), &salt, &iv, &data)?
            .verify_slice(&mac)
            .map_err(|_| VaultError::Integrity)?;

        Aes256Ctr::new_from_slices(keys.enc_key(), &iv)
            .map_err(|e| VaultError::CipherError(e.to_string()))?
            .apply_keystream(&mut data);

        #[cfg(feature = "tracing")]
        tracing::debug!(bytes = data.len(), "backup verified and decrypted");

        serde_json::from_slice(&data).map_err(|e| VaultError::Decode(e.to_string()))
    }

    fn seal(&self, plaintext: &[u8], password: &str) -> Result<EncryptedBackup, VaultError> {
        let salt = kdf::generate_salt();
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let keys = kdf::derive_key_pair(password.as_bytes(), &salt, &self.params)?;

        let mut data = plaintext.to_vec();
        Aes256Ctr::new_from_slices(keys.enc_key(), &iv)
            .map_err(|e| VaultError::CipherError(e.to_string()))?
            .apply_keystream(&mut data);

        let mac = compute_mac(keys.mac_key(), &salt, &iv, &data)?
            .finalize()
            .into_bytes();

        #[cfg(feature = "tracing")]
        tracing::debug!(bytes = data.len(), "backup encrypted");

        Ok(EncryptedBackup {
            version: CURRENT_VERSION.to_string(),
            salt: hex::encode(salt),
            iv: hex::encode(iv),
            ciphertext: hex::encode(data),
            mac: hex::encode(mac),
        })
    }
}

fn check_password(password: &str) -> Result<(), VaultError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(VaultError::WeakPassword {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(value)
        .map_err(|e| VaultError::UnsupportedFormat(format!("{name} is not hex: {e}")))
}

fn compute_mac(
    key: &[u8],
    salt: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<HmacSha256, VaultError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| VaultError::CipherError(e.to_string()))?;
    mac.update(salt);
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac)
}
