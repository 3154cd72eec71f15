//! Stored record formats and the decode dispatch for each generation.
//!
//! A raw stored value is classified once by its prefix into a [`StoredRecord`],
//! then decoded by the single function that owns that variant.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::fmt,
};

use crate::{
    aes_cbc::AesCbcCipher, error::VaultError, keystore::MasterKey, legacy_xor,
    traits::RecordCipher,
};

/// Prefix of current-generation records.
pub const AES_V1_PREFIX: &str = "aes-v1:";
/// Prefix earlier installs wrote in front of XOR-obfuscated records.
pub const XOR_V1_PREFIX: &str = "encrypted:";

/// Encoding generation of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordFormat {
    /// Untagged JSON from the oldest installs.
    Plain,
    /// Keyed XOR obfuscation, decode only.
    XorV1,
    /// AES-256-CBC under the master key.
    AesV1,
}

impl RecordFormat {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::XorV1 => "xor-v1",
            Self::AesV1 => "aes-v1",
        }
    }

    /// Prefix written in front of the payload, `None` for untagged plain JSON.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::XorV1 => Some(XOR_V1_PREFIX),
            Self::AesV1 => Some(AES_V1_PREFIX),
        }
    }

    /// Whether values in this format are rewritten on read.
    pub fn needs_migration(self) -> bool {
        !matches!(self, Self::AesV1)
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A raw stored value, classified by its format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredRecord<'a> {
    Plain(&'a str),
    XorV1(&'a str),
    AesV1(&'a str),
}

impl<'a> StoredRecord<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if let Some(payload) = raw.strip_prefix(AES_V1_PREFIX) {
            Self::AesV1(payload)
        } else if let Some(payload) = raw.strip_prefix(XOR_V1_PREFIX) {
            Self::XorV1(payload)
        } else {
            Self::Plain(raw)
        }
    }

    pub fn format(&self) -> RecordFormat {
        match self {
            Self::Plain(_) => RecordFormat::Plain,
            Self::XorV1(_) => RecordFormat::XorV1,
            Self::AesV1(_) => RecordFormat::AesV1,
        }
    }

    /// Decode the record stored under `name` into its JSON value.
    pub fn decode(&self, name: &str, key: &MasterKey) -> Result<Value, VaultError> {
        match *self {
            Self::Plain(raw) => decode_plain(name, raw),
            Self::XorV1(payload) => decode_xor_v1(name, payload, key),
            Self::AesV1(payload) => decode_aes_v1(name, payload, key),
        }
    }
}

/// Serialize `value` and encrypt it with `cipher`, tag included.
pub fn seal<C: RecordCipher + ?Sized>(
    cipher: &C,
    key: &MasterKey,
    value: &Value,
) -> Result<String, VaultError> {
    let format = cipher.format();
    let prefix = format.prefix().ok_or_else(|| {
        VaultError::CipherError(format!("{format} cannot be used for new writes"))
    })?;
    let json = serde_json::to_vec(value)?;
    let payload = cipher.encrypt(key, &json)?;
    Ok(format!("{prefix}{payload}"))
}

fn decode_plain(name: &str, raw: &str) -> Result<Value, VaultError> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        // The earliest installs stored scalars like the language code as
        // bare text. Anything that looks like structured JSON must parse.
        Err(_) if !looks_structured(raw) => Ok(Value::String(raw.to_string())),
        Err(e) => Err(VaultError::record(name, format!("plain record is not JSON: {e}"))),
    }
}

fn decode_xor_v1(name: &str, payload: &str, key: &MasterKey) -> Result<Value, VaultError> {
    let text = legacy_xor::decrypt(payload, key.encoded())
        .map_err(|e| VaultError::record(name, e.to_string()))?;
    serde_json::from_str(&text)
        .map_err(|e| VaultError::record(name, format!("xor-v1 record is not JSON: {e}")))
}

fn decode_aes_v1(name: &str, payload: &str, key: &MasterKey) -> Result<Value, VaultError> {
    let bytes = AesCbcCipher
        .decrypt(key, payload)
        .map_err(|e| VaultError::record(name, e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VaultError::record(name, format!("aes-v1 record is not JSON: {e}")))
}

fn looks_structured(raw: &str) -> bool {
    matches!(raw.trim_start().chars().next(), Some('{' | '[' | '"'))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parse_dispatches_on_prefix() {
        assert_eq!(StoredRecord::parse("aes-v1:aa:bb").format(), RecordFormat::AesV1);
        assert_eq!(StoredRecord::parse("encrypted:abcd").format(), RecordFormat::XorV1);
        assert_eq!(StoredRecord::parse("[1,2,3]").format(), RecordFormat::Plain);
        assert_eq!(StoredRecord::parse("aes-v1:aa:bb"), StoredRecord::AesV1("aa:bb"));
    }

    #[test]
    fn format_tags() {
        assert_eq!(RecordFormat::AesV1.to_string(), "aes-v1");
        assert_eq!(RecordFormat::XorV1.prefix(), Some("encrypted:"));
        assert_eq!(RecordFormat::Plain.prefix(), None);
        assert!(!RecordFormat::AesV1.needs_migration());
        assert!(RecordFormat::Plain.needs_migration());
    }

    #[test]
    fn seal_then_decode() {
        let key = MasterKey::generate();
        let value = json!([{"id": "1", "text": "hello"}]);

        let stored = seal(&AesCbcCipher, &key, &value).unwrap();
        assert!(stored.starts_with(AES_V1_PREFIX));

        let record = StoredRecord::parse(&stored);
        assert_eq!(record.format(), RecordFormat::AesV1);
        assert_eq!(record.decode("emotionHistory", &key).unwrap(), value);
    }

    #[test]
    fn aes_record_under_other_key_fails() {
        let key = MasterKey::generate();
        let other = MasterKey::generate();
        let stored = seal(&AesCbcCipher, &key, &json!({"streak": 3})).unwrap();

        let err = StoredRecord::parse(&stored)
            .decode("streak", &other)
            .unwrap_err();
        assert!(matches!(err, VaultError::RecordDecrypt { ref key, .. } if key == "streak"));
    }

    #[test]
    fn plain_json_decodes() {
        let key = MasterKey::generate();
        let record = StoredRecord::parse(r#"[{"id":"1"}]"#);
        assert_eq!(record.decode("emotionHistory", &key).unwrap(), json!([{"id": "1"}]));

        let record = StoredRecord::parse("3");
        assert_eq!(record.decode("streak", &key).unwrap(), json!(3));
    }

    #[test]
    fn plain_bare_text_decodes_as_string() {
        let key = MasterKey::generate();
        let record = StoredRecord::parse("ko");
        assert_eq!(record.decode("language", &key).unwrap(), json!("ko"));
    }

    #[test]
    fn plain_broken_json_fails() {
        let key = MasterKey::generate();
        let record = StoredRecord::parse(r#"[{"id":"1""#);
        assert!(record.decode("emotionHistory", &key).is_err());
    }

    #[test]
    fn xor_record_decodes_with_stored_key_string() {
        let key = MasterKey::generate();
        let payload = legacy_xor::encrypt_for_test(r#"{"a":[1,2]}"#, key.encoded());
        let stored = format!("{XOR_V1_PREFIX}{payload}");

        let record = StoredRecord::parse(&stored);
        assert_eq!(record.format(), RecordFormat::XorV1);
        assert_eq!(record.decode("chatSessions", &key).unwrap(), json!({"a": [1, 2]}));
    }
}
