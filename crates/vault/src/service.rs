//! Read, write, export, import and reset for the local record store.
//!
//! [`DataProtection`] is the only entry point collaborators use. Reads migrate
//! legacy records to `aes-v1`; imports touch the store only after the whole
//! backup has been verified and re-encrypted.

use std::time::Instant;

use {
    serde_json::{Map, Value},
    zeroize::Zeroizing,
};

use crate::{
    aes_cbc::AesCbcCipher,
    backup::{BackupCodec, BackupFile},
    error::VaultError,
    keystore::{KeyManager, KeyStatus, KeyStore, MasterKey},
    record::{self, RecordFormat, StoredRecord},
    snapshot::Snapshot,
    store::KvStore,
};

/// Logical keys written by the application.
pub mod keys {
    pub const EMOTION_HISTORY: &str = "emotionHistory";
    pub const CHAT_SESSIONS: &str = "chatSessions";
    pub const STREAK: &str = "streak";
    pub const LANGUAGE: &str = "language";
    pub const LAST_DIARY_DATE: &str = "lastDiaryDate";
    pub const LAST_DIARY_DATE_KEY: &str = "lastDiaryDateKey";
    pub const DAILY_ANONYMOUS_COUNT: &str = "dailyAnonymousCount";
    pub const LAST_RECORD_DATE_KEY: &str = "lastRecordDateKey";
    pub const USER_CONSENT: &str = "user_consent";

    /// Every key an import replaces.
    pub const ALL: &[&str] = &[
        EMOTION_HISTORY,
        CHAT_SESSIONS,
        STREAK,
        LANGUAGE,
        LAST_DIARY_DATE,
        LAST_DIARY_DATE_KEY,
        DAILY_ANONYMOUS_COUNT,
        LAST_RECORD_DATE_KEY,
        USER_CONSENT,
    ];
}

/// Proof that the user confirmed an unencrypted export twice.
///
/// Both steps must be taken explicitly; the default value confirms nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlainExportConsent {
    acknowledged_unencrypted: bool,
    confirmed_again: bool,
}

impl PlainExportConsent {
    pub fn new() -> Self {
        Self::default()
    }

    /// First step: the user read that the file will not be encrypted.
    #[must_use]
    pub fn acknowledge_unencrypted(mut self) -> Self {
        self.acknowledged_unencrypted = true;
        self
    }

    /// Second, separate step: the user confirmed again.
    #[must_use]
    pub fn confirm_again(mut self) -> Self {
        self.confirmed_again = true;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.acknowledged_unencrypted && self.confirmed_again
    }
}

/// Result of [`DataProtection::import_file`].
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// The store now holds this snapshot.
    Restored(Snapshot),
    /// The file is encrypted and no password was given. Nothing was changed.
    PasswordRequired,
}

/// Language restored when a backup carries none.
pub const DEFAULT_LANGUAGE: &str = "ko";

/// Result of [`DataProtection::reset_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    pub records_removed: usize,
    /// `false` when the key store was unavailable. The records are gone, but
    /// the stored master key (if any) survived.
    pub key_deleted: bool,
}

/// Data-protection facade over a key-value store and a master-key store.
pub struct DataProtection<S: KvStore, K: KeyStore> {
    store: S,
    keys: KeyManager<K>,
    cipher: AesCbcCipher,
    codec: BackupCodec,
}

impl<S: KvStore, K: KeyStore> DataProtection<S, K> {
    pub fn new(store: S, keys: KeyManager<K>) -> Self {
        Self {
            store,
            keys,
            cipher: AesCbcCipher,
            codec: BackupCodec::new(),
        }
    }

    /// Replace the backup codec, e.g. one with a cheaper KDF for tests.
    #[doc(hidden)]
    #[must_use]
    pub fn with_codec(mut self, codec: BackupCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key_manager(&self) -> &KeyManager<K> {
        &self.keys
    }

    pub async fn key_status(&self) -> KeyStatus {
        self.keys.status().await
    }

    /// Read and decode the record stored under `key`.
    pub async fn read(&self, key: &str) -> Result<Option<Value>, VaultError> {
        Ok(self.read_with_format(key).await?.map(|(value, _)| value))
    }

    /// Like [`read`](Self::read), also returning the format the value was
    /// stored in before this call. Legacy values are rewritten as `aes-v1`.
    pub async fn read_with_format(
        &self,
        key: &str,
    ) -> Result<Option<(Value, RecordFormat)>, VaultError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let record = StoredRecord::parse(&raw);
        let format = record.format();
        let master = self.keys.get_or_create_master_key().await?;

        let value = match record.decode(key, &master) {
            Ok(value) => value,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, %format, error = %e, "stored record could not be decoded");
                #[cfg(feature = "metrics")]
                solace_metrics::counter!(
                    solace_metrics::records::DECODE_ERRORS_TOTAL,
                    solace_metrics::labels::FORMAT => format.tag()
                )
                .increment(1);
                return Err(e);
            },
        };

        #[cfg(feature = "metrics")]
        solace_metrics::counter!(
            solace_metrics::records::READS_TOTAL,
            solace_metrics::labels::FORMAT => format.tag()
        )
        .increment(1);

        if format.needs_migration() {
            self.migrate(key, &value, format, &master).await;
        }

        Ok(Some((value, format)))
    }

    /// Encrypt `value` under the master key and store it as `aes-v1`.
    pub async fn write(&self, key: &str, value: &Value) -> Result<(), VaultError> {
        let master = self.keys.get_or_create_master_key().await?;
        self.write_with(key, value, &master).await
    }

    /// Collect the current store contents into a snapshot stamped with the
    /// export time. The `encrypted` flag is left unset.
    pub async fn snapshot(&self) -> Result<Snapshot, VaultError> {
        let mut fields = Map::new();
        for key in [
            keys::EMOTION_HISTORY,
            keys::CHAT_SESSIONS,
            keys::STREAK,
            keys::LANGUAGE,
        ] {
            if let Some(value) = self.read(key).await? {
                fields.insert(key.to_string(), value);
            }
        }

        let mut snapshot: Snapshot = serde_json::from_value(Value::Object(fields))?;
        snapshot.export_date = Some(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        );
        Ok(snapshot)
    }

    /// Encrypt `snapshot` under `password` and return the file bytes.
    pub async fn export_encrypted(
        &self,
        snapshot: &Snapshot,
        password: &str,
    ) -> Result<Vec<u8>, VaultError> {
        let mut snapshot = snapshot.clone();
        snapshot.encrypted = Some(true);

        let codec = self.codec.clone();
        let password = Zeroizing::new(password.to_string());
        let started = Instant::now();
        let backup = tokio::task::spawn_blocking(move || codec.export(&snapshot, &password))
            .await
            .map_err(|e| VaultError::Other(anyhow::Error::new(e)))??;
        let elapsed = started.elapsed();

        let bytes = BackupFile::Encrypted(backup).to_bytes()?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "encrypted backup exported"
        );
        #[cfg(feature = "metrics")]
        {
            solace_metrics::counter!(
                solace_metrics::backup::EXPORTS_TOTAL,
                solace_metrics::labels::FORMAT => "encrypted"
            )
            .increment(1);
            solace_metrics::histogram!(
                solace_metrics::backup::CODEC_DURATION_SECONDS,
                solace_metrics::labels::OPERATION => "export"
            )
            .record(elapsed.as_secs_f64());
        }
        #[cfg(not(any(feature = "tracing", feature = "metrics")))]
        let _ = elapsed;

        Ok(bytes)
    }

    /// Write `snapshot` unencrypted. Refused unless `consent` carries both
    /// confirmations.
    pub async fn export_plain(
        &self,
        snapshot: &Snapshot,
        consent: PlainExportConsent,
    ) -> Result<Vec<u8>, VaultError> {
        if !consent.is_complete() {
            return Err(VaultError::PlainExportNotConfirmed);
        }

        let mut snapshot = snapshot.clone();
        snapshot.encrypted = Some(false);
        let bytes = BackupFile::Plain(snapshot).to_bytes()?;

        #[cfg(feature = "tracing")]
        tracing::warn!(bytes = bytes.len(), "UNENCRYPTED backup exported");
        #[cfg(feature = "metrics")]
        solace_metrics::counter!(
            solace_metrics::backup::EXPORTS_TOTAL,
            solace_metrics::labels::FORMAT => "plain"
        )
        .increment(1);

        Ok(bytes)
    }

    /// Restore a backup file into the store.
    ///
    /// An encrypted file without a password yields
    /// [`ImportOutcome::PasswordRequired`]. On any error the store is left as
    /// it was.
    pub async fn import_file(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<ImportOutcome, VaultError> {
        let result = self.import_inner(bytes, password).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(ImportOutcome::Restored(snapshot)) => {
                let format = if snapshot.encrypted == Some(true) {
                    "encrypted"
                } else {
                    "plain"
                };
                solace_metrics::counter!(
                    solace_metrics::backup::IMPORTS_TOTAL,
                    solace_metrics::labels::FORMAT => format
                )
                .increment(1);
            },
            Ok(ImportOutcome::PasswordRequired) => {},
            Err(e) => {
                solace_metrics::counter!(
                    solace_metrics::backup::IMPORT_ERRORS_TOTAL,
                    solace_metrics::labels::ERROR_TYPE => e.kind()
                )
                .increment(1);
            },
        }

        #[cfg(feature = "tracing")]
        if let Err(e) = &result {
            tracing::warn!(error = %e, "backup import failed, store unchanged");
        }

        result
    }

    /// Crypto-shred: delete the master key, then clear every stored record.
    ///
    /// `aes-v1` ciphertext that survives elsewhere can no longer be decoded.
    /// When the key store cannot delete the key the records are still
    /// removed; [`ResetOutcome::key_deleted`] reports the failure.
    pub async fn reset_all(&self) -> Result<ResetOutcome, VaultError> {
        let key_deleted = match self.keys.delete_master_key().await {
            Ok(()) => true,
            Err(VaultError::KeyStoreUnavailable(reason)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%reason, "master key could not be deleted, clearing records anyway");
                #[cfg(not(feature = "tracing"))]
                let _ = reason;
                false
            },
            Err(e) => return Err(e),
        };

        let stored = self.store.keys().await?;
        let stored: Vec<&str> = stored.iter().map(String::as_str).collect();
        self.store.remove(&stored).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(records = stored.len(), key_deleted, "all data reset");

        Ok(ResetOutcome {
            records_removed: stored.len(),
            key_deleted,
        })
    }

    async fn import_inner(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<ImportOutcome, VaultError> {
        let mut snapshot = match BackupFile::parse(bytes)? {
            BackupFile::Plain(snapshot) => snapshot,
            BackupFile::Encrypted(backup) => {
                let Some(password) = password else {
                    return Ok(ImportOutcome::PasswordRequired);
                };
                let codec = self.codec.clone();
                let password = Zeroizing::new(password.to_string());
                let started = Instant::now();
                let snapshot =
                    tokio::task::spawn_blocking(move || codec.import(&backup, &password))
                        .await
                        .map_err(|e| VaultError::Other(anyhow::Error::new(e)))??;

                #[cfg(feature = "metrics")]
                solace_metrics::histogram!(
                    solace_metrics::backup::CODEC_DURATION_SECONDS,
                    solace_metrics::labels::OPERATION => "import"
                )
                .record(started.elapsed().as_secs_f64());
                #[cfg(not(feature = "metrics"))]
                let _ = started;

                snapshot
            },
        };

        let backfilled = snapshot.backfill_session_ids();
        self.restore(&snapshot).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(backfilled_session_ids = backfilled, "backup restored");
        #[cfg(not(feature = "tracing"))]
        let _ = backfilled;

        Ok(ImportOutcome::Restored(snapshot))
    }

    /// Seal every restored record first, then swap them in with one atomic
    /// store update.
    async fn restore(&self, snapshot: &Snapshot) -> Result<(), VaultError> {
        let master = self.keys.get_or_create_master_key().await?;

        let mut values = vec![
            (
                keys::EMOTION_HISTORY,
                Value::Array(snapshot.emotion_history.clone().unwrap_or_default()),
            ),
            (keys::STREAK, Value::from(snapshot.streak.unwrap_or(0))),
        ];
        if let Some(sessions) = &snapshot.chat_sessions {
            values.push((keys::CHAT_SESSIONS, Value::Array(sessions.clone())));
        }
        let language = snapshot
            .language
            .as_deref()
            .filter(|language| !language.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE);
        values.push((keys::LANGUAGE, Value::String(language.to_string())));

        let entries = values
            .iter()
            .map(|(key, value)| {
                let sealed = record::seal(&self.cipher, &master, value)?;
                Ok((key.to_string(), sealed))
            })
            .collect::<Result<Vec<_>, VaultError>>()?;

        self.store.replace(keys::ALL, &entries).await
    }

    async fn write_with(
        &self,
        key: &str,
        value: &Value,
        master: &MasterKey,
    ) -> Result<(), VaultError> {
        let sealed = record::seal(&self.cipher, master, value)?;
        self.store.set(key, &sealed).await?;

        #[cfg(feature = "metrics")]
        solace_metrics::counter!(solace_metrics::records::WRITES_TOTAL).increment(1);

        Ok(())
    }

    /// Rewrite a legacy record as `aes-v1`. A failed rewrite leaves the legacy
    /// value in place; the next read tries again.
    async fn migrate(&self, key: &str, value: &Value, from: RecordFormat, master: &MasterKey) {
        match self.write_with(key, value, master).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(key, %from, "record migrated to aes-v1");
                #[cfg(feature = "metrics")]
                solace_metrics::counter!(
                    solace_metrics::records::MIGRATIONS_TOTAL,
                    solace_metrics::labels::FORMAT => from.tag()
                )
                .increment(1);
            },
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, %from, error = %e, "record migration failed");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
            },
        }
        #[cfg(not(any(feature = "tracing", feature = "metrics")))]
        let _ = from;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            kdf::KdfParams,
            keystore::MemoryKeyStore,
            legacy_xor,
            store::MemoryKvStore,
        },
        serde_json::json,
    };

    fn service() -> DataProtection<MemoryKvStore, MemoryKeyStore> {
        DataProtection::new(MemoryKvStore::new(), KeyManager::new(MemoryKeyStore::new()))
            .with_codec(BackupCodec::with_params(KdfParams { iterations: 10 }))
    }

    #[tokio::test]
    async fn missing_and_empty_records_read_as_none() {
        let svc = service();
        assert_eq!(svc.read("emotionHistory").await.unwrap(), None);

        svc.store().set("emotionHistory", "").await.unwrap();
        assert_eq!(svc.read("emotionHistory").await.unwrap(), None);
        assert_eq!(svc.key_status().await, KeyStatus::NotLoaded);
    }

    #[tokio::test]
    async fn write_stores_aes_v1() {
        let svc = service();
        let value = json!([{"id": "1", "text": "hello"}]);
        svc.write("emotionHistory", &value).await.unwrap();

        let raw = svc.store().get("emotionHistory").await.unwrap().unwrap();
        assert!(raw.starts_with("aes-v1:"));
        assert!(!raw.contains("hello"));

        let (read, format) = svc.read_with_format("emotionHistory").await.unwrap().unwrap();
        assert_eq!(read, value);
        assert_eq!(format, RecordFormat::AesV1);
        assert_eq!(svc.key_status().await, KeyStatus::Secure);
    }

    #[tokio::test]
    async fn plain_record_is_migrated_on_read() {
        let svc = service();
        svc.store().set("streak", "5").await.unwrap();

        let (value, format) = svc.read_with_format("streak").await.unwrap().unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(format, RecordFormat::Plain);

        let raw = svc.store().get("streak").await.unwrap().unwrap();
        assert!(raw.starts_with("aes-v1:"));

        let (value, format) = svc.read_with_format("streak").await.unwrap().unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(format, RecordFormat::AesV1);
    }

    #[tokio::test]
    async fn xor_record_is_migrated_on_read() {
        let svc = service();
        let master = svc.key_manager().get_or_create_master_key().await.unwrap();
        let payload = legacy_xor::encrypt_for_test(r#"[{"id":"7"}]"#, master.encoded());
        svc.store()
            .set("chatSessions", &format!("encrypted:{payload}"))
            .await
            .unwrap();

        let (value, format) = svc.read_with_format("chatSessions").await.unwrap().unwrap();
        assert_eq!(value, json!([{"id": "7"}]));
        assert_eq!(format, RecordFormat::XorV1);

        let (again, format) = svc.read_with_format("chatSessions").await.unwrap().unwrap();
        assert_eq!(again, value);
        assert_eq!(format, RecordFormat::AesV1);
    }

    #[tokio::test]
    async fn undecodable_record_errors_and_is_kept() {
        let svc = service();
        svc.store()
            .set("emotionHistory", "aes-v1:00112233445566778899aabbccddeeff:AAAA")
            .await
            .unwrap();

        let err = svc.read("emotionHistory").await.unwrap_err();
        assert!(matches!(err, VaultError::RecordDecrypt { .. }));
        assert!(
            svc.store()
                .get("emotionHistory")
                .await
                .unwrap()
                .unwrap()
                .starts_with("aes-v1:00112233")
        );
    }

    #[tokio::test]
    async fn snapshot_collects_records() {
        let svc = service();
        svc.write("emotionHistory", &json!([{"id": "1"}])).await.unwrap();
        svc.store().set("streak", "\"4\"").await.unwrap();
        svc.store().set("language", "en").await.unwrap();

        let snapshot = svc.snapshot().await.unwrap();
        assert_eq!(snapshot.emotion_history, Some(vec![json!({"id": "1"})]));
        assert_eq!(snapshot.streak, Some(4));
        assert_eq!(snapshot.language.as_deref(), Some("en"));
        assert_eq!(snapshot.chat_sessions, None);
        assert!(snapshot.export_date.unwrap().ends_with('Z'));
        assert_eq!(snapshot.encrypted, None);
    }

    #[tokio::test]
    async fn plain_export_requires_both_confirmations() {
        let svc = service();
        let snapshot = Snapshot::default();

        for consent in [
            PlainExportConsent::new(),
            PlainExportConsent::new().acknowledge_unencrypted(),
            PlainExportConsent::new().confirm_again(),
        ] {
            assert!(matches!(
                svc.export_plain(&snapshot, consent).await,
                Err(VaultError::PlainExportNotConfirmed)
            ));
        }

        let consent = PlainExportConsent::new()
            .acknowledge_unencrypted()
            .confirm_again();
        let bytes = svc.export_plain(&snapshot, consent).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["encrypted"], json!(false));
    }

    #[tokio::test]
    async fn encrypted_import_without_password_asks_for_one() {
        let svc = service();
        svc.write("streak", &json!(9)).await.unwrap();
        let snapshot = svc.snapshot().await.unwrap();
        let bytes = svc.export_encrypted(&snapshot, "test1234").await.unwrap();

        let outcome = svc.import_file(&bytes, None).await.unwrap();
        assert_eq!(outcome, ImportOutcome::PasswordRequired);
    }

    #[tokio::test]
    async fn import_replaces_known_keys_only() {
        let svc = service();
        svc.write("emotionHistory", &json!([{"id": "old"}])).await.unwrap();
        svc.store().set("lastDiaryDate", "2024-01-01").await.unwrap();
        svc.store().set("appSetting", "kept").await.unwrap();

        let file = br#"{"encrypted":false,"emotionHistory":[{"id":"new"}],"chatSessions":[{"timestamp":5}],"streak":"2"}"#;
        let ImportOutcome::Restored(snapshot) = svc.import_file(file, None).await.unwrap() else {
            panic!("expected restore");
        };

        assert_eq!(svc.read("emotionHistory").await.unwrap(), Some(json!([{"id": "new"}])));
        assert_eq!(svc.read("streak").await.unwrap(), Some(json!(2)));
        assert_eq!(svc.read("lastDiaryDate").await.unwrap(), None);
        assert_eq!(svc.read("language").await.unwrap(), Some(json!("ko")));
        assert_eq!(svc.store().get("appSetting").await.unwrap().as_deref(), Some("kept"));

        let sessions = svc.read("chatSessions").await.unwrap().unwrap();
        let id = sessions[0]["id"].as_str().unwrap();
        assert!(id.starts_with('5'));
        assert_eq!(snapshot.chat_sessions.unwrap()[0]["id"], json!(id));
    }

    #[tokio::test]
    async fn reset_all_clears_store_and_key() {
        let svc = service();
        svc.write("emotionHistory", &json!([1])).await.unwrap();
        svc.store().set("appSetting", "x").await.unwrap();

        let outcome = svc.reset_all().await.unwrap();
        assert_eq!(
            outcome,
            ResetOutcome {
                records_removed: 2,
                key_deleted: true,
            }
        );
        assert!(svc.store().keys().await.unwrap().is_empty());
        assert_eq!(svc.key_status().await, KeyStatus::NotLoaded);
    }
}
