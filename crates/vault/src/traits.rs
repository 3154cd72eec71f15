//! Cipher trait for swappable record-encryption backends.

use crate::{error::VaultError, keystore::MasterKey, record::RecordFormat};

/// Encrypts individual persisted records under the device master key.
///
/// Each implementation owns one [`RecordFormat`] tag, which prefixes every
/// value it writes so readers can dispatch without guessing.
pub trait RecordCipher: Send + Sync {
    /// Format tag written in front of every stored value.
    fn format(&self) -> RecordFormat;

    /// Encrypt `plaintext`, returning the stored payload (without the tag).
    fn encrypt(&self, key: &MasterKey, plaintext: &[u8]) -> Result<String, VaultError>;

    /// Decrypt a payload previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, key: &MasterKey, payload: &str) -> Result<Vec<u8>, VaultError>;
}
