//! PBKDF2-HMAC-SHA256 key derivation for password → backup key pair.

use {rand::RngCore, sha2::Sha256, zeroize::Zeroizing};

use crate::error::VaultError;

/// Length of each derived key.
pub const KEY_LEN: usize = 32;
/// Random salt length written into backup files.
pub const SALT_LEN: usize = 16;
/// Work factor of the `2.1` backup format.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2 parameters. The backup format does not record them, so files only
/// open under the same iteration count that wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Encryption and MAC keys derived from one password and salt.
///
/// Held only for the duration of a single export or import call.
pub struct DerivedKeyPair {
    enc_key: Zeroizing<[u8; KEY_LEN]>,
    mac_key: Zeroizing<[u8; KEY_LEN]>,
}

impl DerivedKeyPair {
    pub fn enc_key(&self) -> &[u8; KEY_LEN] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; KEY_LEN] {
        &self.mac_key
    }
}

/// Derive 64 bytes and split them into the encryption and MAC keys.
pub fn derive_key_pair(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<DerivedKeyPair, VaultError> {
    if params.iterations == 0 {
        return Err(VaultError::CipherError(
            "invalid KDF params: iterations must be non-zero".to_string(),
        ));
    }

    let mut output = Zeroizing::new([0u8; KEY_LEN * 2]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, output.as_mut());

    let mut enc_key = Zeroizing::new([0u8; KEY_LEN]);
    let mut mac_key = Zeroizing::new([0u8; KEY_LEN]);
    enc_key.copy_from_slice(&output[..KEY_LEN]);
    mac_key.copy_from_slice(&output[KEY_LEN..]);

    Ok(DerivedKeyPair { enc_key, mac_key })
}

/// Generate a random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams { iterations: 10 };

    #[test]
    fn derive_is_deterministic() {
        let salt = b"test-salt-16byte";

        let a = derive_key_pair(b"password", salt, &FAST).unwrap();
        let b = derive_key_pair(b"password", salt, &FAST).unwrap();
        assert_eq!(a.enc_key(), b.enc_key());
        assert_eq!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn enc_and_mac_keys_are_independent() {
        let pair = derive_key_pair(b"password", b"test-salt-16byte", &FAST).unwrap();
        assert_ne!(pair.enc_key(), pair.mac_key());
    }

    #[test]
    fn different_passwords_different_keys() {
        let salt = b"test-salt-16byte";

        let a = derive_key_pair(b"password1", salt, &FAST).unwrap();
        let b = derive_key_pair(b"password2", salt, &FAST).unwrap();
        assert_ne!(a.enc_key(), b.enc_key());
        assert_ne!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn different_salts_different_keys() {
        let a = derive_key_pair(b"password", b"salt-aaaaaaaaaaa", &FAST).unwrap();
        let b = derive_key_pair(b"password", b"salt-bbbbbbbbbbb", &FAST).unwrap();
        assert_ne!(a.enc_key(), b.enc_key());
    }

    #[test]
    fn matches_pbkdf2_sha256_output() {
        // RFC 7914 §11 PBKDF2-HMAC-SHA256 vector, c = 1.
        let pair = derive_key_pair(b"passwd", b"salt", &KdfParams { iterations: 1 }).unwrap();
        assert_eq!(
            hex::encode(pair.enc_key()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
        assert_eq!(
            hex::encode(pair.mac_key()),
            "49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
        );
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(derive_key_pair(b"password", b"salt", &KdfParams { iterations: 0 }).is_err());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn default_work_factor() {
        assert_eq!(KdfParams::default().iterations, 100_000);
    }
}
