//! AES-256-CBC implementation of the [`RecordCipher`] trait (`aes-v1`).
//!
//! Payload layout: `<iv: 32 hex chars>:<ciphertext: base64>`, PKCS#7 padded.
//! The IV is drawn fresh for every call.
//!
//! This format carries no MAC. Tampering is only noticed when the padding or
//! the JSON inside fails to parse.

use {
    base64::Engine,
    cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7},
    rand::RngCore,
};

use crate::{error::VaultError, keystore::MasterKey, record::RecordFormat, traits::RecordCipher};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV size for AES-CBC (one block).
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Separates the hex IV from the base64 ciphertext.
const DELIMITER: char = ':';

/// AES-256-CBC record cipher.
pub struct AesCbcCipher;

impl RecordCipher for AesCbcCipher {
    fn format(&self) -> RecordFormat {
        RecordFormat::AesV1
    }

    fn encrypt(&self, key: &MasterKey, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(key.bytes(), &iv)
            .map_err(|e| VaultError::CipherError(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(format!(
            "{}{DELIMITER}{}",
            hex::encode(iv),
            base64::engine::general_purpose::STANDARD.encode(ciphertext)
        ))
    }

    fn decrypt(&self, key: &MasterKey, payload: &str) -> Result<Vec<u8>, VaultError> {
        let (iv_hex, ct_b64) = payload
            .split_once(DELIMITER)
            .ok_or_else(|| VaultError::CipherError("missing IV delimiter".to_string()))?;

        let iv = hex::decode(iv_hex)?;
        if iv.len() != IV_LEN {
            return Err(VaultError::CipherError(format!(
                "IV has wrong length: {} (expected {IV_LEN})",
                iv.len()
            )));
        }

        let ciphertext = base64::engine::general_purpose::STANDARD.decode(ct_b64)?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(VaultError::CipherError(
                "ciphertext is not a whole number of blocks".to_string(),
            ));
        }

        Aes256CbcDec::new_from_slices(key.bytes(), &iv)
            .map_err(|e| VaultError::CipherError(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| VaultError::CipherError("invalid padding".to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashSet};

    #[test]
    fn round_trip() {
        let cipher = AesCbcCipher;
        let key = MasterKey::generate();
        let plaintext = br#"[{"id":"1","text":"hello"}]"#;

        let payload = cipher.encrypt(&key, plaintext).unwrap();
        let decrypted = cipher.decrypt(&key, &payload).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn payload_layout() {
        let cipher = AesCbcCipher;
        let key = MasterKey::generate();

        let payload = cipher.encrypt(&key, b"abc").unwrap();
        let (iv, ct) = payload.split_once(':').unwrap();
        assert_eq!(iv.len(), 32);
        let ct = base64::engine::general_purpose::STANDARD
            .decode(ct)
            .unwrap();
        assert_eq!(ct.len(), 16); // 3 bytes padded to one block
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = AesCbcCipher;
        let key = MasterKey::generate();

        let payload = cipher.encrypt(&key, b"").unwrap();
        assert!(cipher.decrypt(&key, &payload).unwrap().is_empty());
    }

    #[test]
    fn iv_never_repeats() {
        let cipher = AesCbcCipher;
        let key = MasterKey::generate();

        let payloads: HashSet<String> = (0..64)
            .map(|_| cipher.encrypt(&key, b"same plaintext").unwrap())
            .collect();
        assert_eq!(payloads.len(), 64);
    }

    #[test]
    fn wrong_key_does_not_yield_plaintext() {
        let cipher = AesCbcCipher;
        let key1 = MasterKey::generate();
        let key2 = MasterKey::generate();
        let plaintext = br#"{"streak":3}"#;

        let payload = cipher.encrypt(&key1, plaintext).unwrap();
        match cipher.decrypt(&key2, &payload) {
            Err(_) => {},
            Ok(bytes) => assert_ne!(bytes, plaintext),
        }
    }

    #[test]
    fn malformed_payloads_fail() {
        let cipher = AesCbcCipher;
        let key = MasterKey::generate();

        assert!(cipher.decrypt(&key, "no-delimiter").is_err());
        assert!(cipher.decrypt(&key, "zz:AAAA").is_err());
        assert!(
            cipher
                .decrypt(&key, "00112233445566778899aabbccddeeff:AAAA")
                .is_err()
        );
    }
}
