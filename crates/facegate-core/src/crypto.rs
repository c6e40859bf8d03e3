use std::fmt;
use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const AES_GCM_KEY_BYTES: usize = 32;
const ENVELOPE_VERSION: u32 = 1;
const ENVELOPE_ALGORITHM: &str = "AES-256-GCM";
const ENVELOPE_NONCE_LEN: usize = 12;

/// 256-bit key for at-rest encryption of store files.
#[derive(Clone)]
pub struct StoreKey {
    bytes: Vec<u8>,
}

impl StoreKey {
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; AES_GCM_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> AppResult<Self> {
        if bytes.len() != AES_GCM_KEY_BYTES {
            return Err(AppError::Encryption(format!(
                "expected {AES_GCM_KEY_BYTES} key bytes but found {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| AppError::Encryption(format!("invalid key encoding: {err}")))?;
        Self::from_bytes(bytes)
    }

    /// Reads a base64-encoded key from `path`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let encoded = fs::read_to_string(path).map_err(|err| AppError::KeyFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_base64(&encoded).map_err(|err| AppError::KeyFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    version: u32,
    algorithm: String,
    nonce: String,
    ciphertext: String,
}

pub fn seal(plaintext: &[u8], key: &StoreKey) -> AppResult<EncryptedEnvelope> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Encryption("invalid AES-GCM key length".into()))?;
    let mut nonce = [0u8; ENVELOPE_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|err| AppError::Encryption(format!("failed to encrypt store file: {err}")))?;
    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: ENVELOPE_ALGORITHM.to_string(),
        nonce: general_purpose::STANDARD.encode(nonce),
        ciphertext: general_purpose::STANDARD.encode(ciphertext),
    })
}

pub fn open(envelope: &EncryptedEnvelope, key: &StoreKey) -> AppResult<Vec<u8>> {
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(AppError::Encryption(format!(
            "unsupported store algorithm '{}'",
            envelope.algorithm
        )));
    }
    if envelope.version != ENVELOPE_VERSION {
        return Err(AppError::Encryption(format!(
            "unsupported store version {}",
            envelope.version
        )));
    }

    let nonce_bytes = general_purpose::STANDARD
        .decode(envelope.nonce.trim())
        .map_err(|err| AppError::Encryption(format!("invalid nonce encoding: {err}")))?;
    if nonce_bytes.len() != ENVELOPE_NONCE_LEN {
        return Err(AppError::Encryption(format!(
            "expected nonce of {} bytes but found {}",
            ENVELOPE_NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let ciphertext = general_purpose::STANDARD
        .decode(envelope.ciphertext.trim())
        .map_err(|err| AppError::Encryption(format!("invalid ciphertext encoding: {err}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Encryption("invalid AES-GCM key length".into()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|err| AppError::Encryption(format!("failed to decrypt store file: {err}")))
}

/// Serializes a store record, sealing it when a key is configured.
pub fn encode_record(plaintext: Vec<u8>, key: Option<&StoreKey>) -> AppResult<Vec<u8>> {
    match key {
        Some(key) => {
            let envelope = seal(&plaintext, key)?;
            Ok(serde_json::to_vec_pretty(&envelope)?)
        }
        None => Ok(plaintext),
    }
}

/// Inverse of [`encode_record`]. Without a key only plain JSON is readable;
/// with a key only sealed records are.
pub fn decode_record(data: Vec<u8>, key: Option<&StoreKey>, path: &Path) -> AppResult<Vec<u8>> {
    let envelope = serde_json::from_slice::<EncryptedEnvelope>(&data).ok();
    match (envelope, key) {
        (Some(envelope), Some(key)) => open(&envelope, key),
        (Some(_), None) => Err(AppError::EncryptedStoreRequiresKey {
            path: path.to_path_buf(),
        }),
        (None, Some(_)) => Err(AppError::UnencryptedStoreFile {
            path: path.to_path_buf(),
        }),
        (None, None) => Ok(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn sealed_payload_opens_with_same_key() {
        let key = StoreKey::generate();
        let envelope = seal(b"[0.1,0.2]", &key).unwrap();
        assert_eq!(open(&envelope, &key).unwrap(), b"[0.1,0.2]");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let envelope = seal(b"secret", &StoreKey::generate()).unwrap();
        let err = open(&envelope, &StoreKey::generate()).unwrap_err();
        assert!(matches!(err, AppError::Encryption(_)));
    }

    #[test]
    fn key_file_round_trips_through_base64() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.key");
        let key = StoreKey::generate();
        fs::write(&path, format!("{}\n", key.to_base64())).unwrap();

        let loaded = StoreKey::load(&path).unwrap();
        assert_eq!(loaded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn short_keys_are_rejected() {
        let err = StoreKey::from_bytes(vec![1u8; 16]).unwrap_err();
        assert!(matches!(err, AppError::Encryption(_)));
    }

    #[test]
    fn sealed_record_needs_a_key_to_decode() {
        let key = StoreKey::generate();
        let path = Path::new("alice.json");
        let sealed = encode_record(b"{\"a\":1}".to_vec(), Some(&key)).unwrap();
        assert_eq!(
            decode_record(sealed.clone(), Some(&key), path).unwrap(),
            b"{\"a\":1}"
        );
        assert!(matches!(
            decode_record(sealed, None, path).unwrap_err(),
            AppError::EncryptedStoreRequiresKey { .. }
        ));
        assert_eq!(
            decode_record(b"{\"a\":1}".to_vec(), None, path).unwrap(),
            b"{\"a\":1}"
        );
    }

    #[test]
    fn keyed_store_refuses_plaintext_records() {
        let key = StoreKey::generate();
        let err = decode_record(b"{\"a\":1}".to_vec(), Some(&key), Path::new("planted.json"))
            .unwrap_err();
        assert!(matches!(err, AppError::UnencryptedStoreFile { .. }));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
