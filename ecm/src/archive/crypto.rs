//! AES-256-GCM encryption with an Argon2id-derived key, for the optional
//! encrypted variant of the export archive.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, Params};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{EcmError, Result};

pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 4-byte magic prefix on every encrypted archive, identifying the format
/// before the key-derivation header and ciphertext.
pub const MAGIC_HEADER: [u8; 4] = [b'E', b'C', b'M', 0x00];

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives a 256-bit key from `passphrase` and `salt` via Argon2id, tuned
/// for an interactive CLI unlock rather than a high-throughput service.
pub fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(KEY_LEN))
        .map_err(|e| EcmError::Archive(format!("invalid Argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt_string = SaltString::encode_b64(salt)
        .map_err(|e| EcmError::Archive(format!("cannot encode salt: {e}")))?;
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt_string)
        .map_err(|e| EcmError::Archive(format!("key derivation failed: {e}")))?;
    let output = hash.hash.ok_or_else(|| EcmError::Archive("argon2 produced no hash output".into()))?;
    let bytes = output.as_bytes();
    if bytes.len() < KEY_LEN {
        return Err(EcmError::Archive("argon2 hash output too short".into()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes[..KEY_LEN]);
    Ok(key)
}

pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self { cipher: Aes256Gcm::new_from_slice(key).expect("key is exactly KEY_LEN bytes") }
    }

    /// Returns `nonce || ciphertext` (ciphertext includes the AEAD tag).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| EcmError::Archive(format!("encryption failed: {e}")))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < NONCE_LEN + TAG_LEN {
            return Err(EcmError::Archive("encrypted payload too short".into()));
        }
        let nonce = Nonce::from_slice(&encrypted[..NONCE_LEN]);
        self.cipher
            .decrypt(nonce, &encrypted[NONCE_LEN..])
            .map_err(|e| EcmError::Archive(format!("decryption failed: {e}")))
    }
}

/// Wraps `plaintext` with the magic header, salt and encrypted body.
pub fn seal(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt)?;
    let encryptor = Encryptor::new(&key);
    let body = encryptor.encrypt(plaintext)?;

    let mut out = Vec::with_capacity(MAGIC_HEADER.len() + SALT_LEN + body.len());
    out.extend_from_slice(&MAGIC_HEADER);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Inverse of [`seal`]: verifies the magic header, re-derives the key from
/// the embedded salt, and decrypts the remainder.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < MAGIC_HEADER.len() + SALT_LEN {
        return Err(EcmError::Archive("archive too short to contain a header".into()));
    }
    if sealed[..MAGIC_HEADER.len()] != MAGIC_HEADER {
        return Err(EcmError::Archive("not an ECM encrypted archive".into()));
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&sealed[MAGIC_HEADER.len()..MAGIC_HEADER.len() + SALT_LEN]);
    let key = derive_key(passphrase, &salt)?;
    let encryptor = Encryptor::new(&key);
    encryptor.decrypt(&sealed[MAGIC_HEADER.len() + SALT_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_roundtrips() {
        let sealed = seal("correct horse battery staple", b"hello archive").unwrap();
        let opened = open("correct horse battery staple", &sealed).unwrap();
        assert_eq!(opened, b"hello archive");
    }

    #[test]
    fn open_rejects_wrong_passphrase() {
        let sealed = seal("right", b"secret payload").unwrap();
        assert!(open("wrong", &sealed).is_err());
    }

    #[test]
    fn open_rejects_missing_magic_header() {
        let err = open("anything", b"not an archive at all, too short").unwrap_err();
        assert!(matches!(err, EcmError::Archive(_)));
    }

    #[test]
    fn derive_key_is_deterministic_for_same_salt() {
        let salt = [7u8; SALT_LEN];
        let a = derive_key("pw", &salt).unwrap();
        let b = derive_key("pw", &salt).unwrap();
        assert_eq!(a, b);
    }
}
