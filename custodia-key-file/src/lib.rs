//! File-backed key-management oracle for `custodia`.
//!
//! Key-encryption keys live in a local directory and every encrypt call
//! seals the value under a fresh data key. Suitable for development,
//! tests and the command-line tool; production deployments use a real
//! KMS.

#![warn(clippy::pedantic, clippy::nursery)]

pub mod envelope;

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use custodia::context::FieldContext;
use custodia::error::KmsError;
use custodia::kms::KeyManagementClient;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use zeroize::Zeroizing;

use crate::envelope::Envelope;

/// Size of KEKs and DEKs in bytes.
pub const KEY_SIZE: usize = 32;

const NONCE_SIZE: usize = 12;

/// Key id that resolves to whatever KEK `current` points at.
pub const CURRENT_KEY_ALIAS: &str = "current";

const CURRENT_FILE: &str = "current";

/// File-based oracle.
///
/// Directory layout:
/// ```text
/// keys/
/// ├── kek_v1.key      (32 bytes, 0600 permissions)
/// ├── kek_v2.key      (32 bytes, 0600 permissions)
/// └── current         (text: id of the active KEK, e.g. "kek_v2")
/// ```
pub struct FileKms {
    key_dir: PathBuf,
    keks: RwLock<HashMap<String, SecretVec<u8>>>,
}

impl FileKms {
    /// Opens an existing key directory.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Service` if the directory doesn't exist.
    pub fn open(key_dir: impl Into<PathBuf>) -> Result<Self, KmsError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KmsError::Service(format!(
                "key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self { key_dir, keks: RwLock::new(HashMap::new()) })
    }

    /// Creates `key_dir` with a first KEK and opens it.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Io` if the directory or key file cannot be written.
    pub fn init(key_dir: impl Into<PathBuf>) -> Result<Self, KmsError> {
        let key_dir = key_dir.into();
        fs::create_dir_all(&key_dir)?;
        let kms = Self::open(key_dir)?;
        kms.create_kek()?;
        Ok(kms)
    }

    /// Directory the keys are read from.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Generates the next KEK version and makes it current.
    ///
    /// Older KEKs are kept so existing ciphertext stays readable.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Io` if the key or `current` file cannot be written.
    pub fn create_kek(&self) -> Result<String, KmsError> {
        let next = self.kek_versions()?.into_iter().max().unwrap_or(0) + 1;
        let kek_id = format!("kek_v{next}");

        let mut kek = Zeroizing::new(vec![0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut kek);
        write_private(&self.kek_path(&kek_id), &kek)?;
        fs::write(self.key_dir.join(CURRENT_FILE), kek_id.as_bytes())?;

        tracing::info!(kek_id = %kek_id, dir = %self.key_dir.display(), "created KEK");
        Ok(kek_id)
    }

    /// Id of the active KEK.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::KeyNotFound` if no KEK has been created yet.
    pub fn current_kek_id(&self) -> Result<String, KmsError> {
        match fs::read_to_string(self.key_dir.join(CURRENT_FILE)) {
            Ok(id) => Ok(id.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KmsError::KeyNotFound(CURRENT_KEY_ALIAS.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn kek_path(&self, kek_id: &str) -> PathBuf {
        self.key_dir.join(format!("{kek_id}.key"))
    }

    fn kek_versions(&self) -> Result<Vec<u32>, KmsError> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.key_dir)? {
            let name = entry?.file_name();
            let version = name
                .to_str()
                .and_then(|n| n.strip_suffix(".key"))
                .and_then(parse_kek_version);
            versions.extend(version);
        }
        Ok(versions)
    }

    fn resolve(&self, key_id: &str) -> Result<String, KmsError> {
        if key_id == CURRENT_KEY_ALIAS {
            self.current_kek_id()
        } else {
            Ok(key_id.to_string())
        }
    }

    /// Runs `f` with the KEK, loading it on first use.
    fn with_kek<T>(&self, kek_id: &str, f: impl FnOnce(&[u8]) -> T) -> Result<T, KmsError> {
        if let Some(kek) = self.keks.read().get(kek_id) {
            return Ok(f(kek.expose_secret()));
        }

        // Only well-formed ids reach the filesystem.
        if parse_kek_version(kek_id).is_none() {
            return Err(KmsError::KeyNotFound(kek_id.to_string()));
        }
        let bytes = match fs::read(self.kek_path(kek_id)) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KmsError::KeyNotFound(kek_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() != KEY_SIZE {
            return Err(KmsError::Service(format!("KEK {kek_id} has wrong size: {} bytes", bytes.len())));
        }

        let result = f(&bytes);
        self.keks.write().insert(kek_id.to_string(), SecretVec::new(bytes.to_vec()));
        Ok(result)
    }
}

fn parse_kek_version(kek_id: &str) -> Option<u32> {
    kek_id.strip_prefix("kek_v")?.parse().ok()
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), KmsError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(bytes)?;
    Ok(())
}

/// Seals `msg` under `key`, binding `aad`.
fn seal(key: &[u8], nonce: &[u8; NONCE_SIZE], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| KmsError::Service(format!("invalid key: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| KmsError::Service(format!("ChaCha20-Poly1305 encryption failed: {e}")))
}

fn unseal(key: &[u8], nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
    if nonce.len() != NONCE_SIZE {
        return Err(KmsError::InvalidCiphertext("invalid nonce size".to_string()));
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| KmsError::Service(format!("invalid key: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| KmsError::InvalidCiphertext("authentication failed".to_string()))
}

#[async_trait]
impl KeyManagementClient for FileKms {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &FieldContext,
    ) -> Result<Vec<u8>, KmsError> {
        let kek_id = self.resolve(key_id)?;

        let mut dek = Zeroizing::new(vec![0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut dek);

        // The DEK is bound to the KEK id so a header edit cannot redirect it.
        let wrap_nonce = random_nonce();
        let sealed_dek = self.with_kek(&kek_id, |kek| seal(kek, &wrap_nonce, &dek, kek_id.as_bytes()))??;
        let mut wrapped_dek = wrap_nonce.to_vec();
        wrapped_dek.extend_from_slice(&sealed_dek);

        let nonce = random_nonce();
        let ciphertext = seal(&dek, &nonce, plaintext, context.to_string().as_bytes())?;

        Envelope { kek_id, wrapped_dek, nonce: nonce.to_vec() }.seal(&ciphertext)
    }

    async fn decrypt(&self, ciphertext: &[u8], context: &FieldContext) -> Result<Vec<u8>, KmsError> {
        let (envelope, body) = Envelope::open(ciphertext)?;
        if envelope.wrapped_dek.len() <= NONCE_SIZE {
            return Err(KmsError::InvalidCiphertext("wrapped DEK truncated".to_string()));
        }

        let (wrap_nonce, sealed_dek) = envelope.wrapped_dek.split_at(NONCE_SIZE);
        let dek = self.with_kek(&envelope.kek_id, |kek| {
            unseal(kek, wrap_nonce, sealed_dek, envelope.kek_id.as_bytes())
        })??;
        let dek = Zeroizing::new(dek);

        unseal(&dek, &envelope.nonce, body, context.to_string().as_bytes())
    }
}
