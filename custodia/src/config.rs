//! Process-wide settings: KMS key id, hash salt and store options.
//!
//! Settings are assembled from layers (TOML file, then environment, the
//! latter taking precedence) and frozen into an immutable [`Settings`]
//! before any service is constructed.
//!
//! Environment convention: `CUSTODIA_<FIELD>`.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;

/// Table used when none is configured.
pub const DEFAULT_TABLE_NAME: &str = "customers";

/// Records decoded concurrently during a scan when none is configured.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Fully resolved settings.
#[derive(Debug)]
pub struct Settings {
    kms_key_id: Option<String>,
    hash_salt: SecretString,
    table_name: String,
    decode_concurrency: usize,
}

impl Settings {
    /// Creates settings with the given salt and defaults for everything else.
    #[must_use]
    pub fn new(hash_salt: impl Into<String>) -> Self {
        Self {
            kms_key_id: None,
            hash_salt: SecretString::new(hash_salt.into()),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            decode_concurrency: DEFAULT_DECODE_CONCURRENCY,
        }
    }

    /// Sets the KMS key id, ARN or alias.
    #[must_use]
    pub fn with_kms_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.kms_key_id = Some(key_id.into());
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the scan decode concurrency; zero is treated as one.
    #[must_use]
    pub fn with_decode_concurrency(mut self, limit: usize) -> Self {
        self.decode_concurrency = limit.max(1);
        self
    }

    /// Loads settings from an optional TOML file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, if an
    /// environment value is malformed, or if the hash salt is missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut layer = SettingsLayer::default();
        if let Some(path) = path {
            layer.merge(SettingsLayer::from_toml_file(path)?);
        }
        layer.merge(SettingsLayer::from_env_with(|name| std::env::var(name).ok())?);
        layer.finalize()
    }

    /// Returns the KMS key id, if configured.
    #[must_use]
    pub fn kms_key_id(&self) -> Option<&str> {
        self.kms_key_id.as_deref()
    }

    /// Returns the hash salt.
    #[must_use]
    pub const fn hash_salt(&self) -> &SecretString {
        &self.hash_salt
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the scan decode concurrency.
    #[must_use]
    pub const fn decode_concurrency(&self) -> usize {
        self.decode_concurrency
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct KmsLayer {
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HashingLayer {
    #[serde(default)]
    pub salt: Option<SecretString>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreLayer {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub decode_concurrency: Option<usize>,
}

/// Partial settings, for merging.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsLayer {
    #[serde(default)]
    pub kms: KmsLayer,
    #[serde(default)]
    pub hashing: HashingLayer,
    #[serde(default)]
    pub store: StoreLayer,
}

impl SettingsLayer {
    /// Parses a layer from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileRead` or `ConfigError::TomlParse`.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
        toml::from_str(&content)
            .map_err(|source| ConfigError::TomlParse { path: path.to_path_buf(), source })
    }

    /// Builds a layer from environment-style lookups.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric value does not parse.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let decode_concurrency = match var("CUSTODIA_DECODE_CONCURRENCY") {
            Some(v) => Some(v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CUSTODIA_DECODE_CONCURRENCY".to_string(),
                message: format!("invalid integer '{v}'"),
            })?),
            None => None,
        };

        Ok(Self {
            kms: KmsLayer { key_id: var("CUSTODIA_KMS_KEY_ID") },
            hashing: HashingLayer { salt: var("CUSTODIA_HASH_SALT").map(SecretString::new) },
            store: StoreLayer { table_name: var("CUSTODIA_TABLE_NAME"), decode_concurrency },
        })
    }

    /// Overlays `other` onto `self`; set values in `other` win.
    pub fn merge(&mut self, other: Self) {
        if other.kms.key_id.is_some() {
            self.kms.key_id = other.kms.key_id;
        }
        if other.hashing.salt.is_some() {
            self.hashing.salt = other.hashing.salt;
        }
        if other.store.table_name.is_some() {
            self.store.table_name = other.store.table_name;
        }
        if other.store.decode_concurrency.is_some() {
            self.store.decode_concurrency = other.store.decode_concurrency;
        }
    }

    /// Resolves the layer into settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no non-empty hash salt was provided.
    pub fn finalize(self) -> Result<Settings, ConfigError> {
        let hash_salt = self
            .hashing
            .salt
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or(ConfigError::Missing("hashing.salt"))?;

        Ok(Settings {
            kms_key_id: self.kms.key_id.filter(|k| !k.trim().is_empty()),
            hash_salt,
            table_name: self.store.table_name.unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            decode_concurrency: self
                .store
                .decode_concurrency
                .unwrap_or(DEFAULT_DECODE_CONCURRENCY)
                .max(1),
        })
    }
}
