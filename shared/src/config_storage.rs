//! Configuration storage for drift-scan settings.
//!
//! Settings are kept as pretty-printed JSON documents under a single root
//! directory, ~/.driftscan/ by default. The store is agnostic to the settings
//! type: anything serde can round-trip can be saved under a name.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name used for the scan session settings
pub const SCAN_CONFIG_NAME: &str = "scan_config";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode config: {0}")]
    Encode(serde_json::Error),

    #[error("Invalid config name: {0:?}")]
    InvalidName(String),
}

/// Configuration storage manager
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.driftscan)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.driftscan)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".driftscan");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn document_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root_path.join(format!("{name}.json")))
    }

    /// Load a named document.
    ///
    /// Returns Ok(None) if the document does not exist.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.document_path(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path)?;
        let value = serde_json::from_str(&text).map_err(|source| StorageError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded {}", path.display());
        Ok(Some(value))
    }

    /// Save a named document, creating the root directory if needed.
    ///
    /// Returns the path written.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, StorageError> {
        let path = self.document_path(name)?;
        std::fs::create_dir_all(&self.root_path)?;

        let text = serde_json::to_string_pretty(value).map_err(StorageError::Encode)?;
        std::fs::write(&path, text)?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }

    /// Delete a named document.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.document_path(name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    pub fn load_scan_config<T: DeserializeOwned>(&self) -> Result<Option<T>, StorageError> {
        self.load(SCAN_CONFIG_NAME)
    }

    pub fn save_scan_config<T: Serialize>(&self, config: &T) -> Result<PathBuf, StorageError> {
        self.save(SCAN_CONFIG_NAME, config)
    }

    pub fn delete_scan_config(&self) -> Result<bool, StorageError> {
        self.delete(SCAN_CONFIG_NAME)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".driftscan")))
    }
}
