//! Durable copy of the shared text.
//!
//! The text is kept as `{"dynamicString": "..."}` in a pretty-printed
//! JSON file. The registry holds the working copy; this store is read
//! once at startup and written on every accepted update.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Errors raised while reading or writing the text file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The file could not be read or written.
    #[error("text file I/O error at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file did not contain a valid text document.
    #[error("text file is not valid JSON: {source}")]
    Json {
        /// The underlying parse error.
        #[from]
        source: serde_json::Error,
    },
}

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextDocument {
    #[serde(default)]
    dynamic_string: Option<String>,
}

/// JSON file holding the persisted text.
#[derive(Debug, Clone)]
pub struct TextStore {
    path: PathBuf,
    default_text: String,
}

impl TextStore {
    /// Create a store for `path`, falling back to `default_text` when the
    /// file holds no usable value.
    pub fn new(path: impl Into<PathBuf>, default_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_text: default_text.into(),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted text.
    ///
    /// Returns `Ok(None)` if the file does not exist or carries no
    /// non-empty `dynamicString`.
    pub async fn read(&self) -> Result<Option<String>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let document: TextDocument = serde_json::from_slice(&raw)?;
        Ok(document.dynamic_string.filter(|text| !text.is_empty()))
    }

    /// Read the persisted text, falling back to the default on any
    /// problem. Used at startup, where a bad file must not stop the
    /// server.
    pub async fn load(&self) -> String {
        match self.read().await {
            Ok(Some(text)) => {
                info!(path = %self.path.display(), "Loaded persisted text");
                text
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No persisted text, using default");
                self.default_text.clone()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted text, using default");
                self.default_text.clone()
            }
        }
    }

    /// Persist `text`, creating parent directories as needed.
    ///
    /// Writes to a uniquely named temporary file in the same directory
    /// and renames it into place, so readers never see a half-written
    /// document and concurrent saves never share a staging file.
    pub async fn save(&self, text: &str) -> Result<(), StoreError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| self.io_error(source))?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        let document = TextDocument {
            dynamic_string: Some(text.to_owned()),
        };
        let json = serde_json::to_string_pretty(&document)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staging = tempfile::NamedTempFile::new_in(&dir)?;
            staging.write_all(json.as_bytes())?;
            staging.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| self.io_error(std::io::Error::other(e)))?
        .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
