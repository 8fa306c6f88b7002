//! Configuration loading and typed config structures.
//!
//! Settings are layered with the [`config`](::config) crate, later sources
//! overriding earlier ones:
//!
//! 1. Built-in defaults (every field has one)
//! 2. An optional `livetext.{toml,yaml}` file, or the file stem named
//!    by `LIVETEXT_CONFIG`
//! 3. Environment variables prefixed `LIVETEXT__`, with `__` between
//!    nested keys (e.g. `LIVETEXT__SERVER__PORT=8080`)

use std::path::PathBuf;

use livetext_broadcast::BroadcastConfig;
use serde::Deserialize;

/// Environment variable naming an alternative config file stem.
pub const CONFIG_PATH_ENV: &str = "LIVETEXT_CONFIG";

/// Config file stem used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_STEM: &str = "livetext";

/// Text shown before anyone has set one.
pub const DEFAULT_TEXT: &str = "default dynamic string";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or the merged settings did not match
    /// the expected shape.
    #[error("failed to load configuration: {source}")]
    Load {
        /// The underlying loader error.
        #[from]
        source: ::config::ConfigError,
    },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LiveTextConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Registry expiry and write deadlines.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Where the text is persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 4321,
        }
    }
}

/// Configuration for the persisted text file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the JSON file holding the text.
    pub text_path: PathBuf,
    /// Text served when the file is missing or empty.
    pub default_text: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            text_path: PathBuf::from("data/text.json"),
            default_text: String::from(DEFAULT_TEXT),
        }
    }
}

/// Configuration for log output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl LiveTextConfig {
    /// Load configuration from the default file stem (or
    /// `LIVETEXT_CONFIG`) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let stem =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_STEM.to_owned());
        Self::load_from(&stem)
    }

    /// Load configuration from the given file stem and the environment.
    ///
    /// The file is optional; a missing file leaves the defaults in place.
    pub fn load_from(stem: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(stem).required(false))
            .add_source(
                ::config::Environment::with_prefix("LIVETEXT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
