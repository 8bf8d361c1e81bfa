//! # Application Configuration
//!
//! Loads the optional `aspect.toml` file.
//!
//! ```toml
//! [model]
//! meta_model_version = "2.1.0"
//! urn_scheme = "urn:samm"
//!
//! [storage]
//! backend = "redb"
//! database = "models.db"
//! ```
//!
//! Search order: the explicit `--config` path, then `aspect.toml` in the
//! working directory, then built-in defaults. Command-line flags override
//! whatever the file says.

use aspect_core::{AspectError, ModelConfig};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "aspect.toml";

/// Default database path.
pub const DEFAULT_DATABASE: &str = "aspect.db";

/// Where imported statements are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Binary snapshot file.
    #[default]
    File,
    /// redb database.
    Redb,
}

impl FromStr for Backend {
    type Err = AspectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "redb" => Ok(Self::Redb),
            other => Err(AspectError::StoreError(format!(
                "Unknown backend: {other}. Use: file, redb"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Redb => write!(f, "redb"),
        }
    }
}

/// The `[storage]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            database: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Parse the TOML text of a config file.
    pub fn from_toml_str(text: &str) -> Result<Self, AspectError> {
        toml::from_str(text).map_err(|e| {
            AspectError::DeserializationError(format!("Failed to parse TOML configuration: {e}"))
        })
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        database: Option<PathBuf>,
        backend: Option<&str>,
    ) -> Result<Self, AspectError> {
        if let Some(database) = database {
            self.storage.database = database;
        }
        if let Some(backend) = backend {
            self.storage.backend = backend.parse()?;
        }
        Ok(self)
    }
}

/// Find and load the configuration.
///
/// An explicit path that does not exist is an error; a missing local file
/// is not.
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig, AspectError> {
    if let Some(path) = explicit_path {
        info!(path = %path.display(), "loading configuration from explicit path");
        return load_config_file(path);
    }

    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.exists() {
        info!(path = %local.display(), "loading configuration from working directory");
        return load_config_file(local);
    }

    debug!("no configuration file found, using defaults");
    Ok(AppConfig::default())
}

fn load_config_file(path: &Path) -> Result<AppConfig, AspectError> {
    if !path.exists() {
        return Err(AspectError::IoError(format!(
            "Missing configuration file: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| AspectError::IoError(format!("Read config: {e}")))?;
    AppConfig::from_toml_str(&content)
}

// =============================================================================
// TESTS
// =============================================================================
