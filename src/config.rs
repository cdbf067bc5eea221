//! Configuration for the schema tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (santa.toml, .santa.toml, config/santa.toml)
//! - The XDG config directory
//! - An explicit `--config` file
//! - Environment variables (SANTA__*)
//!
//! ## Example config file (santa.toml):
//! ```toml
//! [paths]
//! schemas_dir = "./schemas"
//! validators_dir = "./validators"
//! extension = ".json"
//!
//! [cluster]
//! database = "secret_santa"
//!
//! [provision]
//! strict = false
//!
//! [output]
//! format = "text"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::defaults::PROVISION_ORDER;
use crate::registry::DEFAULT_EXTENSION;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SantaConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub provision: ProvisionConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Where schema sources and exported validators live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Entity schema sources. Unset means the built-in schemas.
    #[serde(default)]
    pub schemas_dir: Option<PathBuf>,

    /// Native validator files
    #[serde(default = "default_validators_dir")]
    pub validators_dir: PathBuf,

    /// Source file suffix
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_database")]
    pub database: String,

    /// Provisioning order by collection name
    #[serde(default = "default_order")]
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Skip collections whose lint has errors
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Report format for the binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn default_validators_dir() -> PathBuf {
    PathBuf::from("validators")
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_database() -> String {
    "secret_santa".to_string()
}

fn default_order() -> Vec<String> {
    PROVISION_ORDER.iter().map(|s| s.to_string()).collect()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            schemas_dir: None,
            validators_dir: default_validators_dir(),
            extension: default_extension(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            order: default_order(),
        }
    }
}

impl SantaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering `config_path` over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["santa.toml", ".santa.toml", "config/santa.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "secret-santa", "santa") {
            let xdg_config = dirs.config_dir().join("santa.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SANTA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Validator directory, resolved against the current directory
    pub fn validators_dir(&self) -> PathBuf {
        resolve(&self.paths.validators_dir)
    }

    pub fn schemas_dir(&self) -> Option<PathBuf> {
        self.paths.schemas_dir.as_deref().map(resolve)
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
