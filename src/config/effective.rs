//! Effective configuration with provenance
//!
//! Records the merged value, which sources contributed to it, and the typed
//! [`Settings`] deserialized from it. Relative paths are resolved against
//! the project root, which is the directory holding the config file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::jobs::ExecutionMode;
use crate::reports::ReportDestinations;

/// Config file looked up in the project root when none is given
pub const CONFIG_FILENAME: &str = "lens.toml";

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathSettings {
    pub src: PathBuf,
    pub cache: PathBuf,
    pub core: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    pub lock_timeout_seconds: u64,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSettings {
    pub mode: ExecutionMode,
    pub workers: usize,
}

/// Typed view of the merged configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub paths: PathSettings,
    pub cache: CacheSettings,
    pub jobs: JobSettings,
    #[serde(default)]
    pub reports: ReportDestinations,
}

/// Merged configuration
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// Directory relative paths are resolved against
    pub project_root: PathBuf,

    /// The merged value
    pub config: Value,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,

    pub settings: Settings,
}

impl EffectiveConfig {
    /// Build the effective config.
    ///
    /// An explicit `config_file` must exist and its directory becomes the
    /// project root. Without one, `lens.toml` in `project_root` is used when
    /// present.
    pub fn build(
        project_root: &Path,
        config_file: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        let (project_root, file) = match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                let root = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                (root, Some(path.to_path_buf()))
            }
            None => {
                let candidate = project_root.join(CONFIG_FILENAME);
                let file = candidate.is_file().then_some(candidate);
                (project_root.to_path_buf(), file)
            }
        };

        if let Some(path) = file {
            let (value, digest) = Self::load_toml_file(&path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validate(&settings)?;

        Ok(Self {
            created_at: Utc::now(),
            project_root,
            config: merged,
            sources,
            settings,
        })
    }

    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let table: toml::Table = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml::Value::Table(table)), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn validate(settings: &Settings) -> Result<(), ConfigError> {
        if settings.jobs.workers == 0 {
            return Err(ConfigError::ValidationError(
                "jobs.workers must be at least 1".to_string(),
            ));
        }
        if settings.cache.lock_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "cache.lock_timeout_seconds must be positive".to_string(),
            ));
        }
        settings
            .reports
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Watched source root
    pub fn source_root(&self) -> PathBuf {
        self.resolve(&self.settings.paths.src)
    }

    /// Cache root
    pub fn cache_root(&self) -> PathBuf {
        self.resolve(&self.settings.paths.cache)
    }

    /// Tool install root
    pub fn core_root(&self) -> PathBuf {
        self.resolve(&self.settings.paths.core)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.cache.lock_timeout_seconds)
    }

    /// Get a merged value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.config, |current, part| current.get(part))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
