//! TOML-based configuration for Tally.
//!
//! Supports a config file (tally.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [engine]
//! timezone = "America/Sao_Paulo"
//! storage = "naive"
//! fill_gaps = true
//! max_limit = 1000
//!
//! [sources.sales_Order]
//! path = "${DATA_DIR}/orders.json"
//!
//! [sources.crm_Lead]
//! path = "./data/leads.jsonl"
//! storage = "aware"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;

use crate::engine::EngineOptions;
use crate::model::types::StorageMode;
use crate::source::{MemorySource, SourceCatalog, SourceError};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Failed to load source '{model}': {source}")]
    SourceLoad {
        model: String,
        #[source]
        source: SourceError,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Engine defaults.
    pub engine: EngineSettings,

    /// Data files served as models, keyed by model name.
    pub sources: HashMap<String, SourceSettings>,
}

/// Engine defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Default display timezone (IANA name).
    pub timezone: String,

    /// Default storage mode for sources that do not set one.
    pub storage: StorageMode,

    /// Densify date buckets by default.
    pub fill_gaps: bool,

    /// Hard cap on grouped rows.
    pub max_limit: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            storage: StorageMode::Aware,
            fill_gaps: false,
            max_limit: None,
        }
    }
}

impl EngineSettings {
    /// Parse the configured timezone.
    pub fn timezone(&self) -> Result<Tz, SettingsError> {
        parse_timezone(&self.timezone)
    }

    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            fill_gaps: self.fill_gaps,
            max_limit: self.max_limit,
        }
    }
}

/// A JSON data file served as a model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSettings {
    /// JSON array or JSON-lines file (supports ${ENV_VAR} expansion).
    pub path: String,

    /// Overrides the engine storage mode for this source.
    #[serde(default)]
    pub storage: Option<StorageMode>,
}

impl SourceSettings {
    /// Get the path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        expand_env_vars(&self.path).map(PathBuf::from)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TALLY_CONFIG`
    /// 2. `./tally.toml`
    /// 3. `~/.config/tally/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TALLY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tally.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tally").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Load every configured source into a catalog.
    pub async fn build_catalog(&self) -> Result<SourceCatalog, SettingsError> {
        let mut catalog = SourceCatalog::new();
        for (model, source) in &self.sources {
            let path = source.resolved_path()?;
            let storage = source.storage.unwrap_or(self.engine.storage);
            let loaded = MemorySource::from_json_file(model.as_str(), &path)
                .await
                .map_err(|source| SettingsError::SourceLoad {
                    model: model.clone(),
                    source,
                })?
                .with_storage(storage);
            tracing::debug!(model = %model, path = %path.display(), rows = loaded.len(), "loaded source");
            catalog.register(Arc::new(loaded));
        }
        Ok(catalog)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, SettingsError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| SettingsError::UnknownTimezone(name.to_string()))
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Lone '$'
                result.push('$');
                continue;
            }
            name
        };

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
