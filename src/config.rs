use crate::{error::KeyError, paths::NuidCodec};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

/// Global static variable to hold the config provider.
pub static CONFIG_PROVIDER: OnceCell<Mutex<Arc<dyn ConfigProvider>>> = OnceCell::new();

pub const DEFAULT_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";
pub const DEFAULT_SEGMENT_WIDTH: usize = 3;
pub const DEFAULT_FILTER_WEIGHT: u32 = 50;
pub const MAX_FILTER_WEIGHT: u32 = 100;

/// Shape of the node identifiers. Fixed for the lifetime of a key: changing either value after
/// nodes exist invalidates every stored path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NuidConfig {
    pub segment_width: usize,
    pub alphabet: String,
}

impl Default for NuidConfig {
    fn default() -> Self {
        NuidConfig {
            segment_width: DEFAULT_SEGMENT_WIDTH,
            alphabet: DEFAULT_ALPHABET.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub nuid: NuidConfig,
    pub default_filter_weight: u32,
    pub max_filter_weight: u32,
    /// Prepended to image identifiers when children caches resolve `image_url`.
    pub image_url_prefix: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            nuid: NuidConfig::default(),
            default_filter_weight: DEFAULT_FILTER_WEIGHT,
            max_filter_weight: MAX_FILTER_WEIGHT,
            image_url_prefix: String::new(),
        }
    }
}

impl KeyConfig {
    pub fn from_toml_str(content: &str) -> Result<KeyConfig, KeyError> {
        let config: KeyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KeyError> {
        NuidCodec::new(&self.nuid)?;
        if self.default_filter_weight > self.max_filter_weight {
            return Err(KeyError::Config(format!(
                "default filter weight {} exceeds maximum {}",
                self.default_filter_weight, self.max_filter_weight
            )));
        }
        Ok(())
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<KeyConfig, KeyError>;
    fn set_config(&self, config: &KeyConfig) -> Result<(), KeyError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<KeyConfig, KeyError> {
        tracing::debug!("Attempting to read key config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(KeyConfig::default());
        }
        let content = read_to_string(&self.path)?;
        KeyConfig::from_toml_str(&content)
    }

    fn set_config(&self, config: &KeyConfig) -> Result<(), KeyError> {
        tracing::debug!("Attempting to write key config to: {:?}", &self.path);
        config.validate()?;
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

/// Read the configuration from the globally registered [ConfigProvider], falling back to
/// [KeyConfig::default] when none has been installed.
pub fn current_config() -> Result<KeyConfig, KeyError> {
    match CONFIG_PROVIDER.get() {
        Some(provider) => {
            let provider = provider
                .lock()
                .map_err(|e| KeyError::Config(format!("config provider lock poisoned: {e}")))?
                .clone();
            provider.get_config()
        }
        None => Ok(KeyConfig::default()),
    }
}
