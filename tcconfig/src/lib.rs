//! # TwitchCast Configuration Module
//!
//! This module provides configuration management for TwitchCast, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//!
//! There is no global instance: the binary loads a [`Config`] once and hands
//! the values it needs to the controller.
//!
//! ## Usage
//!
//! ```no_run
//! use tcconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let relay = config.get_relay_base_url();
//! let timeout = config.get_launch_timeout_secs();
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{env, fs, path::Path, sync::Mutex};
use tracing::{debug, info};

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("twitchcast.yaml");

const ENV_CONFIG_DIR: &str = "TWITCHCAST_CONFIG";
const ENV_PREFIX: &str = "TWITCHCAST_CONFIG__";
const CONFIG_DIR_NAME: &str = ".twitchcast";
const CONFIG_FILE_NAME: &str = "config.yaml";

// Default values for configuration
pub const DEFAULT_RELAY_BASE_URL: &str = "http://nightdev.com/twitchcast";
pub const DEFAULT_METADATA_API_BASE: &str = "https://api.twitch.tv/kraken";
pub const DEFAULT_METADATA_CLIENT_ID: &str = "apbhlybpld3ybc6grv5c118xqpoz01c";
pub const DEFAULT_CAST_APP_ID: &str = "DAC1CD8C";
pub const DEFAULT_CAST_PORT: u16 = 8009;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_LAYOUT: &str = "right";
const DEFAULT_LOG_MIN_LEVEL: &str = "info";

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            self.get_string($path)
                .unwrap_or_else(|| $default.to_string())
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Macro to generate getter/setter for optional string values
macro_rules! impl_optional_string_config {
    ($getter:ident, $setter:ident, $path:expr) => {
        pub fn $getter(&self) -> Option<String> {
            self.get_string($path)
        }

        pub fn $setter(&self, value: Option<String>) -> Result<()> {
            self.set_value($path, value.map(Value::String).unwrap_or(Value::Null))
        }
    };
}

/// Configuration manager for TwitchCast
///
/// Holds the merged YAML tree (embedded defaults, then `config.yaml`, then
/// environment overrides) and exposes typed accessors over it.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.snapshot();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    ///
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `TWITCHCAST_CONFIG` environment variable
    /// 3. `.twitchcast` in the current directory
    /// 4. `.twitchcast` in the user's home directory
    pub fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    ///
    /// Nothing is written to disk; call [`Config::save`] to persist.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join(CONFIG_FILE_NAME)
            .to_string_lossy()
            .to_string();

        let external = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
                None
            }
        };

        let mut config_value = Self::merged_value(external.as_deref())?;
        Self::apply_env_overrides(&mut config_value, env::vars());

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Builds a configuration from a YAML document layered over the defaults.
    ///
    /// Environment variables are not consulted.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(Self::merged_value(Some(yaml))?),
        })
    }

    fn merged_value(external: Option<&str>) -> Result<Value> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(yaml) = external {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut default_value, &lower_keys_value(external_value));
        }
        Ok(lower_keys_value(default_value))
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(anyhow!("Configuration was not loaded from a directory"));
        }
        fs::create_dir_all(&self.config_dir)?;
        let yaml = serde_yaml::to_string(&self.snapshot())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["cast", "app_id"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))?;
        set_value_internal(&mut data, path, value)
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self
            .data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))?;
        get_value_internal(&data, path)
    }

    /// Non-empty string at `path`, `None` for null, missing or blank values.
    fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Ok(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                debug!(variable = %key, "Applying configuration override");
                let _ = set_value_internal(config, &key_path, convert_env_value(&value));
            }
        }
    }

    impl_optional_string_config!(get_device_name, set_device_name, &["device", "name"]);
    impl_optional_string_config!(get_device_host, set_device_host, &["device", "host"]);
    impl_string_config!(
        get_relay_base_url,
        set_relay_base_url,
        &["relay", "base_url"],
        DEFAULT_RELAY_BASE_URL
    );
    impl_string_config!(
        get_metadata_api_base,
        set_metadata_api_base,
        &["metadata", "api_base"],
        DEFAULT_METADATA_API_BASE
    );
    impl_string_config!(
        get_metadata_client_id,
        set_metadata_client_id,
        &["metadata", "client_id"],
        DEFAULT_METADATA_CLIENT_ID
    );
    impl_optional_string_config!(get_user_agent, set_user_agent, &["http", "user_agent"]);
    impl_u64_config!(
        get_http_timeout_secs,
        set_http_timeout_secs,
        &["http", "timeout_secs"],
        DEFAULT_HTTP_TIMEOUT_SECS
    );
    impl_string_config!(
        get_cast_app_id,
        set_cast_app_id,
        &["cast", "app_id"],
        DEFAULT_CAST_APP_ID
    );
    impl_u64_config!(
        get_launch_timeout_secs,
        set_launch_timeout_secs,
        &["cast", "launch_timeout_secs"],
        DEFAULT_LAUNCH_TIMEOUT_SECS
    );
    impl_u64_config!(
        get_discovery_timeout_secs,
        set_discovery_timeout_secs,
        &["cast", "discovery_timeout_secs"],
        DEFAULT_DISCOVERY_TIMEOUT_SECS
    );
    impl_string_config!(
        get_default_layout,
        set_default_layout,
        &["stream", "default_layout"],
        DEFAULT_LAYOUT
    );
    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["log", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    /// Chromecast port, `8009` unless overridden.
    pub fn get_cast_port(&self) -> u16 {
        match self.get_value(&["cast", "port"]) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_CAST_PORT),
            _ => DEFAULT_CAST_PORT,
        }
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for key in path {
        current = match current {
            Value::Mapping(map) => map
                .get(Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Key not found: {}", key))?,
            _ => return Err(anyhow!("Current node is not a map at {}", key)),
        };
    }
    Ok(current.clone())
}

fn convert_env_value(value: &str) -> Value {
    if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
        return parsed;
    }
    Value::String(value.to_string())
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        // scalars and sequences are replaced
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_relay_base_url(), DEFAULT_RELAY_BASE_URL);
        assert_eq!(config.get_cast_app_id(), "DAC1CD8C");
        assert_eq!(config.get_cast_port(), 8009);
        assert_eq!(config.get_launch_timeout_secs(), 10);
        assert_eq!(config.get_default_layout(), "right");
        assert_eq!(config.get_device_name(), None);
        assert_eq!(config.get_user_agent(), None);
    }

    #[test]
    fn test_external_yaml_is_merged_over_defaults() {
        let config = Config::from_yaml_str(
            "Device:\n  Name: Living Room TV\ncast:\n  launch_timeout_secs: 3\n",
        )
        .unwrap();
        assert_eq!(config.get_device_name().as_deref(), Some("Living Room TV"));
        assert_eq!(config.get_launch_timeout_secs(), 3);
        // untouched siblings keep their default
        assert_eq!(config.get_cast_app_id(), "DAC1CD8C");
    }

    #[test]
    fn test_env_overrides() {
        let mut value = Config::merged_value(None).unwrap();
        Config::apply_env_overrides(
            &mut value,
            vec![
                (
                    "TWITCHCAST_CONFIG__RELAY__BASE_URL".to_string(),
                    "http://127.0.0.1:9000".to_string(),
                ),
                ("TWITCHCAST_CONFIG__CAST__PORT".to_string(), "8010".to_string()),
                ("UNRELATED".to_string(), "ignored".to_string()),
            ],
        );
        let config = Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(value),
        };
        assert_eq!(config.get_relay_base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.get_cast_port(), 8010);
    }

    #[test]
    fn test_load_and_save_roundtrip_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "device:\n  host: 192.168.1.20\n",
        )
        .unwrap();

        let config = Config::load_config(&dir_str).unwrap();
        assert_eq!(config.get_device_host().as_deref(), Some("192.168.1.20"));

        config.set_default_layout("top".to_string()).unwrap();
        config.save().unwrap();

        let reloaded = Config::load_config(&dir_str).unwrap();
        assert_eq!(reloaded.get_default_layout(), "top");
    }

    #[test]
    fn test_blank_strings_read_as_absent() {
        let config = Config::from_yaml_str("http:\n  user_agent: '  '\n").unwrap();
        assert_eq!(config.get_user_agent(), None);
    }

    #[test]
    fn test_save_without_directory_fails() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert!(config.save().is_err());
    }
}
