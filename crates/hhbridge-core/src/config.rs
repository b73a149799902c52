//! Application configuration management.
//!
//! Settings are a fixed set of named keys (`HH_CLIENT_ID`, `B24_BASE_URL`,
//! ...). Defaults are resolved once, usually from the environment; stored
//! overrides are layered on top on every read, so a change made between two
//! calls is picked up by the second one.
//!
//! Overrides are stored at `~/.config/hhbridge/config.json`.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "hhbridge";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Loopback redirect used when `HH_REDIRECT_URI` is not set
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8735/oauth";

/// Effective settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub hh_client_id: String,
    pub hh_client_secret: String,
    pub hh_employer_id: String,
    pub hh_redirect_uri: String,
    pub b24_base_url: String,
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub b24_vacancies_entity_type_id: i64,
    pub b24_recruiters_department: String,
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub b24_resume_category_id: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hh_client_id: String::new(),
            hh_client_secret: String::new(),
            hh_employer_id: String::new(),
            hh_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            b24_base_url: String::new(),
            b24_vacancies_entity_type_id: 0,
            b24_recruiters_department: String::new(),
            b24_resume_category_id: 0,
        }
    }
}

impl Config {
    /// Every recognized setting name
    pub const KEYS: [&'static str; 8] = [
        "HH_CLIENT_ID",
        "HH_CLIENT_SECRET",
        "HH_EMPLOYER_ID",
        "HH_REDIRECT_URI",
        "B24_BASE_URL",
        "B24_VACANCIES_ENTITY_TYPE_ID",
        "B24_RECRUITERS_DEPARTMENT",
        "B24_RESUME_CATEGORY_ID",
    ];

    const INTEGER_KEYS: [&'static str; 2] =
        ["B24_VACANCIES_ENTITY_TYPE_ID", "B24_RESUME_CATEGORY_ID"];

    /// Defaults taken from environment variables of the same names.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults taken from an arbitrary key lookup; missing keys keep the
    /// built-in default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut overrides = ConfigOverrides::default();
        for key in Self::KEYS {
            let Some(raw) = lookup(key) else { continue };
            match ConfigOverrides::from_pair(key, &raw) {
                Ok(single) => overrides.merge(single),
                Err(e) => warn!(key, error = %e, "Ignoring invalid default"),
            }
        }
        overrides.apply(Self::default())
    }

    pub fn is_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Look up one setting by its name
    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        json.get(key).cloned()
    }
}

/// Partial settings as stored or submitted by the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hh_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hh_client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hh_employer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hh_redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b24_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "number | null"))]
    pub b24_vacancies_entity_type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b24_recruiters_department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "number | null"))]
    pub b24_resume_category_id: Option<i64>,
}

impl ConfigOverrides {
    /// Build a single-key override from its textual value.
    pub fn from_pair(key: &str, raw: &str) -> Result<Self> {
        if !Config::is_key(key) {
            anyhow::bail!("Unknown setting: {}", key);
        }
        let value = if Config::INTEGER_KEYS.contains(&key) {
            let number: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer", key))?;
            serde_json::Value::from(number)
        } else {
            serde_json::Value::from(raw)
        };
        let mut object = serde_json::Map::new();
        object.insert(key.to_string(), value);
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    /// Overlay `other` on top of `self`
    pub fn merge(&mut self, other: ConfigOverrides) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            hh_client_id,
            hh_client_secret,
            hh_employer_id,
            hh_redirect_uri,
            b24_base_url,
            b24_vacancies_entity_type_id,
            b24_recruiters_department,
            b24_resume_category_id
        );
    }

    pub fn apply(&self, mut base: Config) -> Config {
        macro_rules! put {
            ($($field:ident),*) => {
                $(if let Some(ref value) = self.$field { base.$field = value.clone(); })*
            };
        }
        put!(
            hh_client_id,
            hh_client_secret,
            hh_employer_id,
            hh_redirect_uri,
            b24_base_url,
            b24_vacancies_entity_type_id,
            b24_recruiters_department,
            b24_resume_category_id
        );
        base
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Read-through access to settings. No caching: every `get` reflects the
/// latest stored overrides.
pub trait ConfigStore: Send + Sync {
    fn get(&self) -> Result<Config>;
    fn set(&self, partial: ConfigOverrides) -> Result<()>;
    /// Drop all overrides, returning to defaults
    fn reset(&self) -> Result<()>;
}

/// Overrides persisted as JSON on disk.
pub struct JsonFileConfigStore {
    path: PathBuf,
    defaults: Config,
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub fn new(path: PathBuf, defaults: Config) -> Self {
        Self {
            path,
            defaults,
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the platform config directory
    pub fn open_default(defaults: Config) -> Result<Self> {
        Ok(Self::new(config_path()?, defaults))
    }

    fn load_overrides(&self) -> Result<ConfigOverrides> {
        if !self.path.exists() {
            return Ok(ConfigOverrides::default());
        }
        let contents = std::fs::read_to_string(&self.path).context("Failed to read config file")?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    fn save_overrides(&self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(overrides)?;
        std::fs::write(&self.path, contents).context("Failed to write config file")?;
        Ok(())
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get(&self) -> Result<Config> {
        Ok(self.load_overrides()?.apply(self.defaults.clone()))
    }

    fn set(&self, partial: ConfigOverrides) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut overrides = self.load_overrides()?;
        overrides.merge(partial);
        self.save_overrides(&overrides)
    }

    fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove config file")?;
        }
        Ok(())
    }
}

/// Overrides held in memory.
#[derive(Default)]
pub struct MemoryConfigStore {
    defaults: Config,
    overrides: Mutex<ConfigOverrides>,
}

impl MemoryConfigStore {
    pub fn new(defaults: Config) -> Self {
        Self {
            defaults,
            overrides: Mutex::new(ConfigOverrides::default()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> Result<Config> {
        let overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        Ok(overrides.apply(self.defaults.clone()))
    }

    fn set(&self, partial: ConfigOverrides) -> Result<()> {
        self.overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .merge(partial);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        *self.overrides.lock().unwrap_or_else(|e| e.into_inner()) = ConfigOverrides::default();
        Ok(())
    }
}

fn config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
}

/// Cache directory for session and log files
pub fn cache_dir() -> Result<PathBuf> {
    let cache_dir =
        dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
    Ok(cache_dir.join(APP_NAME))
}
