use crate::error::{Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Remote call size used by the engine.
pub const DEFAULT_ENGINE_BATCH_SIZE: usize = 10;

/// Delay between scheduling attempts of the driver loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

const ENV_ENDPOINT_URL: &str = "LIVE_TRANSLATE_ENDPOINT_URL";
const ENV_API_KEY: &str = "LIVE_TRANSLATE_API_KEY";
const ENV_BATCH_SIZE: &str = "LIVE_TRANSLATE_BATCH_SIZE";
const ENV_POLL_INTERVAL_MS: &str = "LIVE_TRANSLATE_POLL_INTERVAL_MS";

/// Endpoint and key for the remote chat endpoint. Only exists when both are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            api_key: None,
            batch_size: DEFAULT_ENGINE_BATCH_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the default config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match Self::load_strict(path) {
            Err(TranslateError::Toml(e)) => {
                warn!("Ignoring unreadable config file {}: {}", path.display(), e);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Like [`Config::load_from`], but a file that does not parse is an error.
    /// Use this before writing the file back.
    pub fn load_strict(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str::<Config>(&contents).map_err(|e| TranslateError::Toml(e.to_string()))
    }

    /// Apply `LIVE_TRANSLATE_*` overrides using the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_ENDPOINT_URL) {
            self.endpoint_url = Some(url);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(size) = lookup(ENV_BATCH_SIZE) {
            if let Ok(s) = size.parse() {
                self.batch_size = s;
            }
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS) {
            if let Ok(i) = interval.parse() {
                self.poll_interval_ms = i;
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()
            .ok_or_else(|| TranslateError::Config("No config directory available".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| TranslateError::Toml(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TranslateError::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(TranslateError::Config(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(TranslateError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(ref url) = self.endpoint_url {
            if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TranslateError::Config(format!(
                    "Endpoint URL must start with http:// or https://: {}",
                    url
                )));
            }
        }

        Ok(())
    }

    /// Both endpoint and key, if neither is missing or empty.
    pub fn credentials(&self) -> Option<Credentials> {
        let endpoint_url = self.endpoint_url.as_deref().map(str::trim)?;
        let api_key = self.api_key.as_deref().map(str::trim)?;
        if endpoint_url.is_empty() || api_key.is_empty() {
            return None;
        }
        Some(Credentials {
            endpoint_url: endpoint_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            None | Some("") => "<unset>".to_string(),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                let visible = chars.len().min(4);
                let hidden = chars.len() - visible;
                let tail: String = chars[hidden..].iter().collect();
                format!("{}{}", "*".repeat(hidden), tail)
            }
        }
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("live-translate").join("config.toml"))
    }
}

/// Source of remote credentials, consulted by the engine whenever it has none.
pub trait SettingsStore {
    fn load_credentials(&self) -> Result<Option<Credentials>>;
}

/// A fixed snapshot of settings.
impl SettingsStore for Config {
    fn load_credentials(&self) -> Result<Option<Credentials>> {
        Ok(self.credentials())
    }
}

/// Re-reads the config file and environment on every request, so settings
/// written by `live-translate configure` are picked up by a running engine.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
}

impl ConfigFile {
    /// Track the default config location.
    pub fn new() -> Self {
        Self { path: None }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl SettingsStore for ConfigFile {
    fn load_credentials(&self) -> Result<Option<Credentials>> {
        let config = match self.path {
            Some(ref path) => {
                let mut config = Config::load_from(path)?;
                config.apply_overrides(|name| std::env::var(name).ok());
                config
            }
            None => Config::load()?,
        };
        Ok(config.credentials())
    }
}
