//! Top-level application configuration.
//!
//! Configuration is stored in `config.yaml` in the platform config directory
//! (or `$DOCKETS_CONFIG_DIR`) and includes:
//! - Data service URL and API key
//! - Listing page size and prefetch behavior
//! - Search debounce and palette limits
//! - Aggregation chunking and count scope
//! - Attachment base URL and change feed polling

use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aggregate::CountScope;
use crate::error::{DocketError, Result};

/// Environment override for the configuration directory
pub const CONFIG_DIR_ENV: &str = "DOCKETS_CONFIG_DIR";
/// Environment override for the data directory (preferences)
pub const DATA_DIR_ENV: &str = "DOCKETS_DATA_DIR";
/// Environment override for `api.url`
pub const API_URL_ENV: &str = "DOCKETS_API_URL";
/// Environment override for `api.key`
pub const API_KEY_ENV: &str = "DOCKETS_API_KEY";

/// Every key accepted by `config get` / `config set`
pub const CONFIG_KEYS: &[&str] = &[
    "api.url",
    "api.key",
    "listing.page_size",
    "listing.prefetch",
    "search.debounce_ms",
    "search.min_length",
    "search.palette_limit",
    "aggregate.chunk_size",
    "aggregate.scope",
    "scroll.margin_px",
    "attachments.base_url",
    "realtime.poll_interval_ms",
    "remote_timeout",
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub aggregate: AggregateConfig,

    #[serde(default)]
    pub scroll: ScrollConfig,

    #[serde(default)]
    pub attachments: AttachmentsConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout: u64,
}

fn default_remote_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            listing: ListingConfig::default(),
            search: SearchConfig::default(),
            aggregate: AggregateConfig::default(),
            scroll: ScrollConfig::default(),
            attachments: AttachmentsConfig::default(),
            realtime: RealtimeConfig::default(),
            remote_timeout: default_remote_timeout(),
        }
    }
}

/// Data service endpoint
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Rows per page (default: 30)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Keep one page buffered ahead (default: true)
    #[serde(default = "default_true")]
    pub prefetch: bool,
}

fn default_page_size() -> usize {
    crate::types::PAGE_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            prefetch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet period before a search runs (default: 300)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Shortest searchable text (default: 2)
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Palette results per table (default: 8)
    #[serde(default = "default_palette_limit")]
    pub palette_limit: usize,
}

fn default_debounce_ms() -> u64 {
    crate::search::DEBOUNCE_MS
}

fn default_min_length() -> usize {
    crate::search::MIN_SEARCH_LEN
}

fn default_palette_limit() -> usize {
    8
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_length: default_min_length(),
            palette_limit: default_palette_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Keys per auxiliary lookup request (default: 50)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub scope: CountScope,
}

fn default_chunk_size() -> usize {
    crate::aggregate::CHUNK_SIZE
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            scope: CountScope::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Distance before the sentinel at which the next page is requested
    #[serde(default = "default_margin_px")]
    pub margin_px: u32,
}

fn default_margin_px() -> u32 {
    crate::listing::scroll::DEFAULT_MARGIN_PX
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            margin_px: default_margin_px(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Base URL that attachment content hashes resolve against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Change feed polling interval (default: 2000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "openscrapers", "dockets")
}

/// Directory holding `config.yaml`
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| DocketError::Config("could not determine config directory".to_string()))
}

/// Directory holding local preferences
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| DocketError::Config("could not determine data directory".to_string()))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DocketError::Config(format!("invalid value '{value}' for '{key}'")))
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.yaml"))
    }

    /// Load configuration from file, or return default if not found
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            DocketError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config at {}: {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_yaml_ng::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DocketError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create directory for config at {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }

        let content = serde_yaml_ng::to_string(self)?;
        fs::write(&path, content).map_err(|e| {
            DocketError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write config at {}: {}", path.display(), e),
            ))
        })?;

        // Set restrictive permissions on Unix (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, permissions).map_err(|e| {
                DocketError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to set permissions on config at {}: {}",
                        path.display(),
                        e
                    ),
                ))
            })?;
        }

        Ok(())
    }

    /// Reject values no listing can work with.
    pub fn validate(&self) -> Result<()> {
        if self.listing.page_size == 0 {
            return Err(DocketError::Config(
                "listing.page_size must be at least 1".to_string(),
            ));
        }
        if self.aggregate.chunk_size == 0 {
            return Err(DocketError::Config(
                "aggregate.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API URL from environment variable or config
    pub fn api_url(&self) -> Option<String> {
        non_empty_env(API_URL_ENV).or_else(|| self.api.url.clone())
    }

    /// Get the API key from environment variable or config
    pub fn api_key(&self) -> Option<String> {
        non_empty_env(API_KEY_ENV).or_else(|| self.api.key.clone())
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.search.debounce_ms)
    }

    /// Read one key as display text. `api.key` is masked.
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "api.url" => self.api.url.clone().unwrap_or_default(),
            "api.key" => self.api.key.as_ref().map(|_| "[REDACTED]".to_string()).unwrap_or_default(),
            "listing.page_size" => self.listing.page_size.to_string(),
            "listing.prefetch" => self.listing.prefetch.to_string(),
            "search.debounce_ms" => self.search.debounce_ms.to_string(),
            "search.min_length" => self.search.min_length.to_string(),
            "search.palette_limit" => self.search.palette_limit.to_string(),
            "aggregate.chunk_size" => self.aggregate.chunk_size.to_string(),
            "aggregate.scope" => self.aggregate.scope.to_string(),
            "scroll.margin_px" => self.scroll.margin_px.to_string(),
            "attachments.base_url" => self.attachments.base_url.clone().unwrap_or_default(),
            "realtime.poll_interval_ms" => self.realtime.poll_interval_ms.to_string(),
            "remote_timeout" => self.remote_timeout.to_string(),
            _ => return Err(unknown_key(key)),
        };
        Ok(value)
    }

    /// Set one key from text. An empty value clears optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        match key {
            "api.url" => {
                if let Some(url) = optional(value) {
                    url::Url::parse(&url)?;
                }
                self.api.url = optional(value);
            }
            "api.key" => self.api.key = optional(value),
            "listing.page_size" => self.listing.page_size = parse_value(key, value)?,
            "listing.prefetch" => self.listing.prefetch = parse_value(key, value)?,
            "search.debounce_ms" => self.search.debounce_ms = parse_value(key, value)?,
            "search.min_length" => self.search.min_length = parse_value(key, value)?,
            "search.palette_limit" => self.search.palette_limit = parse_value(key, value)?,
            "aggregate.chunk_size" => self.aggregate.chunk_size = parse_value(key, value)?,
            "aggregate.scope" => self.aggregate.scope = value.parse()?,
            "scroll.margin_px" => self.scroll.margin_px = parse_value(key, value)?,
            "attachments.base_url" => self.attachments.base_url = optional(value),
            "realtime.poll_interval_ms" => {
                self.realtime.poll_interval_ms = parse_value(key, value)?
            }
            "remote_timeout" => self.remote_timeout = parse_value(key, value)?,
            _ => return Err(unknown_key(key)),
        }
        self.validate()
    }
}

fn unknown_key(key: &str) -> DocketError {
    DocketError::Config(format!(
        "unknown config key '{key}'. Valid keys: {}",
        CONFIG_KEYS.join(", ")
    ))
}
