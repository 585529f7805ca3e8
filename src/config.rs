use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::market::Market;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Market used when `--market` is not given.
    pub default_market: Market,
    /// Seconds a fetched playlist stays in the in-process cache.
    pub cache_ttl_secs: u64,
    /// Fixed UTC offset (minutes) used to bucket add timestamps into days.
    pub utc_offset_minutes: i32,
    /// Catalog API settings.
    pub catalog: CatalogConfig,
    /// Text-generation settings for the narrative summary.
    pub summary: SummaryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_market: Market::Us,
            cache_ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
            utc_offset_minutes: 0,
            catalog: CatalogConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

/// Catalog API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: String,
    pub token_url: String,
    /// Per-call network timeout.
    pub timeout_secs: u64,
    /// Retries on 429/5xx.
    pub max_retries: u32,
    /// Base backoff between transient retries in milliseconds.
    pub retry_backoff_ms: u64,
    /// Pause between artist lookup batches in milliseconds.
    pub batch_delay_ms: u64,
    /// Playlist items per page (API max 100).
    pub page_size: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 300,
            batch_delay_ms: 50,
            page_size: 100,
        }
    }
}

/// Text-generation API configuration (OpenAI-compatible).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub api_key: Option<String>,
    /// Explicit model override; skips the model-list lookup.
    pub model: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_secs: 10,
            temperature: 0.7,
            max_tokens: 350,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/playlist-dna/config.toml`, then apply
    /// environment overrides for credentials.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Environment variables win over the config file. Empty values are ignored.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SPOTIFY_CLIENT_ID") {
            self.catalog.client_id = Some(v);
        }
        if let Some(v) = get("SPOTIFY_CLIENT_SECRET") {
            self.catalog.client_secret = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.summary.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.summary.model = Some(v);
        }
    }

    /// Reference offset for day bucketing. Out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                log::warn!("Invalid utc_offset_minutes {}, using UTC", self.utc_offset_minutes);
                utc()
            })
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// The zero offset.
pub fn utc() -> FixedOffset {
    Utc.fix()
}
