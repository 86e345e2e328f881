use crate::constants;
use crate::error::{FeedError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "threat_feed.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub dedup: DedupConfig,
    pub fetch: FetchConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// How many days of partitions count as history
    pub window_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("news_data"),
            window_days: constants::DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: constants::DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub model: String,
    /// Country name used in the prompt
    pub country: String,
    /// ISO 3166 alpha-2 code for the web and news search sources
    pub country_code: String,
    pub lookback_hours: i64,
    pub max_search_results: u32,
    pub rss_links: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.ai".to_string(),
            model: "grok-4-fast-reasoning-latest".to_string(),
            country: "Nigeria".to_string(),
            country_code: "NG".to_string(),
            lookback_hours: constants::DEFAULT_LOOKBACK_HOURS,
            max_search_results: 30,
            rss_links: vec![
                "https://news.google.com/rss/search?q=nigeria+security&hl=en-NG&gl=NG&ceid=NG:en"
                    .to_string(),
            ],
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub base_url: String,
    pub lga_placeholder: String,
    pub timeout_seconds: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fantastic-mammoth-699.convex.site".to_string(),
            lga_placeholder: constants::LGA_PLACEHOLDER.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load from `path`, or from `threat_feed.toml` when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FeedError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.dedup.threshold) {
            return Err(FeedError::Config(format!(
                "dedup.threshold must be within [0, 1], got {}",
                self.dedup.threshold
            )));
        }
        if !(0..=constants::MAX_WINDOW_DAYS).contains(&self.storage.window_days) {
            return Err(FeedError::Config(format!(
                "storage.window_days must be between 0 and {}, got {}",
                constants::MAX_WINDOW_DAYS,
                self.storage.window_days
            )));
        }
        if !(1..=constants::MAX_LOOKBACK_HOURS).contains(&self.fetch.lookback_hours) {
            return Err(FeedError::Config(format!(
                "fetch.lookback_hours must be between 1 and {}, got {}",
                constants::MAX_LOOKBACK_HOURS,
                self.fetch.lookback_hours
            )));
        }
        Ok(())
    }
}

/// Read a credential from the environment
pub fn env_secret(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|source| FeedError::Env { name, source })
}
