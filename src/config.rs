use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use url::Url;

// Include default configuration at compile time
const DEFAULT_CONFIG: &str = include_str!("../default_config.toml");

pub const DEFAULT_CONFIG_FILE: &str = "pagetally.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub property_id: Option<String>,
    pub credentials: PathBuf,
    pub site_prefix: Option<String>,
    pub sleep_seconds: u64,
    pub invalid_rows_file: PathBuf,
    pub columns: ColumnConfig,
    pub api: ApiConfig,
}

/// Names of the input columns the batch commands read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub url: String,
    pub date_published: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            property_id: None,
            credentials: PathBuf::from("service_account.json"),
            site_prefix: Some("https://www.yourpage.com/".to_string()),
            sleep_seconds: 10,
            invalid_rows_file: PathBuf::from("invalid_date_published_rows.csv"),
            columns: ColumnConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            url: "url".to_string(),
            date_published: "date_published".to_string(),
            pattern: "regex".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://analyticsdata.googleapis.com".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url '{}'", self.api.base_url))?;
        if let Some(prefix) = &self.site_prefix {
            if !prefix.is_empty() {
                Url::parse(prefix).with_context(|| format!("Invalid site_prefix '{}'", prefix))?;
            }
        }
        if self.columns.url.trim().is_empty() {
            anyhow::bail!("columns.url must not be empty");
        }
        Ok(())
    }

    pub fn require_property_id(&self) -> Result<&str> {
        self.property_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .context("No GA4 property id configured; pass --property-id or set property_id")
    }
}

/// Loads the explicit config file if given, then `pagetally.toml` in the
/// working directory, then the embedded defaults.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let start_time = Instant::now();

    let config = if let Some(path) = config_path {
        info!(action = "load", component = "config_file", file_path = ?path, "Loading configuration from specified file");
        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Config::parse(&content)?
    } else {
        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        if default_file.exists() {
            info!(action = "load", component = "default_config_file", file_path = ?default_file, "Loading configuration from default file");
            let content = fs::read_to_string(default_file)
                .with_context(|| format!("Failed to read config file {:?}", default_file))?;
            Config::parse(&content)?
        } else {
            info!(
                action = "load",
                component = "embedded_config",
                "Using embedded default configuration"
            );
            Config::parse(DEFAULT_CONFIG)?
        }
    };

    info!(
        action = "complete",
        component = "config_loading",
        duration_ms = start_time.elapsed().as_millis(),
        "Configuration loaded"
    );
    Ok(config)
}

pub fn init_default_config() -> Result<()> {
    let default_file = Path::new(DEFAULT_CONFIG_FILE);

    if default_file.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first if you want to reinitialize.",
            DEFAULT_CONFIG_FILE
        );
    }

    fs::write(default_file, DEFAULT_CONFIG)?;
    println!("Created {} with default settings", DEFAULT_CONFIG_FILE);

    Ok(())
}
