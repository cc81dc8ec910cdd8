use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base URL of the Drive v3 metadata API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL of the Drive v3 upload API.
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// Well-known name of the single index blob.
    #[serde(default = "default_index_file_name")]
    pub index_file_name: String,
    /// Page size used when enumerating every source document.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
    /// Page size of the `/files` browsing passthrough.
    #[serde(default = "default_browse_page_size")]
    pub browse_page_size: u32,
    /// Environment variable the CLI reads the bearer token from.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            index_file_name: default_index_file_name(),
            list_page_size: default_list_page_size(),
            browse_page_size: default_browse_page_size(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}
fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}
fn default_index_file_name() -> String {
    "search_index.json".to_string()
}
fn default_list_page_size() -> u32 {
    100
}
fn default_browse_page_size() -> u32 {
    10
}
fn default_token_env() -> String {
    "SHELF_ACCESS_TOKEN".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    /// Upper bound on fetch + extract time for one file.
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
    /// Download attempts per file (1 disables retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Files processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            file_timeout_secs: default_file_timeout_secs(),
            max_attempts: default_max_attempts(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_file_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}
fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Characters of context kept on each side of a match.
    #[serde(default = "default_snippet_radius")]
    pub snippet_radius: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            snippet_radius: default_snippet_radius(),
        }
    }
}

fn default_page_size() -> usize {
    10
}
fn default_snippet_radius() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            storage: StorageConfig::default(),
            build: BuildConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.search.page_size == 0 {
            anyhow::bail!("search.page_size must be >= 1");
        }
        if !(1..=3).contains(&self.build.max_attempts) {
            anyhow::bail!("build.max_attempts must be between 1 and 3");
        }
        if self.build.concurrency == 0 {
            anyhow::bail!("build.concurrency must be >= 1");
        }
        if self.build.file_timeout_secs == 0 {
            anyhow::bail!("build.file_timeout_secs must be > 0");
        }
        if self.storage.index_file_name.trim().is_empty() {
            anyhow::bail!("storage.index_file_name must not be empty");
        }
        if self.storage.list_page_size == 0 || self.storage.list_page_size > 1000 {
            anyhow::bail!("storage.list_page_size must be in 1..=1000");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
