// src/config.rs

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::export::{DownloadMethod, SaveFormat};
use crate::types::LogSource;

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default)]
    pub include_precerts: bool,
    /// Union zone sets on update instead of overwriting them
    #[serde(default)]
    pub merge_zones: bool,
}

fn default_batch_size() -> u64 { 256 }

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_precerts: false,
            merge_zones: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor_secs")]
    pub backoff_factor_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_status_forcelist")]
    pub status_forcelist: Vec<u16>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_failure_retry_delay_secs")]
    pub failure_retry_delay_secs: u64,
}

fn default_max_retries() -> u32 { 5 }
fn default_backoff_factor_secs() -> u64 { 7 }
fn default_max_backoff_secs() -> u64 { 120 }
fn default_status_forcelist() -> Vec<u16> { vec![408, 500, 502, 503, 504] }
fn default_request_timeout_secs() -> u64 { 120 }
fn default_failure_retry_delay_secs() -> u64 { 600 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor_secs: default_backoff_factor_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            status_forcelist: default_status_forcelist(),
            request_timeout_secs: default_request_timeout_secs(),
            failure_retry_delay_secs: default_failure_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TrackingConfig {
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub zones_from_database: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_save_location")]
    pub save_location: String,
    #[serde(default)]
    pub download_method: DownloadMethod,
    #[serde(default)]
    pub save_type: SaveFormat,
}

fn default_save_location() -> String {
    "/mnt/workspace/".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            save_location: default_save_location(),
            download_method: DownloadMethod::default(),
            save_type: SaveFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Attempts per operation before a dropped connection becomes fatal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_database_url() -> String {
    "postgresql://localhost/ctingest".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_database_url(),
            max_connections: default_max_connections(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_log_sources() -> Vec<LogSource> {
    vec![
        LogSource::new("google_argon2025h2", "ct.googleapis.com/logs/us1/argon2025h2"),
        LogSource::new("google_xenon2025h2", "ct.googleapis.com/logs/eu1/xenon2025h2"),
        LogSource::new("cloudflare_nimbus2025", "ct.cloudflare.com/logs/nimbus2025"),
        LogSource::new("digicert_wyvern2025h2", "wyvern.ct.digicert.com/2025h2"),
        LogSource::new("sectigo_sabre2025h2", "sabre2025h2.ct.sectigo.com"),
        LogSource::new("letsencrypt_oak2025h2", "oak.ct.letsencrypt.org/2025h2"),
    ]
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default = "default_log_sources")]
    pub log_sources: Vec<LogSource>,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&contents)?;
        Ok(cfg)
    }

    /// Look up a log source by its key
    pub fn log_source(&self, key: &str) -> Option<&LogSource> {
        self.log_sources.iter().find(|s| s.key == key)
    }
}
