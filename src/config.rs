use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::notion::RetryPolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Settings loaded from `Config.toml` and `MIGRATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub notion_version: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub request_timeout_secs: u64,
    /// Blocks per append request. The API rejects more than 100.
    pub block_batch_size: usize,
    pub batch_pause_ms: u64,
    /// Largest file sent through a single-part upload.
    pub max_upload_bytes: u64,
    pub ignore_patterns: Vec<String>,
    pub report_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            request_timeout_secs: 60,
            block_batch_size: 100,
            batch_pause_ms: 300,
            max_upload_bytes: 20 * 1024 * 1024,
            ignore_patterns: Vec::new(),
            report_dir: None,
        }
    }
}

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    pub fn block_batch_size(&self) -> usize {
        self.block_batch_size.clamp(1, 100)
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("MIGRATE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Per-run switches coming from the command line.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source: PathBuf,
    pub destination_page_id: String,
    pub dry_run: bool,
    pub skip_files: bool,
    pub reverse_sort: bool,
    pub fetch_link_titles: bool,
    pub report_dir: PathBuf,
}

impl MigrationOptions {
    pub fn new(source: PathBuf, destination_page_id: String) -> Self {
        Self {
            source,
            destination_page_id,
            dry_run: false,
            skip_files: false,
            reverse_sort: false,
            fetch_link_titles: false,
            report_dir: PathBuf::from("."),
        }
    }
}
