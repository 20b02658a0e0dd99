use std::path::PathBuf;
use std::time::Duration;

use crate::{AppError, AppResult};

pub const APP_IDENTIFIER: &str = "villaops";
pub const DEFAULT_SYNC_MAX_PAGES: u32 = 20;
pub const DEFAULT_SYNC_DELAY_MS: u64 = 1_000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_FILTER: &str = "villaops=info,sqlx=warn";

const CONFIG_INVALID: &str = "CONFIG/INVALID";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_filter: String,
    /// Base URL of the hosted backend, e.g. `https://abc.supabase.co`.
    pub functions_url: Option<String>,
    pub api_key: Option<String>,
    pub sync_max_pages: u32,
    pub sync_delay: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_root = default_data_root();
        let db_path = get("VILLAOPS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join(format!("{APP_IDENTIFIER}.sqlite3")));
        let log_dir = get("VILLAOPS_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("logs"));

        let sync_max_pages = parse_number(get("VILLAOPS_SYNC_MAX_PAGES"), "VILLAOPS_SYNC_MAX_PAGES")?
            .unwrap_or(DEFAULT_SYNC_MAX_PAGES as u64);
        if sync_max_pages == 0 || sync_max_pages > u32::MAX as u64 {
            return Err(AppError::new(CONFIG_INVALID, "sync page limit must be positive")
                .with_context("key", "VILLAOPS_SYNC_MAX_PAGES"));
        }
        let sync_delay_ms = parse_number(get("VILLAOPS_SYNC_DELAY_MS"), "VILLAOPS_SYNC_DELAY_MS")?
            .unwrap_or(DEFAULT_SYNC_DELAY_MS);
        let timeout_secs = parse_number(
            get("VILLAOPS_HTTP_TIMEOUT_SECS"),
            "VILLAOPS_HTTP_TIMEOUT_SECS",
        )?
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Ok(Config {
            db_path,
            log_dir,
            log_filter: get("VILLAOPS_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            functions_url: get("VILLAOPS_FUNCTIONS_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            api_key: get("VILLAOPS_API_KEY"),
            sync_max_pages: sync_max_pages as u32,
            sync_delay: Duration::from_millis(sync_delay_ms),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Remote functions need both an endpoint and a key.
    pub fn require_functions(&self) -> AppResult<(&str, &str)> {
        match (self.functions_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(AppError::new(
                "CONFIG/MISSING_FUNCTIONS",
                "Set VILLAOPS_FUNCTIONS_URL and VILLAOPS_API_KEY to reach remote functions",
            )),
        }
    }
}

fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_IDENTIFIER)
}

fn parse_number(raw: Option<String>, key: &str) -> AppResult<Option<u64>> {
    raw.map(|value| {
        value.parse::<u64>().map_err(|err| {
            AppError::new(CONFIG_INVALID, format!("{key} must be a whole number"))
                .with_context("key", key)
                .with_context("value", value.clone())
                .with_context("error", err.to_string())
        })
    })
    .transpose()
}
