//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Store and spool locations
    #[serde(default)]
    pub store: StoreConfig,

    /// Page-fetch retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Content source definitions
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(AppError::config("no sources defined"));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.slug.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate source slug '{}'",
                    source.slug
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds, per attempt
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Store and spool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path
    #[serde(default = "defaults::db_path")]
    pub db_path: String,

    /// Directory for the downstream NDJSON spool
    #[serde(default = "defaults::spool_dir")]
    pub spool_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: defaults::db_path(),
            spool_dir: defaults::spool_dir(),
        }
    }
}

/// Page-fetch retry settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per page, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts; doubles per retry
    #[serde(default = "defaults::base_backoff")]
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_backoff_ms: defaults::base_backoff(),
        }
    }
}

/// Randomized delay window between outbound requests to one source.
///
/// Owned by source configuration, read-only at run time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Minimum delay in milliseconds
    #[serde(default = "defaults::min_delay")]
    pub min_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::min_delay(),
            max_delay_ms: defaults::max_delay(),
        }
    }
}

/// One content source: slug, rate policy, and exactly one enumeration
/// strategy (`html` or `api`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier used on the command line and in the store
    pub slug: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Delay window between requests to this source
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    /// Paginated HTML listing strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<HtmlIndexConfig>,

    /// Paginated JSON API strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<JsonApiConfig>,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.slug.trim().is_empty() {
            return Err(AppError::config("source slug is empty"));
        }
        if self.rate_limit.min_delay_ms > self.rate_limit.max_delay_ms {
            return Err(AppError::config(format!(
                "source '{}': rate_limit.min_delay_ms exceeds max_delay_ms",
                self.slug
            )));
        }
        let page_url = match (&self.html, &self.api) {
            (Some(html), None) => &html.page_url,
            (None, Some(api)) => &api.page_url,
            _ => {
                return Err(AppError::config(format!(
                    "source '{}' must define exactly one of [sources.html] or [sources.api]",
                    self.slug
                )));
            }
        };
        if !page_url.contains("{page}") {
            return Err(AppError::config(format!(
                "source '{}': page_url must contain a {{page}} placeholder",
                self.slug
            )));
        }
        Ok(())
    }
}

/// Paginated HTML listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlIndexConfig {
    /// Listing URL template; `{page}` is replaced with the page number
    pub page_url: String,

    /// First page number
    #[serde(default = "defaults::first_page")]
    pub first_page: u32,

    /// Selector matching one listing row
    pub row_selector: String,

    /// Selector matching the item link inside a row
    pub link_selector: String,

    /// Attribute holding the link target
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Selector matching the cell with the modification date; when absent,
    /// the whole row text is scanned with `date_pattern`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_selector: Option<String>,

    /// Regex with one capture group extracting the date text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_pattern: Option<String>,

    /// chrono format string for the extracted date text
    #[serde(default = "defaults::date_format")]
    pub date_format: String,
}

/// Paginated JSON API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonApiConfig {
    /// Endpoint URL template; `{page}` is replaced with the page number
    pub page_url: String,

    /// First page number
    #[serde(default = "defaults::first_page")]
    pub first_page: u32,

    /// Field holding the item array
    #[serde(default = "defaults::items_field")]
    pub items_field: String,

    /// Field on each item holding the canonical URL
    #[serde(default = "defaults::url_field")]
    pub url_field: String,

    /// Field on each item holding the modification date
    #[serde(default = "defaults::modified_field")]
    pub modified_field: String,

    /// Top-level field holding the next page number, null when exhausted
    #[serde(default = "defaults::next_field")]
    pub next_field: String,

    /// chrono format string for the modification date
    #[serde(default = "defaults::date_format")]
    pub date_format: String,
}

mod defaults {
    use super::{HtmlIndexConfig, RateLimitPolicy, SourceConfig};

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; backfill/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Store defaults
    pub fn db_path() -> String {
        "backfill.db".into()
    }
    pub fn spool_dir() -> String {
        "spool".into()
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_backoff() -> u64 {
        500
    }

    // Rate limit defaults
    pub fn min_delay() -> u64 {
        1000
    }
    pub fn max_delay() -> u64 {
        3000
    }

    // Adapter defaults
    pub fn first_page() -> u32 {
        1
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn date_format() -> String {
        "%Y-%m-%d".into()
    }
    pub fn items_field() -> String {
        "items".into()
    }
    pub fn url_field() -> String {
        "url".into()
    }
    pub fn modified_field() -> String {
        "modified".into()
    }
    pub fn next_field() -> String {
        "next_page".into()
    }

    // Source defaults
    pub fn default_sources() -> Vec<SourceConfig> {
        vec![SourceConfig {
            slug: "gazette".to_string(),
            name: "Municipal gazette index".to_string(),
            rate_limit: RateLimitPolicy::default(),
            html: Some(HtmlIndexConfig {
                page_url: "https://gazette.example.org/editions?page={page}".to_string(),
                first_page: first_page(),
                row_selector: "table.editions tr.edition".to_string(),
                link_selector: "td.title a".to_string(),
                link_attr: link_attr(),
                date_selector: Some("td.published".to_string()),
                date_pattern: None,
                date_format: date_format(),
            }),
            api: None,
        }]
    }
}
