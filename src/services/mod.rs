// src/services/mod.rs

//! Source adapters: per-source enumeration strategies.
//!
//! An adapter is a pure enumerator over one content source. It knows the
//! source's pagination and listing shape, normalizes rows into candidates,
//! and nothing else: rate limiting, filtering, deduplication, and retries
//! all belong to the caller, which keeps adapters testable without delays.

mod html_index;
mod json_api;

pub use html_index::HtmlIndexAdapter;
pub use json_api::JsonApiAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Candidate, Config, RateLimitPolicy};

/// One page of enumeration results.
#[derive(Debug, Default)]
pub struct Page {
    pub candidates: Vec<Candidate>,

    /// Cursor for the following page; `None` when this is the last one
    pub next_cursor: Option<String>,

    /// The source is exhausted. Not an error.
    pub done: bool,

    /// Rows on this page that could not be parsed into a candidate
    pub malformed: usize,
}

/// Capability contract for enumerating one content source.
///
/// Transport failures are `Err`; exhaustion is a page with `done = true`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn slug(&self) -> &str;

    async fn next_page(&self, cursor: Option<&str>) -> Result<Page>;
}

/// A registered source: adapter plus its rate policy.
pub struct RegisteredSource {
    pub adapter: Arc<dyn SourceAdapter>,
    pub policy: RateLimitPolicy,
}

/// Lookup table keyed on source slug.
pub struct SourceRegistry {
    sources: HashMap<String, RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Build the registry from configuration.
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Result<Self> {
        let mut registry = Self::new();
        for source in &config.sources {
            let adapter: Arc<dyn SourceAdapter> = match (&source.html, &source.api) {
                (Some(html), None) => Arc::new(HtmlIndexAdapter::new(
                    &source.slug,
                    html.clone(),
                    client.clone(),
                )?),
                (None, Some(api)) => Arc::new(JsonApiAdapter::new(
                    &source.slug,
                    api.clone(),
                    client.clone(),
                )),
                _ => {
                    return Err(AppError::config(format!(
                        "source '{}' must define exactly one of [sources.html] or [sources.api]",
                        source.slug
                    )));
                }
            };
            registry.register(&source.slug, adapter, source.rate_limit);
        }
        Ok(registry)
    }

    /// Register an adapter under a slug.
    pub fn register(&mut self, slug: &str, adapter: Arc<dyn SourceAdapter>, policy: RateLimitPolicy) {
        self.sources
            .insert(slug.to_string(), RegisteredSource { adapter, policy });
    }

    /// Resolve a slug to its registered source.
    pub fn get(&self, slug: &str) -> Result<&RegisteredSource> {
        self.sources
            .get(slug)
            .ok_or_else(|| AppError::UnknownSource(slug.to_string()))
    }

    /// All registered slugs, sorted.
    pub fn slugs(&self) -> Vec<&str> {
        let mut slugs: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        slugs.sort_unstable();
        slugs
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_default_config() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let registry = SourceRegistry::from_config(&config, &client).unwrap();
        assert!(registry.get("gazette").is_ok());
        assert_eq!(registry.slugs(), vec!["gazette"]);
    }

    #[test]
    fn test_unknown_slug() {
        let registry = SourceRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(AppError::UnknownSource(_))
        ));
    }
}
