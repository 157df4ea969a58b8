// src/services/json_api.rs

//! Paginated JSON API adapter.
//!
//! Walks an endpoint that returns an item array plus an optional next-page
//! number. Field names are per-source configuration, so the payload is
//! traversed as loose JSON rather than deserialized into rigid structs.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::{Page, SourceAdapter};
use crate::error::{AppError, Result};
use crate::models::{Candidate, JsonApiConfig};

/// Adapter for sources that publish a paginated JSON listing endpoint.
pub struct JsonApiAdapter {
    slug: String,
    config: JsonApiConfig,
    client: reqwest::Client,
}

impl JsonApiAdapter {
    pub fn new(slug: &str, config: JsonApiConfig, client: reqwest::Client) -> Self {
        Self {
            slug: slug.to_string(),
            config,
            client,
        }
    }

    fn page_number(&self, cursor: Option<&str>) -> Result<u32> {
        match cursor {
            None => Ok(self.config.first_page),
            Some(c) => c
                .parse()
                .map_err(|_| AppError::fetch(&self.slug, format!("invalid page cursor '{c}'"))),
        }
    }

    fn page_url(&self, page: u32) -> String {
        self.config.page_url.replace("{page}", &page.to_string())
    }

    /// Parse one response body into a page.
    fn parse_page(&self, page: u32, body: &Value) -> Result<Page> {
        let items = body
            .get(&self.config.items_field)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::fetch(
                    &self.slug,
                    format!("response missing '{}' array", self.config.items_field),
                )
            })?;

        let mut candidates = Vec::new();
        let mut malformed = 0;
        for item in items {
            match self.parse_item(item) {
                Some(candidate) => candidates.push(candidate),
                None => malformed += 1,
            }
        }

        let done = items.is_empty();
        let next_cursor = if done {
            None
        } else if body.get(&self.config.next_field).is_some() {
            // The endpoint reports the next page itself; null means exhausted.
            body.get(&self.config.next_field)
                .and_then(Value::as_u64)
                .map(|n| n.to_string())
        } else {
            Some((page + 1).to_string())
        };

        Ok(Page {
            candidates,
            next_cursor,
            done,
            malformed,
        })
    }

    fn parse_item(&self, item: &Value) -> Option<Candidate> {
        let url = item.get(&self.config.url_field)?.as_str()?.trim();
        if url.is_empty() {
            return None;
        }

        let last_modified = item
            .get(&self.config.modified_field)
            .and_then(Value::as_str)
            .and_then(|raw| {
                NaiveDate::parse_from_str(raw.trim(), &self.config.date_format).ok()
            });

        Some(Candidate {
            source_slug: self.slug.clone(),
            url: url.to_string(),
            last_modified,
            metadata: item.clone(),
        })
    }
}

#[async_trait]
impl SourceAdapter for JsonApiAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn next_page(&self, cursor: Option<&str>) -> Result<Page> {
        let page = self.page_number(cursor)?;
        let url = self.page_url(page);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Page {
                done: true,
                ..Page::default()
            });
        }
        let text = response.error_for_status()?.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::fetch(&self.slug, format!("invalid JSON payload: {e}")))?;

        self.parse_page(page, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> JsonApiAdapter {
        let config = JsonApiConfig {
            page_url: "https://api.gazette.test/editions?page={page}".to_string(),
            first_page: 1,
            items_field: "items".to_string(),
            url_field: "url".to_string(),
            modified_field: "modified".to_string(),
            next_field: "next_page".to_string(),
            date_format: "%Y-%m-%d".to_string(),
        };
        JsonApiAdapter::new("gazette-api", config, reqwest::Client::new())
    }

    #[test]
    fn test_parse_page() {
        let body = json!({
            "items": [
                { "url": "https://gazette.test/1", "modified": "2024-03-01" },
                { "url": "https://gazette.test/2" },
                { "modified": "2024-03-03" }
            ],
            "next_page": 2
        });
        let page = adapter().parse_page(1, &body).unwrap();

        assert_eq!(page.candidates.len(), 2);
        assert_eq!(page.malformed, 1);
        assert!(!page.done);
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
        assert_eq!(
            page.candidates[0].last_modified,
            Some("2024-03-01".parse().unwrap())
        );
        assert_eq!(page.candidates[1].last_modified, None);
        // The whole item rides along as metadata
        assert_eq!(page.candidates[0].metadata["modified"], "2024-03-01");
    }

    #[test]
    fn test_null_next_page_ends_enumeration() {
        let body = json!({
            "items": [{ "url": "https://gazette.test/9" }],
            "next_page": null
        });
        let page = adapter().parse_page(4, &body).unwrap();
        assert_eq!(page.next_cursor, None);
        assert!(!page.done);
    }

    #[test]
    fn test_missing_next_field_increments_page() {
        let body = json!({ "items": [{ "url": "https://gazette.test/9" }] });
        let page = adapter().parse_page(4, &body).unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("5"));
    }

    #[test]
    fn test_empty_items_is_done() {
        let body = json!({ "items": [], "next_page": null });
        let page = adapter().parse_page(7, &body).unwrap();
        assert!(page.done);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_missing_items_array_is_fetch_error() {
        let body = json!({ "editions": [] });
        assert!(matches!(
            adapter().parse_page(1, &body),
            Err(AppError::Fetch { .. })
        ));
    }
}
