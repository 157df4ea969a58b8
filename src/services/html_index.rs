// src/services/html_index.rs

//! Paginated HTML listing adapter.
//!
//! Walks a listing index page by page using configured CSS selectors. The
//! page cursor is the page number; enumeration is done when a page yields
//! no rows (or the source answers 404 for the next page, which some index
//! CMSes do instead of serving an empty listing).

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{Page, SourceAdapter};
use crate::error::{AppError, Result};
use crate::models::{Candidate, HtmlIndexConfig};
use crate::utils::resolve_url;

/// Adapter for sources that publish a paginated HTML index.
pub struct HtmlIndexAdapter {
    slug: String,
    config: HtmlIndexConfig,
    client: reqwest::Client,
    date_pattern: Option<Regex>,
}

impl HtmlIndexAdapter {
    /// Create the adapter, failing fast on unparseable selectors or patterns.
    pub fn new(slug: &str, config: HtmlIndexConfig, client: reqwest::Client) -> Result<Self> {
        parse_selector(&config.row_selector)?;
        parse_selector(&config.link_selector)?;
        if let Some(selector) = &config.date_selector {
            parse_selector(selector)?;
        }
        let date_pattern = config
            .date_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                AppError::config(format!("source '{slug}': invalid date_pattern: {e}"))
            })?;

        Ok(Self {
            slug: slug.to_string(),
            config,
            client,
            date_pattern,
        })
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

    /// Parse one listing document into candidates.
    ///
    /// Split from fetching so listing parsing is testable on fixture HTML.
    fn parse_listing(&self, base_url: &str, html: &str) -> Result<(Vec<Candidate>, usize)> {
        let document = Html::parse_document(html);
        let row_sel = parse_selector(&self.config.row_selector)?;
        let link_sel = parse_selector(&self.config.link_selector)?;
        let date_sel = self
            .config
            .date_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let base = url::Url::parse(base_url)?;

        let mut candidates = Vec::new();
        let mut malformed = 0;
        for row in document.select(&row_sel) {
            match self.parse_row(&row, &link_sel, date_sel.as_ref(), &base) {
                Some(candidate) => candidates.push(candidate),
                None => malformed += 1,
            }
        }
        Ok((candidates, malformed))
    }

    fn parse_row(
        &self,
        row: &ElementRef<'_>,
        link_sel: &Selector,
        date_sel: Option<&Selector>,
        base: &url::Url,
    ) -> Option<Candidate> {
        let link_elem = row.select(link_sel).next()?;
        let href = link_elem.value().attr(&self.config.link_attr)?.trim();
        if href.is_empty() {
            return None;
        }

        let url = resolve_url(base, href);
        let title: String = link_elem.text().collect::<String>().trim().to_string();

        // Dates are best-effort: a row without one is still a candidate.
        let date_text: Option<String> = match date_sel {
            Some(sel) => row.select(sel).next().map(|el| el.text().collect()),
            None => Some(row.text().collect()),
        };
        let last_modified = date_text.as_deref().and_then(|text| self.parse_date(text));

        Some(Candidate {
            source_slug: self.slug.clone(),
            url,
            last_modified,
            metadata: serde_json::json!({ "title": title }),
        })
    }

    fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        let raw = match &self.date_pattern {
            Some(pattern) => pattern.captures(text)?.get(1)?.as_str(),
            None => text,
        };
        NaiveDate::parse_from_str(raw.trim(), &self.config.date_format).ok()
    }
}

#[async_trait]
impl SourceAdapter for HtmlIndexAdapter {
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
        let html = response.error_for_status()?.text().await?;

        let (candidates, malformed) = self.parse_listing(&url, &html)?;
        let done = candidates.is_empty() && malformed == 0;
        let next_cursor = if done {
            None
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
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
