// src/sources/readwise.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{parse_timestamp, Archiver, Item, SourceAdapter, SourceKind, SubSource};
use crate::format::truncate_chars;

pub const READWISE_API_BASE: &str = "https://readwise.io/api/v2";
const PAGE_SIZE: u32 = 100;
const FALLBACK_TITLE: &str = "Readwise Highlight";

#[derive(Debug, Deserialize)]
struct HighlightsPage {
    #[serde(default)]
    results: Vec<Highlight>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Highlight {
    id: serde_json::Value,
    #[serde(default)]
    text: String,
    #[serde(default)]
    note: Option<String>,
    /// Permalink on readwise.io.
    url: Option<String>,
    /// Original article URL, when the highlight came from the web.
    source_url: Option<String>,
    book_id: Option<u64>,
    title: Option<String>,
    book_title: Option<String>,
    updated: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Book {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateHighlights<'a> {
    highlights: [NewHighlight<'a>; 1],
}

#[derive(Debug, Serialize)]
struct NewHighlight<'a> {
    text: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_url: Option<&'a str>,
    location_type: &'a str,
    location: u32,
}

/// Parse one page of `GET /highlights/`. Returns items and the absolute `next` URL.
pub fn parse_highlights_page(body: &str) -> Result<(Vec<Item>, Option<String>)> {
    let page: HighlightsPage = serde_json::from_str(body).context("parsing highlights page")?;
    let items = page.results.into_iter().map(highlight_item).collect();
    Ok((items, page.next.filter(|n| !n.is_empty())))
}

fn highlight_item(h: Highlight) -> Item {
    let id = match &h.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut meta = std::collections::BTreeMap::new();
    if let Some(book) = h.book_id {
        meta.insert("book_id".to_string(), book.to_string());
    }
    if let Some(note) = h.note.filter(|n| !n.trim().is_empty()) {
        meta.insert("note".to_string(), note);
    }
    let updated = h.updated.or(h.updated_at);
    Item {
        id,
        title: h
            .title
            .or(h.book_title)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_default(),
        body: Some(h.text).filter(|t| !t.trim().is_empty()),
        url: h
            .source_url
            .or(h.url)
            .filter(|u| !u.trim().is_empty()),
        timestamp: updated.as_deref().and_then(parse_timestamp),
        meta,
    }
}

/// Readwise v2 client: highlight polling source and archival side channel.
pub struct ReadwiseClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    dry_run: bool,
    max_pages: u32,
    book_titles: Mutex<HashMap<u64, Option<String>>>,
}

impl ReadwiseClient {
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self {
            client,
            base_url: READWISE_API_BASE.to_string(),
            token,
            dry_run: false,
            max_pages: 10,
            book_titles: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    pub fn can_use(&self) -> bool {
        !self.token.is_empty()
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    /// Highlights updated after `updated_after` (all when `None`), at most `max_pages` pages.
    pub async fn fetch_highlights(&self, updated_after: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
        if !self.can_use() {
            bail!("Readwise API token missing");
        }

        let mut out = Vec::new();
        let mut req = self
            .client
            .get(format!("{}/highlights/", self.base_url))
            .query(&[("page_size", PAGE_SIZE.to_string())]);
        if let Some(ts) = updated_after {
            req = req.query(&[("updated__gt", ts.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        for page in 1..=self.max_pages {
            let rsp = req
                .header(reqwest::header::AUTHORIZATION, self.auth())
                .send()
                .await
                .context("readwise highlights request")?;
            let status = rsp.status();
            let body = rsp.text().await.context("readwise .text()")?;
            if !status.is_success() {
                bail!("Readwise API returned {status}: {}", truncate_chars(&body, 300));
            }

            let (mut items, next) = parse_highlights_page(&body)?;
            out.append(&mut items);
            match next {
                Some(next) if page < self.max_pages => req = self.client.get(next),
                Some(_) => {
                    tracing::debug!(pages = self.max_pages, "readwise page bound reached");
                    break;
                }
                None => break,
            }
        }

        self.fill_titles(&mut out).await;
        Ok(out)
    }

    /// Resolve missing titles from the book endpoint. Lookups are cached for the
    /// process lifetime; failures leave the title empty.
    async fn fill_titles(&self, items: &mut [Item]) {
        for item in items.iter_mut().filter(|i| i.title.is_empty()) {
            let Some(book_id) = item.meta("book_id").and_then(|b| b.parse::<u64>().ok()) else {
                continue;
            };
            if let Some(title) = self.book_title(book_id).await {
                item.title = title;
            }
        }
    }

    async fn book_title(&self, book_id: u64) -> Option<String> {
        let mut cache = self.book_titles.lock().await;
        if let Some(hit) = cache.get(&book_id) {
            return hit.clone();
        }
        let title = match self.fetch_book(book_id).await {
            Ok(book) => book.title.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                // not cached, retried on the next cycle
                tracing::warn!(error = %e, book_id, "Readwise book fetch failed");
                return None;
            }
        };
        cache.insert(book_id, title.clone());
        title
    }

    async fn fetch_book(&self, book_id: u64) -> Result<Book> {
        self.client
            .get(format!("{}/books/{book_id}/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .send()
            .await
            .context("readwise book request")?
            .error_for_status()
            .context("readwise book non-2xx")?
            .json()
            .await
            .context("readwise book json")
    }

    /// Create one highlight. No-op in dry-run.
    pub async fn save_highlight(&self, text: &str, title: &str, source_url: Option<&str>) -> Result<()> {
        if !self.can_use() {
            bail!("Readwise API token missing");
        }
        if self.dry_run {
            tracing::info!(title, source_url, "DRY_RUN enabled: skipping Readwise highlight creation");
            return Ok(());
        }

        let payload = CreateHighlights {
            highlights: [NewHighlight {
                text,
                title,
                source_url,
                // Readwise rejects "video"
                location_type: "article",
                location: 0,
            }],
        };
        let rsp = self
            .client
            .post(format!("{}/highlights/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&payload)
            .send()
            .await
            .context("readwise create highlight request")?;
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            bail!("Readwise highlight creation failed with {status}: {}", truncate_chars(&body, 300));
        }
        Ok(())
    }

    pub fn format_message(item: &Item) -> String {
        let header = if item.title.is_empty() {
            FALLBACK_TITLE
        } else {
            item.title.as_str()
        };
        let mut msg = format!("{header}\n{}", item.body.as_deref().unwrap_or_default());
        if let Some(note) = item.meta("note") {
            msg.push_str(&format!("\n\nNote: {note}"));
        }
        if let Some(url) = item.url.as_deref() {
            msg.push_str(&format!("\n{url}"));
        }
        msg
    }
}

#[async_trait]
impl SourceAdapter for ReadwiseClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Highlights
    }

    fn sub_sources(&self) -> Vec<SubSource> {
        vec![SubSource::scalar("highlights")]
    }

    fn can_operate(&self) -> bool {
        self.can_use()
    }

    async fn fetch(&self, _sub: &SubSource, since: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
        self.fetch_highlights(since).await
    }

    fn format(&self, item: &Item) -> String {
        Self::format_message(item)
    }
}

#[async_trait]
impl Archiver for ReadwiseClient {
    async fn archive(&self, item: &Item) -> Result<()> {
        self.save_highlight(&item.title, &item.title, item.url.as_deref())
            .await
    }
}
