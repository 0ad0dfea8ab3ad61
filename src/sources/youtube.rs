// src/sources/youtube.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{parse_timestamp, Item, SourceAdapter, SourceKind, SubSource};
use crate::format::{relative_age, truncate_chars};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const PAGE_SIZE: u32 = 50;
const DESCRIPTION_MAX_CHARS: usize = 400;

/// A configured playlist; `label` distinguishes e.g. `youtube` from `music`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    content_details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    video_id: Option<String>,
    video_published_at: Option<String>,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Parse one `playlistItems` page. Entries without a video id are dropped.
pub fn parse_playlist_page(body: &str, label: &str) -> Result<(Vec<Item>, Option<String>)> {
    let page: PlaylistItemsPage =
        serde_json::from_str(body).context("parsing playlistItems response")?;

    let items = page
        .items
        .into_iter()
        .filter_map(|it| {
            let id = it.content_details.video_id.filter(|v| !v.is_empty())?;
            let published = it
                .content_details
                .video_published_at
                .or(it.snippet.published_at);
            Some(Item {
                url: Some(watch_url(&id)),
                title: it.snippet.title.unwrap_or_else(|| "Untitled".to_string()),
                body: it.snippet.description.filter(|d| !d.trim().is_empty()),
                timestamp: published.as_deref().and_then(parse_timestamp),
                meta: [("playlist_label".to_string(), label.to_string())].into(),
                id,
            })
        })
        .collect();

    Ok((items, page.next_page_token.filter(|t| !t.is_empty())))
}

pub struct YoutubeSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    playlists: Vec<Playlist>,
    max_pages: u32,
}

impl YoutubeSource {
    pub fn new(client: reqwest::Client, api_key: String, playlists: Vec<Playlist>) -> Self {
        Self {
            client,
            base_url: YOUTUBE_API_BASE.to_string(),
            api_key,
            playlists,
            max_pages: 3,
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    pub async fn fetch_playlist_items(&self, playlist_id: &str, label: &str) -> Result<Vec<Item>> {
        let playlist_id = playlist_id.trim();
        if playlist_id.is_empty() {
            bail!("YouTube playlist id missing");
        }
        if playlist_id.ends_with('.') {
            bail!("YouTube playlist id looks invalid (trailing period): {playlist_id}");
        }

        let url = format!("{}/playlistItems", self.base_url);
        let max_results = PAGE_SIZE.to_string();
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut query: Vec<(&str, &str)> = vec![
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", &max_results),
                ("key", &self.api_key),
            ];
            if let Some(tok) = page_token.as_deref() {
                query.push(("pageToken", tok));
            }

            let rsp = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| e.without_url())
                .context("youtube playlistItems request")?;
            let status = rsp.status();
            let body = rsp.text().await.context("youtube .text()")?;
            if !status.is_success() {
                bail!(
                    "YouTube API returned {status} for playlist {playlist_id}: {}",
                    truncate_chars(&body, 300)
                );
            }

            let (mut items, next) = parse_playlist_page(&body, label)?;
            out.append(&mut items);
            match next {
                Some(tok) => page_token = Some(tok),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn format_message(item: &Item, now: DateTime<Utc>) -> String {
        let link = item.url.clone().unwrap_or_else(|| watch_url(&item.id));
        let published = item
            .timestamp
            .map(|ts| format!("\nPublished {}.", relative_age(ts, now)))
            .unwrap_or_default();
        let description = item
            .body
            .as_deref()
            .map(|d| format!("\n\n{}", truncate_chars(d.trim(), DESCRIPTION_MAX_CHARS)))
            .unwrap_or_default();
        let tag = match item.meta("playlist_label") {
            Some(label) if label != "youtube" => format!("\n#{label}"),
            _ => String::new(),
        };
        format!("{}\n{}{}{}{}", item.title, link, published, tag, description)
    }
}

#[async_trait]
impl SourceAdapter for YoutubeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Youtube
    }

    fn sub_sources(&self) -> Vec<SubSource> {
        self.playlists
            .iter()
            .map(|p| SubSource::keyed(p.id.clone(), p.label.clone()))
            .collect()
    }

    fn can_operate(&self) -> bool {
        !self.api_key.is_empty() && !self.playlists.is_empty()
    }

    async fn fetch(&self, sub: &SubSource, _since: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
        let id = sub.key.as_deref().context("playlist sub-source without id")?;
        self.fetch_playlist_items(id, &sub.label).await
    }

    fn format(&self, item: &Item) -> String {
        Self::format_message(item, Utc::now())
    }
}
