// src/sources/feed.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{parse_timestamp, Item, SourceAdapter, SourceKind, SubSource};
use crate::format::clean_text;

const UNTITLED: &str = "Untitled";

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Element whose attributes we don't care about (`<title type="html">`, `<guid isPermaLink>`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse an RSS 2.0 or Atom document into items. Entries without a title are kept as
/// "Untitled"; entries with an unparseable date keep `timestamp = None`.
pub fn parse_feed(xml: &str) -> Result<Vec<Item>> {
    let t0 = std::time::Instant::now();
    let xml = scrub_html_entities_for_xml(xml);
    let root = root_element(&xml);

    let items = match root.as_deref() {
        Some("rss") => {
            let rss: Rss = from_str(&xml).context("parsing rss xml")?;
            rss.channel.item.into_iter().map(rss_item).collect()
        }
        Some("feed") => {
            let feed: AtomFeed = from_str(&xml).context("parsing atom xml")?;
            feed.entry.into_iter().map(atom_entry).collect()
        }
        Some(other) => bail!("unsupported feed root element <{other}>"),
        None => bail!("document has no root element"),
    };

    histogram!("bridge_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(items)
}

fn rss_item(it: RssItem) -> Item {
    let title = non_empty(it.title.as_deref().map(clean_text))
        .unwrap_or_else(|| UNTITLED.to_string());
    let link = non_empty(it.link.map(|l| l.trim().to_string()));
    let guid = non_empty(it.guid.map(|g| g.value.trim().to_string()));
    Item {
        id: guid
            .or_else(|| link.clone())
            .unwrap_or_else(|| synthetic_id(&title, link.as_deref())),
        body: non_empty(it.description.as_deref().map(clean_text)),
        timestamp: it.pub_date.as_deref().and_then(parse_timestamp),
        url: link,
        title,
        ..Item::default()
    }
}

fn atom_entry(e: AtomEntry) -> Item {
    let title = non_empty(e.title.map(|t| clean_text(&t.value)))
        .unwrap_or_else(|| UNTITLED.to_string());
    let link = e
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string());
    let link = non_empty(link);
    let stamp = e.published.or(e.updated);
    Item {
        id: non_empty(e.id.map(|i| i.trim().to_string()))
            .or_else(|| link.clone())
            .unwrap_or_else(|| synthetic_id(&title, link.as_deref())),
        body: non_empty(e.summary.map(|s| clean_text(&s.value))),
        timestamp: stamp.as_deref().and_then(parse_timestamp),
        url: link,
        title,
        ..Item::default()
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Stable short id for entries that carry neither guid nor link.
fn synthetic_id(title: &str, link: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(link.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Name of the first element, skipping the prolog, comments and processing instructions.
fn root_element(xml: &str) -> Option<String> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }
        let name: String = rest
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
            .collect();
        // `<atom:feed>` style prefixes
        return Some(name.rsplit(':').next().unwrap_or_default().to_string());
    }
}

/// HTML entities that show up in real feeds but are not defined in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// RSS/Atom feeds, one watermark per feed URL.
pub struct FeedSource {
    client: reqwest::Client,
    feeds: Vec<String>,
}

impl FeedSource {
    pub fn new(client: reqwest::Client, feeds: Vec<String>) -> Self {
        Self { client, feeds }
    }

    pub fn format_message(item: &Item) -> String {
        let link = item
            .url
            .as_deref()
            .map(|l| format!("\n{l}"))
            .unwrap_or_default();
        format!("📰 New post #blog\n{}{}", item.title, link)
    }
}

#[async_trait]
impl SourceAdapter for FeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Feeds
    }

    fn sub_sources(&self) -> Vec<SubSource> {
        self.feeds
            .iter()
            .map(|url| SubSource::keyed(url.clone(), url.clone()))
            .collect()
    }

    fn can_operate(&self) -> bool {
        !self.feeds.is_empty()
    }

    async fn fetch(&self, sub: &SubSource, _since: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
        let url = sub.key.as_deref().context("feed sub-source without URL")?;
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("feed http get()")?
            .error_for_status()
            .context("feed non-2xx")?
            .text()
            .await
            .context("feed http .text()")?;
        parse_feed(&body).with_context(|| format!("parsing feed {url}"))
    }

    fn format(&self, item: &Item) -> String {
        Self::format_message(item)
    }
}
