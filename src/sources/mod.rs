// src/sources/mod.rs
//! Source adapters: the three upstreams polled by the bridge, normalized into [`Item`]s.

pub mod feed;
pub mod readwise;
pub mod youtube;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of upstream. Also the top-level key of the persisted delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Youtube,
    Highlights,
    Feeds,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Youtube, Self::Highlights, Self::Feeds];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Highlights => "highlights",
            Self::Feeds => "feeds",
        }
    }

    /// Keyed kinds track one watermark per sub-source; the others keep a single scalar.
    pub fn is_keyed(self) -> bool {
        !matches!(self, Self::Highlights)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An individually tracked unit within a source kind (one playlist, one feed URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSource {
    /// `None` for scalar kinds.
    pub key: Option<String>,
    pub label: String,
}

impl SubSource {
    pub fn keyed(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            label: label.into(),
        }
    }

    pub fn scalar(label: impl Into<String>) -> Self {
        Self {
            key: None,
            label: label.into(),
        }
    }
}

/// One deliverable unit, whatever the upstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub url: Option<String>,
    /// `None` when the upstream had no date or it did not parse.
    pub timestamp: Option<DateTime<Utc>>,
    pub meta: BTreeMap<String, String>,
}

impl Item {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn sub_sources(&self) -> Vec<SubSource>;

    /// Credentials and configuration are present.
    fn can_operate(&self) -> bool;

    /// Fetch a bounded batch of candidates. `since` is the current watermark, usable
    /// as a server-side filter hint; the caller filters again regardless.
    async fn fetch(&self, sub: &SubSource, since: Option<DateTime<Utc>>) -> Result<Vec<Item>>;

    /// Render the chat message for one item.
    fn format(&self, item: &Item) -> String;
}

/// Best-effort mirror of a delivered item (side channel).
#[async_trait::async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, item: &Item) -> Result<()>;
}

/// Zone-less layouts seen in hand-rolled feeds; read as UTC.
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse an upstream date: RFC 3339 (Atom, JSON APIs), then RFC 2822 (RSS), then a
/// few zone-less layouts and a bare date, both taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s).or_else(|_| DateTime::parse_from_rfc2822(s)) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
