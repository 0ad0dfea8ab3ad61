// src/config/feeds.rs
//! Feed list files: `feeds = [..]` in TOML, or a bare JSON array of URLs. The file
//! extension decides which.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PATH: &str = "RSS_FEEDS_PATH";

/// Looked up in order when `RSS_FEEDS_PATH` is unset.
const SEARCH_PATHS: [&str; 2] = ["config/feeds.toml", "config/feeds.json"];

#[derive(Debug, Deserialize)]
struct FeedListToml {
    feeds: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListFormat {
    Toml,
    Json,
}

impl ListFormat {
    fn of(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => bail!("feed list {} must be a .toml or .json file", path.display()),
        }
    }

    /// URLs in file order, trimmed, blanks and repeats removed.
    fn parse(self, raw: &str) -> Result<Vec<String>> {
        let urls = match self {
            Self::Toml => {
                toml::from_str::<FeedListToml>(raw)
                    .context("expected `feeds = [\"https://..\"]`")?
                    .feeds
            }
            Self::Json => serde_json::from_str::<Vec<String>>(raw)
                .context("expected a JSON array of feed URLs")?,
        };
        Ok(super::dedup(
            urls.into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        ))
    }
}

pub fn load_feeds_from(path: &Path) -> Result<Vec<String>> {
    let format = ListFormat::of(path)?;
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading feed list {}", path.display()))?;
    let urls = format
        .parse(&raw)
        .with_context(|| format!("parsing feed list {}", path.display()))?;
    tracing::debug!(path = %path.display(), feeds = urls.len(), "feed list loaded");
    Ok(urls)
}

/// `$RSS_FEEDS_PATH` when set (it must exist), else the first of `config/feeds.toml`,
/// `config/feeds.json`. No file at all yields an empty list.
pub fn load_feeds_default() -> Result<Vec<String>> {
    let configured = std::env::var(ENV_PATH)
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    if let Some(p) = configured {
        let path = PathBuf::from(p);
        if !path.exists() {
            bail!("{ENV_PATH} points to missing file {}", path.display());
        }
        return load_feeds_from(&path);
    }

    match SEARCH_PATHS.iter().map(Path::new).find(|p| p.exists()) {
        Some(path) => load_feeds_from(path),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ListFormat::of(Path::new("a/feeds.toml")).unwrap(), ListFormat::Toml);
        assert_eq!(ListFormat::of(Path::new("FEEDS.JSON")).unwrap(), ListFormat::Json);
        assert!(ListFormat::of(Path::new("feeds.yaml")).is_err());
        assert!(ListFormat::of(Path::new("feeds")).is_err());
    }

    #[test]
    fn both_formats_trim_and_dedup() {
        let toml = r#"feeds = [" https://a/rss ", "", "https://b/atom", "https://a/rss"]"#;
        assert_eq!(ListFormat::Toml.parse(toml).unwrap(), ["https://a/rss", "https://b/atom"]);
        let json = r#"["https://c/feed", "  ", "https://c/feed"]"#;
        assert_eq!(ListFormat::Json.parse(json).unwrap(), ["https://c/feed"]);
    }

    #[test]
    fn content_must_match_the_extension() {
        assert!(ListFormat::Json.parse(r#"feeds = ["https://a/rss"]"#).is_err());
        assert!(ListFormat::Toml.parse(r#"["https://a/rss"]"#).is_err());
    }
}
