// src/format.rs
//! Text helpers shared by the per-source message templates.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

const ELLIPSIS: char = '…';

/// Cut to at most `max` characters (not bytes), marking the cut with an ellipsis.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// Bound a whole outbound message to the transport limit.
pub fn bound_message(text: &str, limit: usize) -> String {
    truncate_chars(text.trim_end(), limit)
}

/// Decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[ \t\r\f\v\x{A0}]+").expect("static regex"));

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, "");
    let collapsed = re_ws.replace_all(&stripped, " ");

    collapsed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// "3 hours ago", "in 2 days", "just now".
pub fn relative_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(ts);
    let future = delta.num_seconds() < 0;
    let secs = delta.num_seconds().unsigned_abs();

    let (n, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    let plural = if n == 1 { "" } else { "s" };
    if future {
        format!("in {n} {unit}{plural}")
    } else {
        format!("{n} {unit}{plural} ago")
    }
}
