// src/state/mod.rs
//! Delivery state: the per-source watermarks and the single serialized path that
//! mutates and persists them.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::sources::SourceKind;
pub use store::{StoreError, WatermarkStore};

/// Sub-source key used when a keyed kind carries a legacy scalar, or is addressed without a key.
pub const DEFAULT_SUB_KEY: &str = "default";

/// Top-level field names written by the first deployment of the bridge.
const LEGACY_KEYS: [(&str, SourceKind); 3] = [
    ("lastYouTubePublishedAt", SourceKind::Youtube),
    ("lastReadwiseHighlightUpdatedAt", SourceKind::Highlights),
    ("rss", SourceKind::Feeds),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Watermarks {
    Keyed(#[serde(deserialize_with = "keyed_skipping_null")] BTreeMap<String, DateTime<Utc>>),
    Scalar(Option<DateTime<Utc>>),
}

/// A sub-source stored as `null` has never delivered anything; treat it as absent.
fn keyed_skipping_null<'de, D>(de: D) -> Result<BTreeMap<String, DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<DateTime<Utc>>>::deserialize(de)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, ts)| ts.map(|ts| (key, ts)))
        .collect())
}

impl Watermarks {
    fn empty_for(kind: SourceKind) -> Self {
        if kind.is_keyed() {
            Self::Keyed(BTreeMap::new())
        } else {
            Self::Scalar(None)
        }
    }

    /// Reshape to what `kind` expects.
    fn migrate(self, kind: SourceKind) -> Self {
        match (kind.is_keyed(), self) {
            (true, Self::Scalar(Some(ts))) => {
                Self::Keyed(BTreeMap::from([(DEFAULT_SUB_KEY.to_string(), ts)]))
            }
            (true, Self::Scalar(None)) => Self::Keyed(BTreeMap::new()),
            (false, Self::Keyed(map)) => Self::Scalar(map.into_values().max()),
            (_, same) => same,
        }
    }
}

/// The persisted document: source kind → watermark(s).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeliveryState {
    kinds: BTreeMap<SourceKind, Watermarks>,
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self {
            kinds: SourceKind::ALL
                .into_iter()
                .map(|k| (k, Watermarks::empty_for(k)))
                .collect(),
        }
    }
}

impl DeliveryState {
    /// Parse a state document, upgrading older shapes on the way.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
        let mut state = Self::default();

        for (name, value) in doc {
            let kind = SourceKind::parse(&name).or_else(|| {
                LEGACY_KEYS
                    .iter()
                    .find(|(legacy, _)| *legacy == name)
                    .map(|(_, k)| *k)
            });
            let Some(kind) = kind else {
                tracing::debug!(key = %name, "dropping unknown state key");
                continue;
            };
            let marks: Watermarks = serde_json::from_value(value)?;
            state.kinds.insert(kind, marks.migrate(kind));
        }
        Ok(state)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn get(&self, kind: SourceKind, sub: Option<&str>) -> Option<DateTime<Utc>> {
        match self.kinds.get(&kind)? {
            Watermarks::Keyed(map) => map.get(sub.unwrap_or(DEFAULT_SUB_KEY)).copied(),
            Watermarks::Scalar(ts) => *ts,
        }
    }

    /// Move the watermark forward to `ts`. Returns `false` (and changes nothing) when
    /// `ts` is not strictly newer than the current value.
    pub fn advance(&mut self, kind: SourceKind, sub: Option<&str>, ts: DateTime<Utc>) -> bool {
        if self.get(kind, sub).is_some_and(|cur| ts <= cur) {
            return false;
        }
        let slot = self
            .kinds
            .entry(kind)
            .or_insert_with(|| Watermarks::empty_for(kind));
        match slot {
            Watermarks::Keyed(map) => {
                map.insert(sub.unwrap_or(DEFAULT_SUB_KEY).to_string(), ts);
            }
            Watermarks::Scalar(cur) => *cur = Some(ts),
        }
        true
    }

    pub fn watermarks(&self, kind: SourceKind) -> Option<&Watermarks> {
        self.kinds.get(&kind)
    }
}

/// The one owned delivery state, shared by all poll cycles.
///
/// Every advance happens under the mutex and is written to disk before the lock is
/// released, so cross-source cycles never interleave their writes.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<DeliveryState>>,
    store: Arc<WatermarkStore>,
}

impl SharedState {
    pub fn new(state: DeliveryState, store: WatermarkStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            store: Arc::new(store),
        }
    }

    /// Load from the store (defaulting on missing or corrupt files).
    pub async fn open(store: WatermarkStore) -> Self {
        let state = store.load().await;
        Self::new(state, store)
    }

    pub async fn watermark(&self, kind: SourceKind, sub: Option<&str>) -> Option<DateTime<Utc>> {
        self.inner.lock().await.get(kind, sub)
    }

    /// Advance and persist. The in-memory state is only replaced once the write
    /// succeeded, so memory never runs ahead of disk.
    pub async fn advance_and_persist(
        &self,
        kind: SourceKind,
        sub: Option<&str>,
        ts: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let mut next = guard.clone();
        if !next.advance(kind, sub, ts) {
            return Ok(false);
        }
        self.store.save(&next).await?;
        *guard = next;
        Ok(true)
    }

    pub async fn snapshot(&self) -> DeliveryState {
        self.inner.lock().await.clone()
    }
}
