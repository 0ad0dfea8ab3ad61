// src/poll/mod.rs
//! # Poll cycle
//! fetch → drop undated → stable sort → select → deliver one by one, persisting the
//! advanced watermark after every successful delivery.
//!
//! Selection policy: with a watermark, everything strictly newer; without one, only
//! the newest item, so a fresh sub-source never floods the channel with backfill.

pub mod scheduler;

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;

use crate::notify::DeliverySink;
use crate::sources::{Archiver, Item, SourceAdapter, SourceKind, SubSource};
use crate::state::{SharedState, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Progress could not be made durable; continuing would risk duplicate delivery.
    #[error("{kind} cycle aborted: failed to persist delivery state")]
    Persist {
        kind: SourceKind,
        #[source]
        source: StoreError,
    },
}

/// Pick what to deliver from a fetched batch, oldest first.
///
/// Undated items are dropped. The sort is stable, so items with equal timestamps keep
/// their fetch order.
pub fn select_new(items: Vec<Item>, watermark: Option<DateTime<Utc>>) -> Vec<Item> {
    let mut dated: Vec<Item> = items.into_iter().filter(|i| i.timestamp.is_some()).collect();
    dated.sort_by_key(|i| i.timestamp);

    match watermark {
        Some(wm) => dated
            .into_iter()
            .filter(|i| i.timestamp.is_some_and(|ts| ts > wm))
            .collect(),
        None => dated.pop().into_iter().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubSourceReport {
    pub label: String,
    pub fetched: usize,
    pub delivered: usize,
    /// Fetch or delivery failure that cut this sub-source short.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub kind: SourceKind,
    /// Adapter or sink could not operate; nothing was attempted.
    pub skipped: bool,
    pub sub_sources: Vec<SubSourceReport>,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.sub_sources.iter().map(|s| s.delivered).sum()
    }

    pub fn failures(&self) -> usize {
        self.sub_sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// One source kind wired to the sink, the optional archive side channel, and the
/// shared delivery state.
#[derive(Clone)]
pub struct PollCycle {
    adapter: Arc<dyn SourceAdapter>,
    sink: Arc<dyn DeliverySink>,
    archiver: Option<Arc<dyn Archiver>>,
    state: SharedState,
}

impl PollCycle {
    pub fn new(adapter: Arc<dyn SourceAdapter>, sink: Arc<dyn DeliverySink>, state: SharedState) -> Self {
        Self {
            adapter,
            sink,
            archiver: None,
            state,
        }
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.adapter.kind()
    }

    /// Run every sub-source once. Fetch and delivery failures stay inside their
    /// sub-source; only a persistence failure aborts the cycle.
    pub async fn run(&self) -> Result<CycleReport, PollError> {
        let kind = self.kind();
        let mut report = CycleReport {
            kind,
            skipped: false,
            sub_sources: Vec::new(),
        };

        if !self.adapter.can_operate() {
            tracing::warn!(source = %kind, "skipping cycle: source not configured");
            report.skipped = true;
            return Ok(report);
        }
        if !self.sink.can_operate() {
            tracing::warn!(source = %kind, "skipping cycle: delivery sink not configured");
            report.skipped = true;
            return Ok(report);
        }

        for sub in self.adapter.sub_sources() {
            let sub_report = self.run_sub_source(&sub).await?;
            report.sub_sources.push(sub_report);
        }
        Ok(report)
    }

    async fn run_sub_source(&self, sub: &SubSource) -> Result<SubSourceReport, PollError> {
        let kind = self.kind();
        let key = sub.key.as_deref();
        let mut report = SubSourceReport {
            label: sub.label.clone(),
            ..SubSourceReport::default()
        };

        let watermark = self.state.watermark(kind, key).await;
        let items = match self.adapter.fetch(sub, watermark).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(source = %kind, sub_source = %sub.label, error = ?e, "fetch failed, skipping sub-source");
                counter!("bridge_fetch_errors_total", "source" => kind.as_str()).increment(1);
                report.error = Some(format!("fetch: {e:#}"));
                return Ok(report);
            }
        };
        report.fetched = items.len();

        let batch = select_new(items, watermark);
        if batch.is_empty() {
            tracing::debug!(source = %kind, sub_source = %sub.label, "nothing new");
            return Ok(report);
        }
        tracing::info!(
            source = %kind,
            sub_source = %sub.label,
            new = batch.len(),
            first_run = watermark.is_none(),
            "delivering new items"
        );

        for item in batch {
            let Some(ts) = item.timestamp else { continue };

            let text = self.adapter.format(&item);
            if let Err(e) = self.sink.deliver(&text).await {
                tracing::warn!(source = %kind, sub_source = %sub.label, item_id = %item.id, error = ?e, "delivery failed, stopping sub-source batch");
                counter!("bridge_delivery_errors_total", "source" => kind.as_str()).increment(1);
                report.error = Some(format!("deliver {}: {e:#}", item.id));
                return Ok(report);
            }
            report.delivered += 1;
            counter!("bridge_items_delivered_total", "source" => kind.as_str()).increment(1);
            tracing::info!(source = %kind, sub_source = %sub.label, item_id = %item.id, "delivered");

            self.state
                .advance_and_persist(kind, key, ts)
                .await
                .map_err(|source| PollError::Persist { kind, source })?;

            self.archive(&item).await;
        }
        Ok(report)
    }

    /// Side channel: failures are logged and dropped.
    async fn archive(&self, item: &Item) {
        let Some(archiver) = &self.archiver else {
            return;
        };
        let kind = self.kind();
        match archiver.archive(item).await {
            Ok(()) => tracing::info!(source = %kind, item_id = %item.id, "archived"),
            Err(e) => {
                tracing::warn!(source = %kind, item_id = %item.id, error = ?e, "archive failed, ignoring");
                counter!("bridge_archive_errors_total", "source" => kind.as_str()).increment(1);
            }
        }
    }
}
