// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use feed_relay::{Archiver, DeliverySink, Item, SourceAdapter, SourceKind, SubSource};

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

pub fn item(id: &str, hour: Option<u32>) -> Item {
    Item {
        id: id.to_string(),
        title: format!("title {id}"),
        timestamp: hour.map(at),
        ..Item::default()
    }
}

/// Bind an axum router on an ephemeral port; returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Adapter with scripted fetch results per sub-source key. `format` returns the item id.
pub struct MockAdapter {
    kind: SourceKind,
    subs: Vec<SubSource>,
    batches: Mutex<HashMap<Option<String>, Result<Vec<Item>, String>>>,
    pub seen_since: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl MockAdapter {
    pub fn keyed(kind: SourceKind, keys: &[&str]) -> Self {
        Self::with_subs(kind, keys.iter().map(|k| SubSource::keyed(*k, *k)).collect())
    }

    pub fn scalar(kind: SourceKind) -> Self {
        Self::with_subs(kind, vec![SubSource::scalar(kind.as_str())])
    }

    fn with_subs(kind: SourceKind, subs: Vec<SubSource>) -> Self {
        Self {
            kind,
            subs,
            batches: Mutex::new(HashMap::new()),
            seen_since: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, key: Option<&str>, items: Vec<Item>) {
        self.batches.lock().insert(key.map(str::to_string), Ok(items));
    }

    pub fn fail(&self, key: Option<&str>, msg: &str) {
        self.batches
            .lock()
            .insert(key.map(str::to_string), Err(msg.to_string()));
    }
}

#[async_trait::async_trait]
impl SourceAdapter for MockAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn sub_sources(&self) -> Vec<SubSource> {
        self.subs.clone()
    }

    fn can_operate(&self) -> bool {
        !self.subs.is_empty()
    }

    async fn fetch(&self, sub: &SubSource, since: Option<DateTime<Utc>>) -> Result<Vec<Item>> {
        self.seen_since.lock().push(since);
        match self.batches.lock().get(&sub.key).cloned() {
            Some(Ok(items)) => Ok(items),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(Vec::new()),
        }
    }

    fn format(&self, item: &Item) -> String {
        item.id.clone()
    }
}

/// Records every delivered text. Can fail on a given text, and can snapshot the
/// state file at the moment each delivery is attempted.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<String>>,
    pub probe_file: Option<PathBuf>,
    pub snapshots: Mutex<Vec<String>>,
    /// Text whose delivery makes the next state write fail (directory squats the temp path).
    pub break_store_after: Mutex<Option<String>>,
    pub disabled: bool,
}

impl RecordingSink {
    pub fn probing(path: PathBuf) -> Self {
        Self {
            probe_file: Some(path),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl DeliverySink for RecordingSink {
    fn can_operate(&self) -> bool {
        !self.disabled
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        if let Some(path) = &self.probe_file {
            let snap = std::fs::read_to_string(path).unwrap_or_default();
            self.snapshots.lock().push(snap);
        }
        if self.fail_on.lock().as_deref() == Some(text) {
            return Err(anyhow!("chat API unavailable"));
        }
        self.sent.lock().push(text.to_string());

        if self.break_store_after.lock().as_deref() == Some(text) {
            if let Some(path) = &self.probe_file {
                let mut tmp = path.file_name().unwrap().to_os_string();
                tmp.push(".tmp");
                std::fs::create_dir_all(path.with_file_name(tmp)).unwrap();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingArchiver {
    pub archived: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl Archiver for RecordingArchiver {
    async fn archive(&self, item: &Item) -> Result<()> {
        if self.fail {
            return Err(anyhow!("highlights API rejected the request"));
        }
        self.archived.lock().push(item.id.clone());
        Ok(())
    }
}
