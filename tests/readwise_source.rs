// tests/readwise_source.rs
mod common;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use feed_relay::sources::readwise::ReadwiseClient;
use feed_relay::{Archiver, Item, SourceAdapter, SubSource};

#[derive(Clone, Default)]
struct Api {
    base: Arc<Mutex<String>>,
    list_calls: Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>,
    book_calls: Arc<Mutex<Vec<u64>>>,
    created: Arc<Mutex<Vec<Value>>>,
}

async fn list(
    State(api): State<Api>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    api.list_calls.lock().push((auth, q.clone()));

    if q.get("page").map(String::as_str) == Some("2") {
        return Json(json!({
            "next": null,
            "results": [
                { "id": 3, "text": "third", "book_id": 9, "updated": "2024-02-01T12:00:00Z" }
            ]
        }));
    }
    let next = format!("{}/highlights/?page=2", api.base.lock());
    Json(json!({
        "next": next,
        "results": [
            { "id": 1, "text": "first", "book_id": 7, "updated": "2024-02-01T10:00:00Z" },
            { "id": "2", "text": "second", "book_id": 7, "note": "n",
              "source_url": "https://article.example/x", "updated": "2024-02-01T11:00:00Z" }
        ]
    }))
}

async fn create(State(api): State<Api>, Json(body): Json<Value>) -> StatusCode {
    api.created.lock().push(body);
    StatusCode::CREATED
}

async fn book(State(api): State<Api>, Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    api.book_calls.lock().push(id);
    match id {
        7 => (StatusCode::OK, Json(json!({ "id": 7, "title": "Deep Work" }))),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
    }
}

async fn mock_api() -> (Api, String) {
    let api = Api::default();
    let app = Router::new()
        .route("/highlights/", get(list).post(create))
        .route("/books/{id}/", get(book))
        .with_state(api.clone());
    let base = common::serve(app).await;
    *api.base.lock() = base.clone();
    (api, base)
}

fn client(base: &str) -> ReadwiseClient {
    ReadwiseClient::new(reqwest::Client::new(), "rw-token".into()).with_base_url(base)
}

#[tokio::test]
async fn fetch_sends_filter_and_follows_next() {
    let (api, base) = mock_api().await;
    let since = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();

    let items = client(&base).fetch_highlights(Some(since)).await.unwrap();

    let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3"]);

    let calls = api.list_calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0.as_deref(), Some("Token rw-token"));
    assert_eq!(calls[0].1["updated__gt"], "2024-02-01T09:00:00.000Z");
    assert_eq!(calls[0].1["page_size"], "100");
    assert_eq!(calls[1].0.as_deref(), Some("Token rw-token"));
}

#[tokio::test]
async fn first_fetch_has_no_filter_and_page_bound_applies() {
    let (api, base) = mock_api().await;

    let items = client(&base).with_max_pages(1).fetch_highlights(None).await.unwrap();

    assert_eq!(items.len(), 2);
    let calls = api.list_calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].1.contains_key("updated__gt"));
}

#[tokio::test]
async fn book_titles_are_resolved_and_cached() {
    let (api, base) = mock_api().await;
    let rw = client(&base);

    let items = rw.fetch_highlights(None).await.unwrap();
    assert_eq!(items[0].title, "Deep Work");
    assert_eq!(items[1].title, "Deep Work");
    // book 9 failed: title left empty, message falls back
    assert_eq!(items[2].title, "");
    assert!(rw.format(&items[2]).starts_with("Readwise Highlight\nthird"));

    rw.fetch_highlights(None).await.unwrap();
    let mut books = api.book_calls.lock().clone();
    books.sort_unstable();
    // 7 fetched once; the failing 9 is retried on the next fetch
    assert_eq!(books, [7, 9, 9]);
}

#[tokio::test]
async fn adapter_formats_note_and_source_url() {
    let (_api, base) = mock_api().await;
    let rw = client(&base);
    let items = rw.fetch(&SubSource::scalar("highlights"), None).await.unwrap();

    assert_eq!(
        rw.format(&items[1]),
        "Deep Work\nsecond\n\nNote: n\nhttps://article.example/x"
    );
}

#[tokio::test]
async fn archive_creates_an_article_highlight() {
    let (api, base) = mock_api().await;
    let video = Item {
        id: "abc".into(),
        title: "A talk".into(),
        url: Some("https://www.youtube.com/watch?v=abc".into()),
        ..Item::default()
    };

    client(&base).archive(&video).await.unwrap();

    let created = api.created.lock().clone();
    assert_eq!(created.len(), 1);
    let h = &created[0]["highlights"][0];
    assert_eq!(h["text"], "A talk");
    assert_eq!(h["title"], "A talk");
    assert_eq!(h["source_url"], "https://www.youtube.com/watch?v=abc");
    assert_eq!(h["location_type"], "article");
}

#[tokio::test]
async fn dry_run_skips_archival() {
    let (api, base) = mock_api().await;
    client(&base)
        .with_dry_run(true)
        .save_highlight("t", "t", None)
        .await
        .unwrap();
    assert!(api.created.lock().is_empty());
}

#[tokio::test]
async fn missing_token_disables_the_source() {
    let rw = ReadwiseClient::new(reqwest::Client::new(), String::new());
    assert!(!rw.can_operate());
    assert!(rw.fetch_highlights(None).await.is_err());
    assert!(rw.save_highlight("t", "t", None).await.is_err());
}
