use std::path::Path;

use postmill_adapters::{adapter_for_store, enrich_post, EntityCatalog, FeedSource, FileFeed};
use postmill_core::{Diagnostic, StoreKind, StoreMode};
use serde_json::json;

fn fixture(relative: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(relative)
}

#[tokio::test]
async fn page_feed_fixture_gates_posts_per_store() {
    let payload = FileFeed::new(fixture("feed/page_posts.json")).fetch().await.unwrap();
    assert_eq!(payload.posts.len(), 8);

    let gated: Vec<(StoreKind, usize)> = StoreKind::ALL
        .into_iter()
        .filter(|kind| kind.mode() == StoreMode::Ingest)
        .map(|kind| {
            let adapter = adapter_for_store(kind).unwrap();
            (kind, payload.posts.iter().filter(|p| adapter.accepts(p)).count())
        })
        .collect();
    assert_eq!(
        gated,
        vec![
            (StoreKind::Recruitments, 1),
            (StoreKind::Events, 3),
            (StoreKind::FacebookPosts, 2),
            (StoreKind::News, 1)
        ]
    );
}

#[tokio::test]
async fn recruitment_fixture_parses_every_field() {
    let payload = FileFeed::new(fixture("feed/page_posts.json")).fetch().await.unwrap();
    let adapter = adapter_for_store(StoreKind::Recruitments).unwrap();
    let post = payload.posts.iter().find(|p| adapter.accepts(p)).unwrap();

    let parsed = adapter.parse_post(post);
    assert!(parsed.diagnostics.is_empty());
    let keys: Vec<&str> = parsed.record.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "id",
            "created_time",
            "full_picture",
            "company",
            "title",
            "description",
            "level",
            "location",
            "salary",
            "work_time",
            "requirements",
            "benefits",
            "apply_deadline",
            "apply",
            "tags"
        ]
    );
    assert_eq!(parsed.record["salary"], json!("1000 - 1500 USD"));
    assert_eq!(parsed.record["work_time"], json!("Mon - Fri"));
    assert_eq!(parsed.record["requirements"], json!(["C/C++", "FreeRTOS"]));
    assert_eq!(parsed.record["tags"], json!(["firmware", "rtos"]));
    assert_eq!(
        parsed.record["apply"],
        json!({"email": "jobs@embedded.test", "contact_person": "Ms. Lan"})
    );
}

#[tokio::test]
async fn event_without_title_is_reported() {
    let payload = FileFeed::new(fixture("feed/page_posts.json")).fetch().await.unwrap();
    let adapter = adapter_for_store(StoreKind::Events).unwrap();
    let untitled = payload
        .posts
        .iter()
        .find(|p| p.id == "1029384756_1008")
        .unwrap();

    let parsed = adapter.parse_post(untitled);
    assert_eq!(parsed.record["title"], serde_json::Value::Null);
    assert_eq!(parsed.record["date"], json!("2026-01-10"));
    assert_eq!(
        parsed.diagnostics,
        vec![Diagnostic::MissingField {
            field: "title".into()
        }]
    );
}

#[tokio::test]
async fn hashtag_authors_resolve_against_the_catalog_fixture() {
    let payload = FileFeed::new(fixture("feed/page_posts.json")).fetch().await.unwrap();
    let authors = EntityCatalog::load("authors", fixture("catalogs/authors.json"))
        .await
        .unwrap();
    let adapter = adapter_for_store(StoreKind::FacebookPosts).unwrap();

    let records: Vec<_> = payload
        .posts
        .iter()
        .filter(|p| adapter.accepts(p))
        .map(|p| enrich_post(adapter.parse_post(p), &authors).record)
        .collect();
    assert_eq!(records[0]["author"]["id"], json!("A007"));
    assert_eq!(
        records[0]["description"],
        json!("What we learned bringing up the rev B board.\nClock tree first, then DDR.\n#posts #A007 #CAHardware")
    );
    assert!(!records[1].contains_key("author"));
    assert!(!records[1].contains_key("author_id"));
}
