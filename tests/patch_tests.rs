/// Single document read-modify-write
///
/// Run with: cargo test --test patch_tests

mod common;

use common::{Op, RecordingStore, forbidden, retries};
use couchforce::{Document, ErrorKind, ForceError, MemoryStore, Patch, PatchOptions, patch};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_patch_merges_into_existing_document() {
    let store = Arc::new(RecordingStore::new("test"));
    store
        .seed(Document::new("mydoc").set("foo", "bar").set("keep", 1))
        .await;

    let doc = patch(
        store.clone(),
        &Patch::new("mydoc").set("foo", "baz").set("added", true),
        PatchOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(doc.get("foo"), Some(&json!("baz")));
    assert_eq!(doc.get("keep"), Some(&json!(1)));
    assert_eq!(doc.get("added"), Some(&json!(true)));
    assert_eq!(store.stored("mydoc").await.unwrap(), doc);
    assert_eq!(store.calls(Op::Get), 1);
    assert_eq!(store.calls(Op::Insert), 1);
}

#[tokio::test]
async fn test_patch_null_removes_field() {
    let store = Arc::new(RecordingStore::new("test"));
    store.seed(Document::new("mydoc").set("foo", "bar").set("baz", 2)).await;

    let doc = patch(store.clone(), &Patch::new("mydoc").unset("foo"), PatchOptions::default())
        .await
        .unwrap();

    assert_eq!(doc.get("foo"), None);
    assert_eq!(doc.get("baz"), Some(&json!(2)));
}

#[tokio::test]
async fn test_patch_creates_missing_document() {
    let store = Arc::new(RecordingStore::new("test"));

    let doc = patch(store.clone(), &Patch::new("fresh").set("a", 1), PatchOptions::default())
        .await
        .unwrap();

    assert!(doc.rev.as_deref().unwrap().starts_with("1-"));
    assert_eq!(store.stored("fresh").await.unwrap().get("a"), Some(&json!(1)));
}

#[tokio::test]
async fn test_patch_without_create_fails_on_missing_document() {
    let store = Arc::new(RecordingStore::new("test"));

    let err = patch(
        store.clone(),
        &Patch::new("fresh").set("a", 1),
        PatchOptions::default().create(false),
    )
    .await
    .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.calls(Op::Insert), 0);
    assert!(store.stored("fresh").await.is_none());
}

#[tokio::test]
async fn test_patch_rejects_revision_before_io() {
    let store = Arc::new(RecordingStore::new("test"));
    let mut with_rev = Patch::new("mydoc").set("a", 1);
    with_rev.rev = Some("1-abc".to_string());

    let err = patch(store.clone(), &with_rev, PatchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, ForceError::PatchHasRevision("mydoc".to_string()));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_patch_does_not_mutate_inputs() {
    let store = Arc::new(RecordingStore::new("test"));
    let base = store.seed(Document::new("mydoc").set("foo", "bar")).await;

    let change = Patch::new("mydoc").set("foo", "baz");
    let before = (change.clone(), base.clone());
    patch(store, &change, PatchOptions::default().doc(base.clone()))
        .await
        .unwrap();

    assert_eq!((change, base), before);
}

#[tokio::test]
async fn test_patch_cached_base_skips_fetch() {
    let store = Arc::new(RecordingStore::new("test"));
    let base = store.seed(Document::new("mydoc").set("foo", "bar")).await;

    patch(
        store.clone(),
        &Patch::new("mydoc").set("n", 1),
        PatchOptions::default().doc(base),
    )
    .await
    .unwrap();

    assert_eq!(store.calls(Op::Get), 0);
    assert_eq!(store.calls(Op::Insert), 1);
}

#[tokio::test]
async fn test_patch_stale_cached_base_converges() {
    let store = Arc::new(RecordingStore::new("test"));
    let stale = store.seed(Document::new("mydoc").set("foo", "bar")).await;
    store.seed(Document::new("mydoc").set("foo", "newer")).await;

    let doc = patch(
        store.clone(),
        &Patch::new("mydoc").set("n", 1),
        PatchOptions::default().doc(stale).retries(retries(3)),
    )
    .await
    .unwrap();

    assert_eq!(doc.get("foo"), Some(&json!("newer")));
    assert_eq!(doc.get("n"), Some(&json!(1)));
    assert_eq!(store.calls(Op::Get), 1);
    assert_eq!(store.calls(Op::Insert), 2);
}

#[tokio::test]
async fn test_patch_keeps_concurrent_changes() {
    let store = Arc::new(RecordingStore::new("test"));
    store.seed(Document::new("mydoc")).await;
    store.interfere(2);

    let doc = patch(
        store.clone(),
        &Patch::new("mydoc").set("mine", true),
        PatchOptions::default().retries(retries(5)),
    )
    .await
    .unwrap();

    assert_eq!(doc.get("mine"), Some(&json!(true)));
    assert_eq!(doc.get("concurrent"), Some(&json!(true)));
    assert_eq!(store.calls(Op::Insert), 3);
    assert_eq!(store.calls(Op::Get), 3);
}

#[tokio::test]
async fn test_patch_conflict_budget_exhausted() {
    let store = Arc::new(RecordingStore::new("test"));
    store.seed(Document::new("mydoc")).await;
    store.interfere(10);

    let err = patch(
        store.clone(),
        &Patch::new("mydoc").set("mine", true),
        PatchOptions::default().retries(retries(1)),
    )
    .await
    .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(store.calls(Op::Insert), 2);
}

#[tokio::test]
async fn test_patch_custom_patcher() {
    let store = Arc::new(RecordingStore::new("test"));
    store.seed(Document::new("counter").set("hits", 41)).await;

    let increment = |base: &Document, _patch: &Patch| {
        let hits = base.get("hits").and_then(|hits| hits.as_i64()).unwrap_or(0);
        base.clone().set("hits", hits + 1)
    };

    let doc = patch(
        store.clone(),
        &Patch::new("counter"),
        PatchOptions::default().patcher(increment),
    )
    .await
    .unwrap();

    assert_eq!(doc.get("hits"), Some(&json!(42)));
}

#[tokio::test]
async fn test_patch_propagates_fetch_errors() {
    let store = Arc::new(RecordingStore::new("test"));
    store.fail_next(Op::Get, forbidden("no access"));

    let err = patch(store.clone(), &Patch::new("mydoc"), PatchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(&ErrorKind::Forbidden));
    assert_eq!(store.calls(Op::Insert), 0);
}

#[tokio::test]
async fn test_patch_without_database() {
    let store = Arc::new(MemoryStore::unbound());

    let err = patch(store, &Patch::new("mydoc"), PatchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, ForceError::NoDatabase);
}
