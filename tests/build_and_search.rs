//! End-to-end tests of build → store → search → freshness against the
//! in-memory storage backend.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use docshelf::builder::{build_index, BuildOptions};
use docshelf::config::SearchConfig;
use docshelf::error::LibraryError;
use docshelf::memory::InMemoryStorage;
use docshelf::models::{MIME_DOCX, MIME_PDF, MIME_PPTX};
use docshelf::progress::NoProgress;
use docshelf::search::search_documents;
use docshelf::staleness::{check_status, IndexStatus};
use docshelf::store::IndexStore;

use common::{docx_with_paragraphs, pdf_with_pages, pptx_with_slides};

fn setup() -> (Arc<InMemoryStorage>, IndexStore) {
    let storage = Arc::new(InMemoryStorage::new());
    let store = IndexStore::new(storage.clone(), "search_index.json");
    (storage, store)
}

async fn build(storage: &Arc<InMemoryStorage>, store: &IndexStore) -> docshelf::builder::BuildOutcome {
    build_index(storage.clone(), store, &BuildOptions::default(), &NoProgress)
        .await
        .unwrap()
}

#[tokio::test]
async fn two_document_scenario() {
    let (storage, store) = setup();
    let now = Utc::now();
    storage.add_file("a", "A.docx", MIME_DOCX, now, docx_with_paragraphs(&["alpha beta"]));
    storage.add_file("b", "B.pptx", MIME_PPTX, now, pptx_with_slides(&["beta gamma"]));
    let outcome = build(&storage, &store).await;
    assert_eq!(outcome.indexed, 2);

    let opts = SearchConfig::default();
    let beta = search_documents(&store, "beta", 1, &opts).await.unwrap();
    let ids: Vec<&str> = beta.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(beta.results.iter().all(|r| r.page_number == 1));

    let alpha = search_documents(&store, "alpha", 1, &opts).await.unwrap();
    assert_eq!(alpha.total_results, 1);
    assert_eq!(alpha.results[0].name, "A.docx");

    let none = search_documents(&store, "zzz", 1, &opts).await.unwrap();
    assert!(none.results.is_empty());
    assert_eq!(none.total_pages, 0);
}

#[tokio::test]
async fn pdf_pages_are_searched_individually() {
    let (storage, store) = setup();
    storage.add_file(
        "report",
        "Report.pdf",
        MIME_PDF,
        Utc::now(),
        pdf_with_pages(&["Introduction", "Budget table", "Appendix", "Notes", "Final budget"]),
    );
    build(&storage, &store).await;

    let index = store.load().await.unwrap();
    let entry = index.get("report").unwrap();
    assert_eq!(entry.pages.len(), 5);
    let numbers: Vec<u32> = entry.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let out = search_documents(&store, "BUDGET", 1, &SearchConfig::default())
        .await
        .unwrap();
    let pages: Vec<u32> = out.results.iter().map(|r| r.page_number).collect();
    assert_eq!(pages, vec![2, 5]);
    assert!(out.results[0].snippet.to_lowercase().contains("budget"));
}

#[tokio::test]
async fn unreadable_and_empty_documents_are_omitted() {
    let (storage, store) = setup();
    let now = Utc::now();
    storage.add_file("good", "good.docx", MIME_DOCX, now, docx_with_paragraphs(&["content"]));
    storage.add_file("blank", "blank.pdf", MIME_PDF, now, pdf_with_pages(&["", ""]));
    storage.add_file("corrupt", "corrupt.pptx", MIME_PPTX, now, b"PK\x03\x04 truncated".to_vec());
    storage.add_file("garbage", "garbage.pdf", MIME_PDF, now, b"%PDF-1.4 nonsense".to_vec());

    let outcome = build(&storage, &store).await;
    assert_eq!(outcome.scanned, 4);
    assert_eq!(outcome.indexed, 1);

    let index = store.load().await.unwrap();
    assert!(index.contains("good"));
    for (_, entry) in index.iter() {
        assert!(!entry.pages.is_empty());
    }
}

#[tokio::test]
async fn rebuild_produces_identical_index() {
    let (storage, store) = setup();
    let now = Utc::now();
    storage.add_file("p", "p.pdf", MIME_PDF, now, pdf_with_pages(&["one", "two"]));
    storage.add_file("d", "d.docx", MIME_DOCX, now, docx_with_paragraphs(&["first", "second"]));
    storage.add_file("s", "s.pptx", MIME_PPTX, now, pptx_with_slides(&["x", "y"]));

    let first = build(&storage, &store).await;
    let blob_after_first = store.load().await.unwrap();
    let second = build(&storage, &store).await;
    assert_eq!(first.digest, second.digest);
    assert_eq!(store.load().await.unwrap(), blob_after_first);
    assert_eq!(storage.blob_count("search_index.json"), 1);
}

#[tokio::test]
async fn search_before_any_build_is_index_not_found() {
    let (_, store) = setup();
    let err = search_documents(&store, "anything", 1, &SearchConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::IndexNotFound));
}

#[tokio::test]
async fn staleness_follows_document_changes() {
    let (storage, store) = setup();
    let info = check_status(storage.as_ref(), &store, 100).await.unwrap();
    assert_eq!(info.status, IndexStatus::None);

    let earlier = Utc::now() - Duration::days(3);
    storage.add_file("a", "a.docx", MIME_DOCX, earlier, docx_with_paragraphs(&["a"]));
    build(&storage, &store).await;
    let info = check_status(storage.as_ref(), &store, 100).await.unwrap();
    assert_eq!(info.status, IndexStatus::Uptodate);

    let later = Utc::now() + Duration::hours(1);
    storage.add_file("b", "b.docx", MIME_DOCX, later, docx_with_paragraphs(&["b"]));
    let info = check_status(storage.as_ref(), &store, 100).await.unwrap();
    assert_eq!(info.status, IndexStatus::Outdated);
}

#[tokio::test]
async fn trashed_documents_drop_out_on_rebuild() {
    let (storage, store) = setup();
    let now = Utc::now();
    storage.add_file("keep", "keep.docx", MIME_DOCX, now, docx_with_paragraphs(&["shared"]));
    storage.add_file("drop", "drop.docx", MIME_DOCX, now, docx_with_paragraphs(&["shared"]));
    build(&storage, &store).await;
    assert_eq!(store.load().await.unwrap().len(), 2);

    storage.trash_file("drop");
    build(&storage, &store).await;
    let out = search_documents(&store, "shared", 1, &SearchConfig::default())
        .await
        .unwrap();
    let ids: Vec<&str> = out.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["keep"]);
}
