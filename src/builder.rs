//! Index build orchestration.
//!
//! Coordinates the full rebuild: list every supported document → download →
//! extract pages → assemble the index → write it (with the build time) as a
//! single blob. A build always replaces the previous index wholesale.
//!
//! Per-file failures (download errors, unsupported or unparseable content,
//! per-file timeouts) are logged and the file is left out; the build goes
//! on. Listing failures, auth failures and a failed final write abort the
//! build and leave the previous index untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::{LibraryError, Result};
use crate::extract::extract_for_mime;
use crate::models::{IndexEntry, SearchIndex, SourceDocument};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::store::IndexStore;
use crate::traits::FileStorage;

/// Tunables of one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub list_page_size: u32,
    pub file_timeout: Duration,
    pub max_attempts: u32,
    pub concurrency: usize,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            list_page_size: config.storage.list_page_size,
            file_timeout: Duration::from_secs(config.build.file_timeout_secs),
            max_attempts: config.build.max_attempts.clamp(1, 3),
            concurrency: config.build.concurrency.max(1),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
    /// Documents present in the written index.
    pub indexed: usize,
    /// Documents returned by the listing.
    pub scanned: usize,
    /// Documents left out (no text, or a per-file failure).
    pub skipped: usize,
    /// SHA-256 of the serialized index.
    pub digest: String,
    pub built_at: DateTime<Utc>,
}

/// Rebuild the index from every supported document in `storage`.
pub async fn build_index(
    storage: Arc<dyn FileStorage>,
    store: &IndexStore,
    opts: &BuildOptions,
    reporter: &dyn BuildProgressReporter,
) -> Result<BuildOutcome> {
    tracing::info!(blob = store.blob_name(), "index build started");
    let result = run_build(storage, store, opts, reporter).await;
    match &result {
        Ok(outcome) => {
            tracing::info!(
                indexed = outcome.indexed,
                scanned = outcome.scanned,
                skipped = outcome.skipped,
                digest = %outcome.digest,
                "index build complete"
            );
            reporter.report(BuildProgressEvent::Complete {
                indexed: outcome.indexed as u64,
                scanned: outcome.scanned as u64,
            });
        }
        Err(e) => {
            tracing::error!(error = %e, "index build failed");
            reporter.report(BuildProgressEvent::Failed {
                message: e.to_string(),
            });
        }
    }
    result
}

async fn run_build(
    storage: Arc<dyn FileStorage>,
    store: &IndexStore,
    opts: &BuildOptions,
    reporter: &dyn BuildProgressReporter,
) -> Result<BuildOutcome> {
    reporter.report(BuildProgressEvent::Listing);
    let documents = storage.list_all_documents(opts.list_page_size).await?;
    let total = documents.len();
    tracing::info!(files = total, "documents to index");

    let mut slots: Vec<Option<IndexEntry>> = vec![None; total];
    let permits = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (position, doc) in documents.iter().cloned().enumerate() {
        let storage = storage.clone();
        let permits = permits.clone();
        let opts = opts.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = process_with_timeout(storage.as_ref(), &doc, &opts).await;
            (position, doc, result)
        });
    }

    let mut done = 0u64;
    while let Some(joined) = tasks.join_next().await {
        let (position, doc, result) = match joined {
            Ok(v) => v,
            Err(e) => {
                // A panicking task only loses its own file.
                tracing::warn!(error = %e, "file task aborted");
                done += 1;
                continue;
            }
        };
        done += 1;
        let message = match result {
            Ok(Some(entry)) => {
                let msg = format!("{}: {} page(s)", doc.name, entry.pages.len());
                slots[position] = Some(entry);
                msg
            }
            Ok(None) => {
                tracing::info!(file = %doc.name, "no extractable text; skipped");
                format!("{}: no text, skipped", doc.name)
            }
            Err(LibraryError::Unauthorized(reason)) => {
                tasks.abort_all();
                return Err(LibraryError::Unauthorized(reason));
            }
            Err(e) => {
                if e.is_file_level() {
                    tracing::warn!(file = %doc.name, id = %doc.id, error = %e, "skipping unreadable file");
                } else {
                    tracing::warn!(file = %doc.name, id = %doc.id, error = %e, "skipping file after download failure");
                }
                format!("{}: skipped ({})", doc.name, e)
            }
        };
        reporter.report(BuildProgressEvent::Processing {
            current: done,
            total: total as u64,
            file: doc.name.clone(),
            message,
        });
    }

    // Listing order, regardless of completion order.
    let mut index = SearchIndex::new();
    for (doc, slot) in documents.iter().zip(slots) {
        if let Some(entry) = slot {
            index.insert(doc.id.clone(), entry);
        }
    }

    let serialized = index.to_json()?;
    let digest = hex::encode(Sha256::digest(&serialized));
    let built_at = Utc::now();
    store.save_with_build_time(&index, built_at).await?;

    Ok(BuildOutcome {
        indexed: index.len(),
        scanned: total,
        skipped: total - index.len(),
        digest,
        built_at,
    })
}

async fn process_with_timeout(
    storage: &dyn FileStorage,
    doc: &SourceDocument,
    opts: &BuildOptions,
) -> Result<Option<IndexEntry>> {
    match tokio::time::timeout(opts.file_timeout, process_file(storage, doc, opts)).await {
        Ok(result) => result,
        Err(_) => Err(LibraryError::ExtractionFailure {
            file: doc.name.clone(),
            reason: format!("timed out after {:?}", opts.file_timeout),
        }),
    }
}

/// Download and extract one document. `Ok(None)` means no pages.
async fn process_file(
    storage: &dyn FileStorage,
    doc: &SourceDocument,
    opts: &BuildOptions,
) -> Result<Option<IndexEntry>> {
    let bytes = download_with_retry(storage, &doc.id, opts.max_attempts).await?;

    let mime_type = doc.mime_type.clone();
    let pages = tokio::task::spawn_blocking(move || extract_for_mime(&bytes, &mime_type))
        .await
        .map_err(|e| LibraryError::ExtractionFailure {
            file: doc.name.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| LibraryError::ExtractionFailure {
            file: doc.name.clone(),
            reason: e.to_string(),
        })?;

    if pages.is_empty() {
        return Ok(None);
    }
    Ok(Some(IndexEntry {
        name: doc.name.clone(),
        pages,
    }))
}

/// Bounded retry of a single download; auth failures are never retried.
async fn download_with_retry(
    storage: &dyn FileStorage,
    file_id: &str,
    max_attempts: u32,
) -> Result<Vec<u8>> {
    let mut attempt = 1;
    loop {
        match storage.download(file_id).await {
            Ok(bytes) => return Ok(bytes),
            Err(LibraryError::UpstreamUnavailable(reason)) if attempt < max_attempts => {
                tracing::debug!(file_id, attempt, %reason, "download failed; retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// CLI entry point for `shelf build`.
pub async fn run_build_cli(
    config: &Config,
    storage: Arc<dyn FileStorage>,
    reporter: &dyn BuildProgressReporter,
) -> anyhow::Result<()> {
    let store = IndexStore::new(storage.clone(), config.storage.index_file_name.clone());
    let opts = BuildOptions::from_config(config);
    let outcome = build_index(storage, &store, &opts, reporter).await?;

    println!("build");
    println!("  scanned: {} files", outcome.scanned);
    println!("  indexed: {}", outcome.indexed);
    println!("  skipped: {}", outcome.skipped);
    println!("  digest: {}", outcome.digest);
    println!("  built at: {}", outcome.built_at.to_rfc3339());
    println!("ok");
    Ok(())
}
