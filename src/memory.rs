//! In-memory [`FileStorage`] implementation for tests and offline runs.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Listing pages are addressed by a
//! decimal offset token. Downloads and listings can be made to fail or
//! stall so the builder's failure isolation can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LibraryError, Result};
use crate::models::{ContentKind, FileListing, SourceDocument};
use crate::traits::{BlobRef, FileStorage, ListQuery};

struct StoredFile {
    doc: SourceDocument,
    bytes: Vec<u8>,
    trashed: bool,
}

struct StoredBlob {
    blob: BlobRef,
    bytes: Vec<u8>,
}

/// Transient failures injected into downloads: `remaining` attempts fail.
struct FlakyDownload {
    remaining: u32,
}

pub struct InMemoryStorage {
    files: RwLock<Vec<StoredFile>>,
    blobs: RwLock<Vec<StoredBlob>>,
    broken_downloads: RwLock<HashSet<String>>,
    flaky_downloads: RwLock<HashMap<String, FlakyDownload>>,
    slow_downloads: RwLock<HashMap<String, Duration>>,
    revoked_downloads: RwLock<HashSet<String>>,
    download_attempts: RwLock<HashMap<String, u32>>,
    listing_down: RwLock<bool>,
    writes_down: RwLock<bool>,
    next_blob_id: RwLock<u64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
            blobs: RwLock::new(Vec::new()),
            broken_downloads: RwLock::new(HashSet::new()),
            flaky_downloads: RwLock::new(HashMap::new()),
            slow_downloads: RwLock::new(HashMap::new()),
            revoked_downloads: RwLock::new(HashSet::new()),
            download_attempts: RwLock::new(HashMap::new()),
            listing_down: RwLock::new(false),
            writes_down: RwLock::new(false),
            next_blob_id: RwLock::new(1),
        }
    }

    /// Add a source document with the given MIME type and content.
    pub fn add_file(
        &self,
        id: &str,
        name: &str,
        mime_type: &str,
        modified_time: DateTime<Utc>,
        bytes: Vec<u8>,
    ) {
        let doc = SourceDocument {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            modified_time: Some(modified_time),
            created_time: Some(modified_time),
            size: Some(bytes.len().to_string()),
            web_view_link: None,
        };
        self.files.write().unwrap().push(StoredFile {
            doc,
            bytes,
            trashed: false,
        });
    }

    pub fn trash_file(&self, id: &str) {
        if let Some(f) = self.files.write().unwrap().iter_mut().find(|f| f.doc.id == id) {
            f.trashed = true;
        }
    }

    /// Every download of `id` fails.
    pub fn break_download(&self, id: &str) {
        self.broken_downloads.write().unwrap().insert(id.to_string());
    }

    /// The next `failures` downloads of `id` fail, later ones succeed.
    pub fn flaky_download(&self, id: &str, failures: u32) {
        self.flaky_downloads.write().unwrap().insert(
            id.to_string(),
            FlakyDownload {
                remaining: failures,
            },
        );
    }

    /// Every download of `id` takes `delay` before answering.
    pub fn slow_download(&self, id: &str, delay: Duration) {
        self.slow_downloads
            .write()
            .unwrap()
            .insert(id.to_string(), delay);
    }

    /// Downloads of `id` are refused as if the token had expired.
    pub fn revoke_download(&self, id: &str) {
        self.revoked_downloads.write().unwrap().insert(id.to_string());
    }

    pub fn download_attempts(&self, id: &str) -> u32 {
        self.download_attempts
            .read()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Simulate an unreachable listing endpoint.
    pub fn set_listing_down(&self, down: bool) {
        *self.listing_down.write().unwrap() = down;
    }

    /// Simulate an upstream that rejects blob writes.
    pub fn set_writes_down(&self, down: bool) {
        *self.writes_down.write().unwrap() = down;
    }

    /// Number of blobs with the given name (should never exceed one).
    pub fn blob_count(&self, name: &str) -> usize {
        self.blobs
            .read()
            .unwrap()
            .iter()
            .filter(|b| b.blob.name == name)
            .count()
    }

    fn check_writes(&self) -> Result<()> {
        if *self.writes_down.read().unwrap() {
            return Err(LibraryError::UpstreamUnavailable(
                "blob write rejected (HTTP 503)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn is_supported(mime: &str) -> bool {
    ContentKind::ALL.iter().any(|k| k.mime_type() == mime)
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn list_files(&self, query: &ListQuery) -> Result<FileListing> {
        if *self.listing_down.read().unwrap() {
            return Err(LibraryError::UpstreamUnavailable(
                "listing failed (HTTP 503)".to_string(),
            ));
        }
        let files = self.files.read().unwrap();
        let needle = query.name_contains.as_ref().map(|n| n.to_lowercase());
        let mut matching: Vec<SourceDocument> = files
            .iter()
            .filter(|f| !f.trashed && is_supported(&f.doc.mime_type))
            .filter(|f| match &needle {
                Some(n) => f.doc.name.to_lowercase().contains(n),
                None => true,
            })
            .map(|f| f.doc.clone())
            .collect();
        match query.order_by.as_deref() {
            Some("name") => matching.sort_by(|a, b| a.name.cmp(&b.name)),
            Some("createdTime desc") => matching.sort_by(|a, b| b.created_time.cmp(&a.created_time)),
            _ => {}
        }

        let offset = query
            .page_token
            .as_deref()
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(0);
        let size = query.page_size.max(1) as usize;
        let end = (offset + size).min(matching.len());
        let page = matching.get(offset..end).unwrap_or(&[]).to_vec();
        let next_page_token = if end < matching.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(FileListing {
            files: page,
            next_page_token,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        *self
            .download_attempts
            .write()
            .unwrap()
            .entry(file_id.to_string())
            .or_insert(0) += 1;

        let delay = self.slow_downloads.read().unwrap().get(file_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.revoked_downloads.read().unwrap().contains(file_id) {
            return Err(LibraryError::Unauthorized(format!(
                "download of {} rejected (HTTP 401)",
                file_id
            )));
        }
        if self.broken_downloads.read().unwrap().contains(file_id) {
            return Err(LibraryError::UpstreamUnavailable(format!(
                "download of {} failed (HTTP 500)",
                file_id
            )));
        }
        if let Some(flaky) = self.flaky_downloads.write().unwrap().get_mut(file_id) {
            if flaky.remaining > 0 {
                flaky.remaining -= 1;
                return Err(LibraryError::UpstreamUnavailable(format!(
                    "download of {} timed out",
                    file_id
                )));
            }
        }
        self.files
            .read()
            .unwrap()
            .iter()
            .find(|f| f.doc.id == file_id)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| {
                LibraryError::UpstreamUnavailable(format!("file not found: {}", file_id))
            })
    }

    async fn find_blob(&self, name: &str) -> Result<Option<BlobRef>> {
        Ok(self
            .blobs
            .read()
            .unwrap()
            .iter()
            .find(|b| b.blob.name == name)
            .map(|b| b.blob.clone()))
    }

    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .unwrap()
            .iter()
            .find(|b| b.blob.id == blob_id)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| LibraryError::UpstreamUnavailable(format!("blob not found: {}", blob_id)))
    }

    async fn create_blob(
        &self,
        name: &str,
        content: &[u8],
        description: Option<&str>,
    ) -> Result<BlobRef> {
        self.check_writes()?;
        let id = {
            let mut next = self.next_blob_id.write().unwrap();
            let id = format!("blob-{}", *next);
            *next += 1;
            id
        };
        let blob = BlobRef {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.blobs.write().unwrap().push(StoredBlob {
            blob: blob.clone(),
            bytes: content.to_vec(),
        });
        Ok(blob)
    }

    async fn update_blob(
        &self,
        blob_id: &str,
        content: Option<&[u8]>,
        description: Option<&str>,
    ) -> Result<()> {
        self.check_writes()?;
        let mut blobs = self.blobs.write().unwrap();
        let stored = blobs
            .iter_mut()
            .find(|b| b.blob.id == blob_id)
            .ok_or_else(|| LibraryError::UpstreamUnavailable(format!("blob not found: {}", blob_id)))?;
        if let Some(bytes) = content {
            stored.bytes = bytes.to_vec();
        }
        if let Some(desc) = description {
            stored.blob.description = Some(desc.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MIME_DOCX, MIME_PDF};

    #[tokio::test]
    async fn listing_pages_until_exhausted() {
        let storage = InMemoryStorage::new();
        for i in 0..25 {
            storage.add_file(
                &format!("f{:02}", i),
                &format!("doc{:02}.pdf", i),
                MIME_PDF,
                Utc::now(),
                vec![],
            );
        }
        let first = storage.list_files(&ListQuery::all(10)).await.unwrap();
        assert_eq!(first.files.len(), 10);
        assert_eq!(first.next_page_token.as_deref(), Some("10"));

        let all = storage.list_all_documents(10).await.unwrap();
        assert_eq!(all.len(), 25);
    }

    #[tokio::test]
    async fn listing_skips_trashed_and_unsupported() {
        let storage = InMemoryStorage::new();
        storage.add_file("a", "a.pdf", MIME_PDF, Utc::now(), vec![]);
        storage.add_file("b", "b.docx", MIME_DOCX, Utc::now(), vec![]);
        storage.add_file("c", "c.txt", "text/plain", Utc::now(), vec![]);
        storage.trash_file("b");
        let all = storage.list_all_documents(100).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn update_blob_keeps_single_copy() {
        let storage = InMemoryStorage::new();
        let blob = storage.create_blob("idx.json", b"{}", None).await.unwrap();
        storage
            .update_blob(&blob.id, Some(b"{\"a\":1}"), Some("desc"))
            .await
            .unwrap();
        assert_eq!(storage.blob_count("idx.json"), 1);
        let found = storage.find_blob("idx.json").await.unwrap().unwrap();
        assert_eq!(found.description.as_deref(), Some("desc"));
        assert_eq!(storage.read_blob(&found.id).await.unwrap(), b"{\"a\":1}");
    }
}
