//! Storage abstraction for the remote file store.
//!
//! The [`FileStorage`] trait covers everything the builder, the index store
//! and the staleness checker need from the user's cloud drive: paged
//! listing of source documents, full-file download, and find / read /
//! create / update of a single named blob.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              FileStorage                 │
//! │  ┌──────────────┐   ┌─────────────────┐  │
//! │  │ DriveClient  │   │ InMemoryStorage │  │
//! │  │ (Drive v3)   │   │ (tests)         │  │
//! │  └──────────────┘   └─────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   build_index() / IndexStore / check_status()
//! ```
//!
//! Implementations must be `Send + Sync` so a build can run on a spawned
//! tokio task.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FileListing, SourceDocument};

/// Parameters of one listing request.
///
/// Listings are always restricted to the supported content types and
/// exclude trashed files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Case-insensitive file name filter.
    pub name_contains: Option<String>,
    /// Opaque continuation token from a previous page.
    pub page_token: Option<String>,
    pub page_size: u32,
    /// Storage-specific ordering (e.g. `"createdTime desc"`).
    pub order_by: Option<String>,
}

impl ListQuery {
    pub fn all(page_size: u32) -> Self {
        Self {
            page_size,
            order_by: Some("name".to_string()),
            ..Self::default()
        }
    }
}

/// Handle to a named blob in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub id: String,
    pub name: String,
    /// Free-form description attribute stored with the blob.
    pub description: Option<String>,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Fetch one page of supported, non-trashed source documents.
    async fn list_files(&self, query: &ListQuery) -> Result<FileListing>;

    /// Download the full content of a file.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Locate a blob by its exact name.
    async fn find_blob(&self, name: &str) -> Result<Option<BlobRef>>;

    /// Read a blob's content.
    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>>;

    /// Create a new blob.
    async fn create_blob(
        &self,
        name: &str,
        content: &[u8],
        description: Option<&str>,
    ) -> Result<BlobRef>;

    /// Replace a blob's content and/or description in place.
    ///
    /// `None` leaves the corresponding part untouched.
    async fn update_blob(
        &self,
        blob_id: &str,
        content: Option<&[u8]>,
        description: Option<&str>,
    ) -> Result<()>;

    /// Enumerate every source document across all listing pages.
    async fn list_all_documents(&self, page_size: u32) -> Result<Vec<SourceDocument>> {
        let mut query = ListQuery::all(page_size);
        let mut documents = Vec::new();
        loop {
            let page = self.list_files(&query).await?;
            documents.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => query.page_token = Some(token),
                _ => break,
            }
        }
        Ok(documents)
    }
}
