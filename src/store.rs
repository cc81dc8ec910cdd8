//! Durable storage of the search index and its build metadata.
//!
//! Exactly one index blob lives in the user's drive, located by its
//! well-known name. The build metadata (`{"lastBuildTime": ...}`) is kept in
//! that blob's description attribute, so one write replaces both and every
//! server instance reads the same record. An existing blob is always
//! updated in place; a second generation is never created.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{LibraryError, Result};
use crate::models::{BuildMetadata, SearchIndex};
use crate::traits::{BlobRef, FileStorage};

pub struct IndexStore {
    storage: Arc<dyn FileStorage>,
    blob_name: String,
}

impl IndexStore {
    pub fn new(storage: Arc<dyn FileStorage>, blob_name: impl Into<String>) -> Self {
        Self {
            storage,
            blob_name: blob_name.into(),
        }
    }

    pub fn blob_name(&self) -> &str {
        &self.blob_name
    }

    async fn find(&self) -> Result<Option<BlobRef>> {
        self.storage.find_blob(&self.blob_name).await
    }

    /// Replace the index content, leaving the build metadata untouched.
    pub async fn save(&self, index: &SearchIndex) -> Result<()> {
        let bytes = index.to_json()?;
        self.write(&bytes, None).await
    }

    /// Replace the index content and the build time in a single write.
    pub async fn save_with_build_time(
        &self,
        index: &SearchIndex,
        built_at: DateTime<Utc>,
    ) -> Result<()> {
        let bytes = index.to_json()?;
        let meta = encode_metadata(built_at)?;
        self.write(&bytes, Some(&meta)).await
    }

    async fn write(&self, bytes: &[u8], description: Option<&str>) -> Result<()> {
        match self.find().await? {
            Some(blob) => {
                self.storage
                    .update_blob(&blob.id, Some(bytes), description)
                    .await
            }
            None => {
                self.storage
                    .create_blob(&self.blob_name, bytes, description)
                    .await?;
                Ok(())
            }
        }
    }

    /// Load the whole index. Fails with [`LibraryError::IndexNotFound`] if
    /// no build has ever completed.
    pub async fn load(&self) -> Result<SearchIndex> {
        let blob = self.find().await?.ok_or(LibraryError::IndexNotFound)?;
        let bytes = self.storage.read_blob(&blob.id).await?;
        Ok(SearchIndex::from_json(&bytes)?)
    }

    /// Record the build time on the existing index blob.
    pub async fn save_build_time(&self, built_at: DateTime<Utc>) -> Result<()> {
        let blob = self.find().await?.ok_or(LibraryError::IndexNotFound)?;
        let meta = encode_metadata(built_at)?;
        self.storage.update_blob(&blob.id, None, Some(&meta)).await
    }

    pub async fn load_build_time(&self) -> Result<DateTime<Utc>> {
        let blob = self.find().await?.ok_or(LibraryError::MetadataNotFound)?;
        let description = blob.description.ok_or(LibraryError::MetadataNotFound)?;
        decode_metadata(&description).ok_or_else(|| {
            tracing::warn!(blob = %blob.id, "index blob description is not build metadata");
            LibraryError::MetadataNotFound
        })
    }

    pub async fn load_metadata(&self) -> Result<BuildMetadata> {
        Ok(BuildMetadata {
            last_build_time: self.load_build_time().await?,
        })
    }
}

/// CLI entry point for `shelf metadata`.
pub async fn run_metadata(store: &IndexStore) -> anyhow::Result<()> {
    match store.load_metadata().await {
        Ok(meta) => {
            println!("lastBuildTime: {}", meta.last_build_time.to_rfc3339());
            Ok(())
        }
        Err(LibraryError::MetadataNotFound) => {
            println!("No build recorded yet. Run `shelf build` first.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn encode_metadata(built_at: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string(&BuildMetadata {
        last_build_time: built_at,
    })?)
}

/// Accepts the JSON record and the bare RFC 3339 timestamp older builds wrote.
fn decode_metadata(description: &str) -> Option<DateTime<Utc>> {
    if let Ok(meta) = serde_json::from_str::<BuildMetadata>(description) {
        return Some(meta.last_build_time);
    }
    DateTime::parse_from_rfc3339(description.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
