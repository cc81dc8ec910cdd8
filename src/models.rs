//! Core data models used throughout the library.
//!
//! These types represent the source documents listed from remote storage,
//! the extracted per-page text, the persisted search index, and the
//! results produced by the query engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LibraryError;

/// MIME type of PDF documents.
pub const MIME_PDF: &str = "application/pdf";
/// MIME type of Word (OOXML) documents.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// MIME type of PowerPoint (OOXML) slide decks.
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// The closed set of formats the extractor handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Pdf,
    Docx,
    Pptx,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Pdf, ContentKind::Docx, ContentKind::Pptx];

    pub fn from_mime(mime: &str) -> Result<Self, LibraryError> {
        match mime {
            MIME_PDF => Ok(ContentKind::Pdf),
            MIME_DOCX => Ok(ContentKind::Docx),
            MIME_PPTX => Ok(ContentKind::Pptx),
            other => Err(LibraryError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentKind::Pdf => MIME_PDF,
            ContentKind::Docx => MIME_DOCX,
            ContentKind::Pptx => MIME_PPTX,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Docx => "docx",
            ContentKind::Pptx => "pptx",
        };
        f.write_str(label)
    }
}

/// A file in the user's remote storage. Never modified by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    /// Byte size as reported by the storage API (a decimal string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl SourceDocument {
    pub fn kind(&self) -> Result<ContentKind, LibraryError> {
        ContentKind::from_mime(&self.mime_type)
    }
}

/// Text of one page. Non-paginated formats always produce a single page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub page_number: u32,
    pub content: String,
}

impl ExtractedPage {
    pub fn new(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
        }
    }
}

/// Indexed text of one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub pages: Vec<ExtractedPage>,
}

/// The persisted search index: document id → [`IndexEntry`].
///
/// Iteration order is insertion order (the order of the build that produced
/// it) and survives a JSON round trip. Keys are unique; inserting an
/// existing id replaces its entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchIndex {
    entries: Vec<(String, IndexEntry)>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry with the same id.
    ///
    /// Entries without pages are rejected and `false` is returned, so a
    /// stored index never holds an empty `pages` list.
    pub fn insert(&mut self, id: impl Into<String>, entry: IndexEntry) -> bool {
        if entry.pages.is_empty() {
            return false;
        }
        let id = id.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((id, entry)),
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, e)| e)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Serialize for SearchIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, entry) in &self.entries {
            map.serialize_entry(id, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SearchIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = SearchIndex;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of document id to index entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SearchIndex, A::Error> {
                let mut index = SearchIndex::new();
                while let Some((id, entry)) = access.next_entry::<String, IndexEntry>()? {
                    // Blobs written by older builds may carry empty entries; drop them.
                    index.insert(id, entry);
                }
                Ok(index)
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}

/// Build metadata persisted alongside the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub last_build_time: DateTime<Utc>,
}

/// One matching page of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub page_number: u32,
    pub snippet: String,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total_pages: usize,
    pub total_results: usize,
    pub page: usize,
}

/// One page of a remote file listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    #[serde(default)]
    pub files: Vec<SourceDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
