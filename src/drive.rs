//! Google Drive v3 storage client.
//!
//! Lists and downloads the user's documents through the Drive REST API and
//! reads / writes the index blob. Every request carries the caller's OAuth
//! bearer token; the client never refreshes it. An expired or rejected
//! token surfaces as [`LibraryError::Unauthorized`], any other failure as
//! [`LibraryError::UpstreamUnavailable`].
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! api_base = "https://www.googleapis.com/drive/v3"
//! upload_base = "https://www.googleapis.com/upload/drive/v3"
//! index_file_name = "search_index.json"
//! list_page_size = 100
//! ```
//!
//! # Listing
//!
//! Listings are filtered server-side to the three supported MIME types and
//! exclude trashed files. Large drives are handled by following
//! `nextPageToken` (see [`FileStorage::list_all_documents`]).
//!
//! # Blob writes
//!
//! The index blob is created and updated with `uploadType=multipart`
//! requests: a JSON metadata part (name, description) followed by the
//! content part.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::StorageConfig;
use crate::error::{LibraryError, Result};
use crate::models::{ContentKind, FileListing};
use crate::traits::{BlobRef, FileStorage, ListQuery};

/// Fields requested for every listed file.
const FILE_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, modifiedTime, createdTime, size, webViewLink)";
const BLOB_FIELDS: &str = "files(id, name, description)";
const MULTIPART_BOUNDARY: &str = "docshelf_multipart_boundary";

/// Drive v3 client bound to one bearer token.
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    token: String,
}

impl DriveClient {
    pub fn new(config: &StorageConfig, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(LibraryError::Unauthorized("missing access token".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LibraryError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LibraryError::UpstreamUnavailable(format!("{}: {}", what, e)))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(map_status(status, &body, what))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let resp = self.send(request, what).await?;
        resp.json::<T>()
            .await
            .map_err(|e| LibraryError::UpstreamUnavailable(format!("{}: bad response: {}", what, e)))
    }

    async fn send_bytes(&self, request: RequestBuilder, what: &str) -> Result<Vec<u8>> {
        let resp = self.send(request, what).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| LibraryError::UpstreamUnavailable(format!("{}: {}", what, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Map a non-success Drive response to the error taxonomy.
fn map_status(status: StatusCode, body: &str, what: &str) -> LibraryError {
    let excerpt: String = body.chars().take(300).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LibraryError::Unauthorized(format!("{} (HTTP {}): {}", what, status, excerpt))
        }
        _ => LibraryError::UpstreamUnavailable(format!("{} (HTTP {}): {}", what, status, excerpt)),
    }
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive `q` expression for the index blob: our own JSON file only, never
/// a same-named file someone shared with the user.
fn blob_query(name: &str) -> String {
    format!(
        "name='{}' and mimeType='application/json' and 'me' in owners and trashed = false",
        escape_literal(name)
    )
}

/// Drive `q` expression for supported, non-trashed documents.
fn documents_query(name_contains: Option<&str>) -> String {
    let mimes = ContentKind::ALL
        .iter()
        .map(|k| format!("mimeType='{}'", k.mime_type()))
        .collect::<Vec<_>>()
        .join(" or ");
    let mut q = format!("({}) and trashed = false", mimes);
    if let Some(name) = name_contains.filter(|n| !n.trim().is_empty()) {
        q.push_str(&format!(" and name contains '{}'", escape_literal(name)));
    }
    q
}

/// Body of a `multipart/related` upload: JSON metadata, then content.
fn multipart_body(metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: application/json\r\n\r\n",
            b = MULTIPART_BOUNDARY,
            m = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--", MULTIPART_BOUNDARY).as_bytes());
    body
}

fn multipart_content_type() -> String {
    format!("multipart/related; boundary={}", MULTIPART_BOUNDARY)
}

#[derive(Deserialize)]
struct BlobList {
    #[serde(default)]
    files: Vec<BlobMeta>,
}

#[derive(Deserialize)]
struct BlobMeta {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<BlobMeta> for BlobRef {
    fn from(m: BlobMeta) -> Self {
        BlobRef {
            id: m.id,
            name: m.name,
            description: m.description,
        }
    }
}

#[async_trait]
impl FileStorage for DriveClient {
    async fn list_files(&self, query: &ListQuery) -> Result<FileListing> {
        let mut params = vec![
            ("q".to_string(), documents_query(query.name_contains.as_deref())),
            ("fields".to_string(), FILE_FIELDS.to_string()),
            ("pageSize".to_string(), query.page_size.to_string()),
        ];
        if let Some(order) = &query.order_by {
            params.push(("orderBy".to_string(), order.clone()));
        }
        if let Some(token) = &query.page_token {
            params.push(("pageToken".to_string(), token.clone()));
        }
        let request = self
            .http
            .get(format!("{}/files", self.api_base))
            .query(&params);
        self.send_json(request, "list files").await
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .query(&[("alt", "media")]);
        self.send_bytes(request, &format!("download {}", file_id))
            .await
    }

    async fn find_blob(&self, name: &str) -> Result<Option<BlobRef>> {
        let q = blob_query(name);
        // Oldest first, so the blob updated in place keeps winning.
        let request = self.http.get(format!("{}/files", self.api_base)).query(&[
            ("q", q.as_str()),
            ("orderBy", "createdTime"),
            ("fields", BLOB_FIELDS),
        ]);
        let list: BlobList = self.send_json(request, "find index blob").await?;
        Ok(list.files.into_iter().next().map(BlobRef::from))
    }

    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>> {
        self.download(blob_id).await
    }

    async fn create_blob(
        &self,
        name: &str,
        content: &[u8],
        description: Option<&str>,
    ) -> Result<BlobRef> {
        let mut metadata = serde_json::json!({ "name": name, "mimeType": "application/json" });
        if let Some(desc) = description {
            metadata["description"] = serde_json::Value::from(desc);
        }
        let request = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", "id, name, description")])
            .header(reqwest::header::CONTENT_TYPE, multipart_content_type())
            .body(multipart_body(&metadata, content));
        let meta: BlobMeta = self.send_json(request, "create index blob").await?;
        Ok(meta.into())
    }

    async fn update_blob(
        &self,
        blob_id: &str,
        content: Option<&[u8]>,
        description: Option<&str>,
    ) -> Result<()> {
        let mut metadata = serde_json::json!({});
        if let Some(desc) = description {
            metadata["description"] = serde_json::Value::from(desc);
        }
        let request = match content {
            Some(bytes) => self
                .http
                .patch(format!("{}/files/{}", self.upload_base, blob_id))
                .query(&[("uploadType", "multipart")])
                .header(reqwest::header::CONTENT_TYPE, multipart_content_type())
                .body(multipart_body(&metadata, bytes)),
            None => self
                .http
                .patch(format!("{}/files/{}", self.api_base, blob_id))
                .json(&metadata),
        };
        self.send(request, "update index blob").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_query_filters_types_and_trash() {
        let q = documents_query(None);
        assert!(q.starts_with("(mimeType='application/pdf' or "));
        assert!(q.contains("presentationml.presentation'"));
        assert!(q.ends_with("and trashed = false"));
    }

    #[test]
    fn documents_query_escapes_name_filter() {
        let q = documents_query(Some("O'Brien"));
        assert!(q.ends_with(" and name contains 'O\\'Brien'"));
        assert_eq!(documents_query(Some("   ")), documents_query(None));
    }

    #[test]
    fn blob_query_is_limited_to_own_json_files() {
        let q = blob_query("search_index.json");
        assert!(q.starts_with("name='search_index.json' and "));
        assert!(q.contains("mimeType='application/json'"));
        assert!(q.contains("'me' in owners"));
        assert!(q.ends_with("trashed = false"));
    }

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "expired", "list files"),
            LibraryError::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "", "list files"),
            LibraryError::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, "", "list files"),
            LibraryError::UpstreamUnavailable(_)
        ));
    }

    #[test]
    fn multipart_body_layout() {
        let body = multipart_body(&serde_json::json!({"name": "x"}), b"{\"k\":1}");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--docshelf_multipart_boundary\r\n"));
        assert!(text.contains("{\"name\":\"x\"}"));
        assert!(text.contains("\r\n\r\n{\"k\":1}\r\n"));
        assert!(text.ends_with("--docshelf_multipart_boundary--"));
    }

    #[test]
    fn listing_response_parses() {
        let json = r#"{"nextPageToken":"tok","files":[
            {"id":"1","name":"a.pdf","mimeType":"application/pdf","modifiedTime":"2024-01-02T03:04:05.000Z"}]}"#;
        let listing: FileListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn empty_token_is_unauthorized() {
        let err = DriveClient::new(&StorageConfig::default(), "  ").err().unwrap();
        assert!(matches!(err, LibraryError::Unauthorized(_)));
    }
}
