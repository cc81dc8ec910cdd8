//! Advisory freshness check of the index.
//!
//! Compares the newest `modified_time` among the current source documents
//! with the last recorded build time. The answer is advisory only: nothing
//! is rebuilt automatically.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::{LibraryError, Result};
use crate::models::SourceDocument;
use crate::store::IndexStore;
use crate::traits::FileStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// Client-side placeholder while a check is in flight; never produced here.
    Checking,
    Uptodate,
    Outdated,
    /// No build has been recorded.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatusInfo {
    pub status: IndexStatus,
    pub message: String,
}

/// Newest modification time across `files`, ignoring files without one.
pub fn newest_modification(files: &[SourceDocument]) -> Option<DateTime<Utc>> {
    files.iter().filter_map(|f| f.modified_time).max()
}

pub fn classify(files: &[SourceDocument], last_build: Option<DateTime<Utc>>) -> IndexStatusInfo {
    let Some(built) = last_build else {
        return IndexStatusInfo {
            status: IndexStatus::None,
            message: "No index has been built yet".to_string(),
        };
    };
    match newest_modification(files) {
        Some(newest) if newest > built => IndexStatusInfo {
            status: IndexStatus::Outdated,
            message: format!(
                "Documents changed since the last build ({}); rebuild the index",
                built.to_rfc3339()
            ),
        },
        _ => IndexStatusInfo {
            status: IndexStatus::Uptodate,
            message: format!("Index is up to date (built {})", built.to_rfc3339()),
        },
    }
}

/// List the current documents and compare against the recorded build time.
pub async fn check_status(
    storage: &dyn FileStorage,
    store: &IndexStore,
    page_size: u32,
) -> Result<IndexStatusInfo> {
    let last_build = match store.load_build_time().await {
        Ok(t) => Some(t),
        Err(LibraryError::MetadataNotFound) => None,
        Err(e) => return Err(e),
    };
    let files = storage.list_all_documents(page_size).await?;
    let info = classify(&files, last_build);
    tracing::debug!(files = files.len(), status = ?info.status, "freshness checked");
    Ok(info)
}

/// CLI entry point for `shelf status`.
pub async fn run_status(
    config: &Config,
    storage: &dyn FileStorage,
    store: &IndexStore,
) -> anyhow::Result<()> {
    let info = check_status(storage, store, config.storage.list_page_size).await?;
    let label = match info.status {
        IndexStatus::Checking => "checking",
        IndexStatus::Uptodate => "up to date",
        IndexStatus::Outdated => "outdated",
        IndexStatus::None => "none",
    };
    println!("index: {}", label);
    println!("  {}", info.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, modified: Option<DateTime<Utc>>) -> SourceDocument {
        SourceDocument {
            id: id.into(),
            name: format!("{}.pdf", id),
            mime_type: crate::models::MIME_PDF.into(),
            modified_time: modified,
            created_time: None,
            size: None,
            web_view_link: None,
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn staleness_scenario() {
        let t0 = at(10);
        let files = vec![doc("a", Some(at(1))), doc("b", Some(at(5)))];
        assert_eq!(classify(&files, Some(t0)).status, IndexStatus::Uptodate);

        let mut changed = files.clone();
        changed[1].modified_time = Some(at(12));
        assert_eq!(classify(&changed, Some(t0)).status, IndexStatus::Outdated);
    }

    #[test]
    fn equal_time_is_up_to_date() {
        let t0 = at(10);
        let files = vec![doc("a", Some(t0))];
        assert_eq!(classify(&files, Some(t0)).status, IndexStatus::Uptodate);
    }

    #[test]
    fn no_build_time_is_none() {
        let files = vec![doc("a", Some(at(1)))];
        assert_eq!(classify(&files, None).status, IndexStatus::None);
        assert_eq!(classify(&[], None).status, IndexStatus::None);
    }

    #[test]
    fn files_without_times_are_ignored() {
        let files = vec![doc("a", None)];
        assert_eq!(classify(&files, Some(at(1))).status, IndexStatus::Uptodate);
    }

    #[test]
    fn status_serializes_lowercase() {
        let info = classify(&[], None);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "none");
    }
}
