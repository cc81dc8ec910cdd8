//! Browsing the user's documents.
//!
//! One page at a time, newest first, optionally narrowed by a name filter.
//! Used by `shelf files` and `GET /files`.

use anyhow::Result;

use crate::config::Config;
use crate::traits::{FileStorage, ListQuery};

/// Listing request used for browsing: newest first, one short page.
pub fn browse_query(
    config: &Config,
    name_contains: Option<String>,
    page_token: Option<String>,
) -> ListQuery {
    ListQuery {
        name_contains: name_contains.filter(|q| !q.trim().is_empty()),
        page_token: page_token.filter(|t| !t.is_empty()),
        page_size: config.storage.browse_page_size,
        order_by: Some("createdTime desc".to_string()),
    }
}

/// CLI entry point for `shelf files`: one page of supported documents,
/// newest first.
pub async fn run_files(
    config: &Config,
    storage: &dyn FileStorage,
    name_contains: Option<String>,
    page_token: Option<String>,
) -> Result<()> {
    let query = browse_query(config, name_contains, page_token);
    let listing = storage.list_files(&query).await?;

    if listing.files.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<36} {:<6} {:<20} NAME", "ID", "TYPE", "MODIFIED");
    for doc in &listing.files {
        let kind = doc
            .kind()
            .map(|k| k.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let modified = doc
            .modified_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<36} {:<6} {:<20} {}", doc.id, kind, modified, doc.name);
    }
    if let Some(token) = &listing.next_page_token {
        println!();
        println!("more: --page-token {}", token);
    }
    Ok(())
}
