//! Keyword search over the persisted index.
//!
//! Search is a linear, case-insensitive substring scan: every page of every
//! document is tested in index order (build order, then page order). Each
//! matching page yields one [`SearchResult`] whose snippet is cut around the
//! first match on that page. There is no ranking.
//!
//! Offsets are counted in characters, never bytes, so snippets are always
//! valid UTF-8 regardless of where a match falls.

use anyhow::Result as AnyResult;

use crate::config::{Config, SearchConfig};
use crate::error::{LibraryError, Result};
use crate::models::{SearchIndex, SearchPage, SearchResult};
use crate::store::IndexStore;

/// Marker wrapped around every snippet.
const ELLIPSIS: &str = "...";

/// Single-char case folding that keeps char offsets aligned with the source.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Char offset of the first case-insensitive occurrence of `needle`.
fn find_match(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(h, n)| fold(*h) == *n)
    })
}

/// Snippet around a match at char offset `at` of length `len`, clamped to
/// the content bounds.
fn clip(content: &[char], at: usize, len: usize, radius: usize) -> String {
    let start = at.saturating_sub(radius);
    let end = (at + len + radius).min(content.len());
    let body: String = content[start..end].iter().collect();
    format!("{}{}{}", ELLIPSIS, body, ELLIPSIS)
}

/// Snippet for the first match of `query` in `content`, if any.
pub fn make_snippet(content: &str, query: &str, radius: usize) -> Option<String> {
    let haystack: Vec<char> = content.chars().collect();
    let needle: Vec<char> = query.chars().map(fold).collect();
    find_match(&haystack, &needle).map(|at| clip(&haystack, at, needle.len(), radius))
}

/// Every matching (document, page) pair, unpaginated, in index order.
pub fn match_all(index: &SearchIndex, query: &str, radius: usize) -> Vec<SearchResult> {
    let needle: Vec<char> = query.chars().map(fold).collect();
    let mut results = Vec::new();
    for (id, entry) in index.iter() {
        for page in &entry.pages {
            let haystack: Vec<char> = page.content.chars().collect();
            if let Some(at) = find_match(&haystack, &needle) {
                results.push(SearchResult {
                    id: id.to_string(),
                    name: entry.name.clone(),
                    page_number: page.page_number,
                    snippet: clip(&haystack, at, needle.len(), radius),
                });
            }
        }
    }
    results
}

/// Number of pages needed for `total` results.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

/// Search an in-memory index and return the requested page of results.
///
/// `page` is 1-based; 0 is treated as 1. Pages past the end are empty.
pub fn search_index(
    index: &SearchIndex,
    query: &str,
    page: usize,
    opts: &SearchConfig,
) -> Result<SearchPage> {
    if query.is_empty() {
        return Err(LibraryError::InvalidQuery(
            "query must not be empty".to_string(),
        ));
    }
    let page = page.max(1);
    let page_size = opts.page_size.max(1);
    let all = match_all(index, query, opts.snippet_radius);
    let total_results = all.len();
    let results = all
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    Ok(SearchPage {
        results,
        total_pages: total_pages(total_results, page_size),
        total_results,
        page,
    })
}

/// Load the persisted index and search it.
pub async fn search_documents(
    store: &IndexStore,
    query: &str,
    page: usize,
    opts: &SearchConfig,
) -> Result<SearchPage> {
    if query.is_empty() {
        return Err(LibraryError::InvalidQuery(
            "query must not be empty".to_string(),
        ));
    }
    let index = store.load().await?;
    let out = search_index(&index, query, page, opts)?;
    tracing::debug!(
        query,
        documents = index.len(),
        matches = out.total_results,
        "search complete"
    );
    Ok(out)
}

/// CLI entry point for `shelf search`.
pub async fn run_search(config: &Config, store: &IndexStore, query: &str, page: usize) -> AnyResult<()> {
    if query.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let out = search_documents(store, query, page, &config.search).await?;
    if out.results.is_empty() {
        if out.total_results > 0 {
            println!(
                "No results on page {} ({} pages, {} matches).",
                out.page, out.total_pages, out.total_results
            );
        } else {
            println!("No results.");
        }
        return Ok(());
    }

    let first = (out.page - 1) * config.search.page_size.max(1);
    for (i, r) in out.results.iter().enumerate() {
        println!("{}. {}  (page {})", first + i + 1, r.name, r.page_number);
        println!("    id: {}", r.id);
        println!("    {}", r.snippet.replace('\n', " "));
        println!();
    }
    println!(
        "page {} of {} ({} matches)",
        out.page, out.total_pages, out.total_results
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedPage, IndexEntry};

    fn opts() -> SearchConfig {
        SearchConfig::default()
    }

    fn entry(name: &str, pages: &[&str]) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, t)| ExtractedPage::new(i as u32 + 1, *t))
                .collect(),
        }
    }

    fn two_docs() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.insert("a", entry("A.pdf", &["alpha beta"]));
        index.insert("b", entry("B.docx", &["beta gamma"]));
        index
    }

    #[test]
    fn two_document_scenario() {
        let index = two_docs();

        let beta = search_index(&index, "beta", 1, &opts()).unwrap();
        assert_eq!(beta.results.len(), 2);
        assert_eq!(beta.results[0].id, "a");
        assert_eq!(beta.results[1].id, "b");
        assert!(beta.results.iter().all(|r| r.page_number == 1));

        let alpha = search_index(&index, "alpha", 1, &opts()).unwrap();
        assert_eq!(alpha.results.len(), 1);
        assert_eq!(alpha.results[0].name, "A.pdf");

        let none = search_index(&index, "zzz", 1, &opts()).unwrap();
        assert!(none.results.is_empty());
        assert_eq!(none.total_pages, 0);
    }

    #[test]
    fn case_insensitive() {
        let mut index = SearchIndex::new();
        index.insert("1", entry("one", &["the report is due"]));
        index.insert("2", entry("two", &["REPORT FOLLOWS"]));
        index.insert("3", entry("three", &["A RePort"]));
        index.insert("4", entry("four", &["nothing here"]));
        let out = search_index(&index, "Report", 1, &opts()).unwrap();
        let ids: Vec<&str> = out.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn multi_page_match_yields_one_result_per_page() {
        let mut index = SearchIndex::new();
        index.insert(
            "doc",
            entry("Doc.pdf", &["intro", "budget table", "misc", "notes", "final budget"]),
        );
        let out = search_index(&index, "budget", 1, &opts()).unwrap();
        let pages: Vec<u32> = out.results.iter().map(|r| r.page_number).collect();
        assert_eq!(pages, vec![2, 5]);
        assert!(out.results.iter().all(|r| r.id == "doc"));
    }

    #[test]
    fn repeated_term_on_one_page_is_one_result() {
        let mut index = SearchIndex::new();
        index.insert("d", entry("D", &["tax tax tax"]));
        let out = search_index(&index, "tax", 1, &opts()).unwrap();
        assert_eq!(out.total_results, 1);
    }

    #[test]
    fn snippet_clamps_at_start() {
        let snippet = make_snippet("report on things", "report", 50).unwrap();
        assert_eq!(snippet, "...report on things...");
    }

    #[test]
    fn snippet_clamps_at_end() {
        let content = format!("{}needle", "x".repeat(80));
        let snippet = make_snippet(&content, "needle", 50).unwrap();
        assert_eq!(snippet, format!("...{}needle...", "x".repeat(50)));
    }

    #[test]
    fn snippet_clips_both_sides() {
        let content = format!("{}mid{}", "a".repeat(100), "b".repeat(100));
        let snippet = make_snippet(&content, "MID", 50).unwrap();
        assert_eq!(
            snippet,
            format!("...{}mid{}...", "a".repeat(50), "b".repeat(50))
        );
    }

    #[test]
    fn snippet_is_char_based() {
        let content = format!("{}café crème", "é".repeat(60));
        let snippet = make_snippet(&content, "CAFÉ", 5).unwrap();
        assert_eq!(snippet, "...ééééécafé crèm...");
    }

    #[test]
    fn pagination_covers_every_result_once() {
        let mut index = SearchIndex::new();
        for i in 0..23 {
            index.insert(format!("d{:02}", i), entry(&format!("D{}", i), &["common term"]));
        }
        let all = match_all(&index, "term", 50);
        let first = search_index(&index, "term", 1, &opts()).unwrap();
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_results, 23);

        let mut concatenated = Vec::new();
        for p in 1..=first.total_pages {
            let page = search_index(&index, "term", p, &opts()).unwrap();
            assert!(page.results.len() <= 10);
            concatenated.extend(page.results);
        }
        assert_eq!(concatenated, all);

        let past_end = search_index(&index, "term", 4, &opts()).unwrap();
        assert!(past_end.results.is_empty());
        assert_eq!(past_end.total_pages, 3);
    }

    #[test]
    fn total_pages_is_ceiling() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn page_zero_is_first_page() {
        let out = search_index(&two_docs(), "beta", 0, &opts()).unwrap();
        assert_eq!(out.page, 1);
        assert_eq!(out.results.len(), 2);
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(matches!(
            search_index(&two_docs(), "", 1, &opts()),
            Err(LibraryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn whitespace_query_is_searched_literally() {
        let out = search_index(&two_docs(), " ", 1, &opts()).unwrap();
        assert_eq!(out.total_results, 2);

        let out = search_index(&two_docs(), "  ", 1, &opts()).unwrap();
        assert_eq!(out.total_results, 0);
    }
}
