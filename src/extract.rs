//! Per-page text extraction for PDF and OOXML documents.
//!
//! The builder hands over raw bytes plus a [`ContentKind`]; this module
//! returns the ordered pages of plain UTF-8 text. PDFs keep their page
//! boundaries. Word documents and slide decks always produce exactly one
//! page numbered 1. Extraction never panics: malformed input is an
//! [`ExtractError`] and the builder skips the file.

use std::io::Read;

use quick_xml::events::Event;

use crate::models::{ContentKind, ExtractedPage};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Main document part of a Word package.
const DOCX_BODY_PART: &str = "word/document.xml";
/// Directory holding one XML part per slide.
const PPTX_SLIDES_DIR: &str = "ppt/slides/";

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract pages from a document whose type is only known by MIME string.
pub fn extract_for_mime(bytes: &[u8], mime_type: &str) -> Result<Vec<ExtractedPage>, ExtractError> {
    let kind = ContentKind::from_mime(mime_type)
        .map_err(|_| ExtractError::UnsupportedContentType(mime_type.to_string()))?;
    extract_pages(bytes, kind)
}

/// Extract the ordered pages of a document.
///
/// An empty result means the document carries no text at all; callers omit
/// such documents from the index.
pub fn extract_pages(bytes: &[u8], kind: ContentKind) -> Result<Vec<ExtractedPage>, ExtractError> {
    match kind {
        ContentKind::Pdf => extract_pdf(bytes),
        ContentKind::Docx => extract_docx(bytes).map(|text| vec![ExtractedPage::new(1, text)]),
        ContentKind::Pptx => extract_pptx(bytes).map(|text| vec![ExtractedPage::new(1, text)]),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    // pdf-extract panics on some malformed font and xref tables.
    let raw_pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let pages: Vec<ExtractedPage> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, text)| ExtractedPage::new(i as u32 + 1, join_runs(text)))
        .collect();

    if pages.iter().all(|p| p.content.is_empty()) {
        return Ok(Vec::new());
    }
    Ok(pages)
}

/// Collapse the text runs of a page into a single-space separated string.
fn join_runs(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, DOCX_BODY_PART, MAX_XML_ENTRY_BYTES)?;
    extract_paragraph_text(&doc_xml)
}

/// Raw text of a WordprocessingML body: `w:t` runs, one line per paragraph.
///
/// Paragraphs nest (text boxes, shapes); a nested paragraph becomes its own
/// line inside the enclosing one.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    // Bottom entry collects text outside any paragraph.
    let mut open: Vec<String> = vec![String::new()];
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => open.push(String::new()),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => push_text(&mut open, "\t"),
                b"br" | b"cr" => push_text(&mut open, "\n"),
                b"p" if open.len() == 1 => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                push_text(&mut open, &text);
            }
            Ok(Event::CData(cd)) if in_text => {
                push_text(&mut open, &String::from_utf8_lossy(&cd));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if open.len() > 1 => {
                    let finished = open.pop().unwrap_or_default();
                    if open.len() == 1 {
                        paragraphs.push(finished.trim_end_matches('\n').to_string());
                    } else if let Some(parent) = open.last_mut() {
                        if !parent.is_empty() && !parent.ends_with('\n') {
                            parent.push('\n');
                        }
                        parent.push_str(&finished);
                        parent.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let mut leftover = open.into_iter();
    let loose = leftover.next().unwrap_or_default();
    // Unclosed paragraphs still count.
    paragraphs.extend(leftover.filter(|p| !p.is_empty()));
    if !loose.is_empty() {
        paragraphs.push(loose);
    }
    Ok(paragraphs.join("\n").trim().to_string())
}

fn push_text(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    // Archive order is the package's directory listing order.
    let slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| is_slide_part(n))
        .map(str::to_string)
        .collect();

    let mut fragments: Vec<String> = Vec::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        fragments.extend(strip_tags(&xml)?);
    }
    Ok(fragments.join(" "))
}

fn is_slide_part(name: &str) -> bool {
    name.strip_prefix(PPTX_SLIDES_DIR)
        .map(|rest| !rest.contains('/') && rest.ends_with(".xml"))
        .unwrap_or(false)
}

/// Every non-empty text fragment of an XML document, tags removed.
fn strip_tags(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut out = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(te)) => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let text = text.trim();
                if !text.is_empty() {
                    out.push(text.to_string());
                }
            }
            Ok(Event::CData(cd)) => {
                let text = String::from_utf8_lossy(&cd).trim().to_string();
                if !text.is_empty() {
                    out.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
