//! # Docshelf
//!
//! A personal document library over a cloud drive.
//!
//! Docshelf lists the PDF, Word and PowerPoint files in a user's Google
//! Drive, extracts their text page by page, and stores a single JSON search
//! index back in the same drive. Keyword search runs against that index;
//! a freshness check tells whether documents changed since the last build.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Drive files │──▶│   Builder   │──▶│  Index blob  │
//! │ PDF/DOCX/   │   │  extract +  │   │ (same drive) │
//! │ PPTX        │   │  assemble   │   └──────┬───────┘
//! └─────────────┘   └─────────────┘          │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │ (shelf)  │         │  (axum)  │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export SHELF_ACCESS_TOKEN=...     # OAuth access token with Drive scope
//! shelf build                       # rebuild the index
//! shelf search "quarterly budget"
//! shelf status                      # is the index stale?
//! shelf serve                       # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy and HTTP status mapping |
//! | [`extract`] | PDF / DOCX / PPTX text extraction |
//! | [`traits`] | Remote storage abstraction |
//! | [`drive`] | Google Drive v3 client |
//! | [`memory`] | In-memory storage for tests |
//! | [`store`] | Index blob and build metadata persistence |
//! | [`builder`] | Full index rebuild |
//! | [`search`] | Keyword search with snippets and pagination |
//! | [`staleness`] | Index freshness check |
//! | [`files`] | File browsing |
//! | [`progress`] | Build progress reporting |
//! | [`status`] | Live build status record and event fan-out |
//! | [`server`] | HTTP API server |

pub mod builder;
pub mod config;
pub mod drive;
pub mod error;
pub mod extract;
pub mod files;
pub mod memory;
pub mod models;
pub mod progress;
pub mod search;
pub mod server;
pub mod staleness;
pub mod status;
pub mod store;
pub mod traits;
