//! # scoredl
//!
//! Download scores from an online score library as MP3, MIDI, MusicXML or
//! PDF, or, through the content-addressed dataset, as the original `.mscz`
//! archive and anything MuseScore can export from it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! score URL
//!  │
//!  ├─ 1. Locate    numeric score id from the URL's trailing segment
//!  ├─ 2. Page      one GET; title, metadata and the embedded data block
//!  ├─ 3. Paginate  page count for PDF (index document or probing)
//!  ├─ 4. Resolve   format-specific addresses under the base path
//!  ├─ 5. Fetch     one GET, or one per page (sequential or parallel)
//!  └─ 6. Assemble  SVG pages → A4 PDF via resvg + pdfium (spawn_blocking)
//! ```
//!
//! With [`Resolution::Dataset`], steps 3–6 are replaced by an IPFS lookup of
//! the `.mscz` archive followed by an optional external conversion.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scoredl::{download_to_file, FetchConfig, ScoreFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FetchConfig::builder().format(ScoreFormat::Mid).build()?;
//!     let output = download_to_file(
//!         "https://musescore.com/user/1/scores/4766391",
//!         "score.mid",
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} ({} bytes)", output.title, output.stats.bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scoredl` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scoredl = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod document;
pub mod download;
pub mod error;
pub mod format;
pub mod html;
pub mod mscz;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FetchConfig, FetchConfigBuilder, FetchMode, MxlStrategy, PaginationStrategy, Resolution,
    SiteProfile, DEFAULT_MIRROR,
};
pub use converter::{export, export_bytes, Converter, MuseScoreConverter};
pub use document::{PageCount, PageMetadata, ScoreDocument};
pub use download::{
    download, download_sync, download_to_file, export_local, inspect, is_local_archive,
    write_atomic,
};
pub use error::{ScoreError, TransportError};
pub use format::{FormatSet, ScoreFormat};
pub use mscz::{MsczScore, ScoreMetadata};
pub use output::{DownloadOutput, DownloadStats, ScoreSummary};
pub use pipeline::assemble::{PageAssembler, PdfAssembler};
pub use pipeline::fetch::{ArtifactPayload, ScratchPage};
pub use pipeline::locate::ScoreIdentity;
pub use pipeline::resolve::ArtifactAddress;
pub use pipeline::sanitize::sanitize;
pub use progress::{DownloadProgressCallback, NoopProgressCallback, ProgressCallback};
pub use transport::{HttpResponse, HttpTransport, MemoryTransport, Transport};
