//! Error types for the scoredl library.
//!
//! Every pipeline stage surfaces its own typed failure through
//! [`ScoreError`]. Nothing retries and nothing substitutes a default for a
//! failed extraction: the first error ends the invocation, and the binary
//! is the only layer that turns it into a message and an exit code.
//!
//! Transport-level failures are wrapped at the seam ([`crate::transport`])
//! into [`TransportError`] and re-signalled as [`ScoreError::Network`], so a
//! raw `reqwest::Error` never reaches a caller.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scoredl library.
#[derive(Debug, Error)]
pub enum ScoreError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The score reference lacks the host marker or a numeric id.
    #[error("Invalid score reference '{input}': {reason}")]
    InvalidReference { input: String, reason: String },

    /// The requested format is not part of the active format set.
    #[error("Unsupported format '{format}': must be one of [{supported}]")]
    UnsupportedFormat { format: String, supported: String },

    // ── Network errors ────────────────────────────────────────────────────
    /// Connection failure or non-success response.
    ///
    /// `status` is `None` when the request never produced a response.
    #[error("{}", network_message(.url, .status, .reason))]
    Network {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The content-addressed dataset has no entry for this score.
    #[error("Score {score_id} is not in the dataset.\nTry the page source instead: --source page")]
    NotInDataset { score_id: u64 },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// An expected structure was absent or unparseable in a fetched document.
    #[error("Failed to parse {context}: {detail}")]
    Parse { context: String, detail: String },

    // ── External tool errors ──────────────────────────────────────────────
    /// The converter binary could not be found on this host.
    #[error("'{tool}' is not installed (required to export to other formats).\nInstall MuseScore or put it on PATH.")]
    ToolUnavailable { tool: String },

    /// The converter ran but exited unsuccessfully.
    #[error("Conversion to '{format}' failed: {detail}")]
    ConversionFailed { format: String, detail: String },

    /// pdfium could not be loaded for page assembly.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfEngineUnavailable(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local file or scratch-directory I/O failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn network_message(url: &str, status: &Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("Request to '{url}' failed with HTTP {code}: {reason}"),
        None => format!("Request to '{url}' failed: {reason}\nCheck your internet connection."),
    }
}

impl ScoreError {
    pub(crate) fn parse(context: impl Into<String>, detail: impl Into<String>) -> Self {
        ScoreError::Parse {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn status(url: &str, status: u16) -> Self {
        ScoreError::Network {
            url: url.to_string(),
            status: Some(status),
            reason: status_reason(status).to_string(),
        }
    }

    /// `true` for a network error that carried HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScoreError::Network { status: Some(404), .. })
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 | 403 => "access denied",
        404 => "not found",
        410 => "gone",
        429 => "too many requests",
        500..=599 => "server error",
        _ => "unexpected status",
    }
}

/// A failure below HTTP semantics: the request never produced a response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// DNS, TCP, or TLS failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request exceeded the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response body could not be read to completion.
    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    pub(crate) fn into_score_error(self, url: &str) -> ScoreError {
        ScoreError::Network {
            url: url.to_string(),
            status: None,
            reason: self.to_string(),
        }
    }
}
