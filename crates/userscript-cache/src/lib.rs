//! # userscript-cache
//!
//! Keeps a local copy of the companion in-browser score downloader script
//! and an ETag marker next to it, so the script is only rewritten when the
//! server publishes a new version.
//!
//! ## How it works
//!
//! On each call to [`update_userscript`]:
//!
//! 1. Reads the stored ETag from `{cache_dir}/main.js.etag` (empty if absent).
//! 2. GETs the script URL and compares the response `ETag` header.
//! 3. Equal: nothing is written, [`ScriptStatus::UpToDate`].
//! 4. Different or missing: writes `main.js` and the new marker,
//!    [`ScriptStatus::Updated`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use userscript_cache::{cache_dir, script_url, update_userscript, ScriptStatus};
//!
//! match update_userscript(&script_url(), &cache_dir()).expect("update failed") {
//!     ScriptStatus::UpToDate => eprintln!("already at latest version"),
//!     ScriptStatus::Updated => eprintln!("new version downloaded"),
//! }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `SCOREDL_USERSCRIPT_URL`: fetch the script from another location.
//! - `SCOREDL_SCRIPT_CACHE_DIR`: override the default cache directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Where the script is published.
pub const DEFAULT_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/Xmader/musescore-downloader/master/dist/main.js";

/// Script file name inside the cache directory.
pub const SCRIPT_FILE: &str = "main.js";

/// Freshness marker file name inside the cache directory.
pub const ETAG_FILE: &str = "main.js.etag";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by userscript-cache operations.
#[derive(Error, Debug)]
pub enum UserscriptError {
    /// Could not create or write the local cache directory.
    #[error("Cache directory error at '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),
}

/// Outcome of [`update_userscript`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStatus {
    /// The stored ETag matched the server's; nothing was written.
    UpToDate,
    /// A new script (and marker) was written.
    Updated,
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the directory holding the script and its marker.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/scoredl/`
/// - **Linux**: `~/.cache/scoredl/`
/// - **Windows**: `%LOCALAPPDATA%\scoredl\`
///
/// Override by setting `SCOREDL_SCRIPT_CACHE_DIR`.
pub fn cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("SCOREDL_SCRIPT_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("scoredl")
}

/// The script URL, honouring `SCOREDL_USERSCRIPT_URL`.
pub fn script_url() -> String {
    std::env::var("SCOREDL_USERSCRIPT_URL").unwrap_or_else(|_| DEFAULT_SCRIPT_URL.to_string())
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the cached script path, or `None` if nothing was downloaded yet.
pub fn cached_script_path(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(SCRIPT_FILE);
    path.is_file().then_some(path)
}

/// The stored ETag, empty when no marker exists.
pub fn stored_etag(dir: &Path) -> String {
    std::fs::read_to_string(dir.join(ETAG_FILE)).unwrap_or_default()
}

/// Refresh the script in `dir` from `url`.
///
/// The body is only read when the ETag differs from the stored marker.
pub fn update_userscript(url: &str, dir: &Path) -> Result<ScriptStatus, UserscriptError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("userscript-cache/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| UserscriptError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| UserscriptError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(UserscriptError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if is_current(dir, etag.as_deref()) {
        return Ok(ScriptStatus::UpToDate);
    }

    let body = response
        .bytes()
        .map_err(|e| UserscriptError::Download(format!("Read error: {e}")))?;
    store_script(dir, etag.as_deref(), &body)?;
    Ok(ScriptStatus::Updated)
}

/// `true` when `etag` is present and equals the stored marker.
///
/// A response without an ETag is never current.
pub fn is_current(dir: &Path, etag: Option<&str>) -> bool {
    match etag {
        Some(tag) if !tag.is_empty() => stored_etag(dir) == tag,
        _ => false,
    }
}

/// Write the script, then its marker.
///
/// Without an ETag the old marker is removed, so the next run downloads
/// again.
pub fn store_script(dir: &Path, etag: Option<&str>, body: &[u8]) -> Result<(), UserscriptError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| UserscriptError::CacheDir { path, source }
    };

    std::fs::create_dir_all(dir).map_err(io_err(dir))?;

    let script = dir.join(SCRIPT_FILE);
    let tmp = dir.join(format!(".{SCRIPT_FILE}.part"));
    std::fs::write(&tmp, body).map_err(io_err(&tmp))?;
    if let Err(e) = std::fs::rename(&tmp, &script) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&script)(e));
    }

    let marker = dir.join(ETAG_FILE);
    match etag {
        Some(tag) => std::fs::write(&marker, tag).map_err(io_err(&marker))?,
        None => {
            if marker.exists() {
                std::fs::remove_file(&marker).map_err(io_err(&marker))?;
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
