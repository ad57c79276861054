//! Result types returned by the download entry points.

use crate::config::Resolution;
use crate::document::PageMetadata;
use crate::format::ScoreFormat;
use crate::mscz::ScoreMetadata;
use crate::pipeline::locate::ScoreIdentity;
use crate::pipeline::sanitize::sanitize;
use serde::Serialize;

/// A downloaded (and, when needed, assembled or converted) artifact.
#[derive(Debug, Clone)]
pub struct DownloadOutput {
    /// Final artifact bytes.
    pub bytes: Vec<u8>,
    pub format: ScoreFormat,
    /// Human-readable title.
    pub title: String,
    /// `None` for local archives.
    pub identity: Option<ScoreIdentity>,
    pub resolution: Resolution,
    /// Archive metadata, for dataset downloads and local archives.
    pub score_metadata: Option<ScoreMetadata>,
    /// Stem of the `.mscx` inside the archive, when there was one.
    pub mscx_stem: Option<String>,
    pub stats: DownloadStats,
}

impl DownloadOutput {
    /// File-name stem derived from the title.
    ///
    /// Falls back to the `.mscx` stem, then `score_<id>`, when the title
    /// sanitises to nothing.
    pub fn file_stem(&self) -> String {
        file_stem(
            &self.title,
            self.mscx_stem.as_deref(),
            self.identity.as_ref().map(ScoreIdentity::score_id),
        )
    }

    /// `<stem>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), self.format.extension())
    }
}

/// See [`DownloadOutput::file_stem`].
pub fn file_stem(title: &str, mscx_stem: Option<&str>, score_id: Option<u64>) -> String {
    let stem = sanitize(title);
    if !stem.is_empty() {
        return stem;
    }
    if let Some(s) = mscx_stem.map(sanitize).filter(|s| !s.is_empty()) {
        return s;
    }
    match score_id {
        Some(id) => format!("score_{id}"),
        None => "score".to_string(),
    }
}

/// Timing and size counters for one download.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadStats {
    /// Pages fetched (1 for non-paginated formats).
    pub pages: usize,
    /// Size of the final artifact.
    pub bytes: usize,
    /// Time spent retrieving and assembling the artifact.
    pub fetch_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::inspect`] reports about a score without downloading it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSummary {
    pub identity: ScoreIdentity,
    pub title: String,
    pub resolution: Resolution,
    /// Shared artifact prefix. `None` in dataset mode.
    pub base_url: Option<String>,
    pub metadata: PageMetadata,
    /// Pages of the paginated format. `None` in dataset mode.
    pub page_count: Option<usize>,
    /// Formats available under the active format set.
    pub formats: Vec<ScoreFormat>,
}
