//! Configuration types for score downloads.
//!
//! All download behaviour is controlled through [`FetchConfig`], built via
//! its [`FetchConfigBuilder`]. Site-specific knowledge (host marker, URL
//! shapes, where the embedded data lives) is isolated in [`SiteProfile`] so
//! the pipeline stages stay generic over the hosting site.

use crate::converter::Converter;
use crate::error::ScoreError;
use crate::format::{FormatSet, ScoreFormat};
use crate::progress::ProgressCallback;
use crate::transport::Transport;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default IPFS gateway. Newer scores tend to appear here before other mirrors.
pub const DEFAULT_MIRROR: &str = "https://ipfs.io";

/// Configuration for one download invocation.
///
/// # Example
/// ```rust
/// use scoredl::{FetchConfig, ScoreFormat, FetchMode};
///
/// let config = FetchConfig::builder()
///     .format(ScoreFormat::Pdf)
///     .fetch_mode(FetchMode::Parallel { concurrency: 4 })
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.format, ScoreFormat::Pdf);
/// ```
#[derive(Clone)]
pub struct FetchConfig {
    /// Output format. Default: mp3.
    pub format: ScoreFormat,

    /// Where artifacts come from. Default: [`Resolution::Page`].
    pub resolution: Resolution,

    /// Supported format generation. `None` picks the resolution's default:
    /// [`FormatSet::V3`] for page scraping, [`FormatSet::V4`] for the dataset.
    pub formats: Option<FormatSet>,

    /// How the `mxl` address is derived. Default: [`MxlStrategy::Auto`].
    pub mxl_strategy: MxlStrategy,

    /// How the PDF page count is discovered. Default: [`PaginationStrategy::IndexDocument`].
    pub pagination: PaginationStrategy,

    /// Sequential or bounded-parallel page fetching. Default: sequential.
    pub fetch_mode: FetchMode,

    /// Rasterisation DPI for PDF page assembly. Range: 36–600. Default: 150.
    pub dpi: u32,

    /// IPFS gateway used by [`Resolution::Dataset`]. Default: [`DEFAULT_MIRROR`].
    pub mirror: String,

    /// Overwrite dataset metadata with the live page's fields. Default: true.
    pub update_metadata: bool,

    /// Per-request timeout in seconds. Default: 60.
    pub timeout_secs: u64,

    /// Hosting-site description.
    pub site: SiteProfile,

    /// Pre-constructed transport. Takes precedence over the default HTTP client.
    pub transport: Option<Arc<dyn Transport>>,

    /// Converter for dataset exports other than `mscz`. `None` looks up
    /// MuseScore on `PATH` when first needed.
    pub converter: Option<Arc<dyn Converter>>,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            format: ScoreFormat::Mp3,
            resolution: Resolution::default(),
            formats: None,
            mxl_strategy: MxlStrategy::default(),
            pagination: PaginationStrategy::default(),
            fetch_mode: FetchMode::default(),
            dpi: 150,
            mirror: DEFAULT_MIRROR.to_string(),
            update_metadata: true,
            timeout_secs: 60,
            site: SiteProfile::default(),
            transport: None,
            converter: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("format", &self.format)
            .field("resolution", &self.resolution)
            .field("formats", &self.formats)
            .field("mxl_strategy", &self.mxl_strategy)
            .field("pagination", &self.pagination)
            .field("fetch_mode", &self.fetch_mode)
            .field("dpi", &self.dpi)
            .field("mirror", &self.mirror)
            .field("update_metadata", &self.update_metadata)
            .field("timeout_secs", &self.timeout_secs)
            .field("site", &self.site)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn Transport>"))
            .field("converter", &self.converter.as_ref().map(|_| "<dyn Converter>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl FetchConfig {
    /// Create a new builder for `FetchConfig`.
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The format generation in force for this config.
    pub fn format_set(&self) -> FormatSet {
        self.formats.unwrap_or(match self.resolution {
            Resolution::Page => FormatSet::V3,
            Resolution::Dataset => FormatSet::V4,
        })
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn format(mut self, format: ScoreFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.config.resolution = resolution;
        self
    }

    pub fn formats(mut self, set: FormatSet) -> Self {
        self.config.formats = Some(set);
        self
    }

    pub fn mxl_strategy(mut self, strategy: MxlStrategy) -> Self {
        self.config.mxl_strategy = strategy;
        self
    }

    pub fn pagination(mut self, strategy: PaginationStrategy) -> Self {
        self.config.pagination = strategy;
        self
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.config.fetch_mode = match mode {
            FetchMode::Parallel { concurrency } => FetchMode::Parallel {
                concurrency: concurrency.max(1),
            },
            m => m,
        };
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(36, 600);
        self
    }

    pub fn mirror(mut self, mirror: impl Into<String>) -> Self {
        self.config.mirror = mirror.into().trim_end_matches('/').to_string();
        self
    }

    pub fn update_metadata(mut self, v: bool) -> Self {
        self.config.update_metadata = v;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn site(mut self, site: SiteProfile) -> Self {
        self.config.site = site;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FetchConfig, ScoreError> {
        let c = &self.config;
        if c.dpi < 36 || c.dpi > 600 {
            return Err(ScoreError::InvalidConfig(format!(
                "DPI must be 36–600, got {}",
                c.dpi
            )));
        }
        if let FetchMode::Parallel { concurrency: 0 } = c.fetch_mode {
            return Err(ScoreError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.resolution == Resolution::Dataset && c.mirror.is_empty() {
            return Err(ScoreError::InvalidConfig(
                "An IPFS mirror is required for dataset resolution".into(),
            ));
        }
        if c.site.host_marker.is_empty() {
            return Err(ScoreError::InvalidConfig("Host marker must not be empty".into()));
        }
        c.format_set().check(c.format)?;
        Ok(self.config)
    }
}

// ── Site profile ─────────────────────────────────────────────────────────

/// What the pipeline knows about the hosting site.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Substring every score URL must contain.
    pub host_marker: String,

    /// Pattern whose first capture group is the base retrieval path.
    /// Applied to the embedded data block.
    pub base_url_pattern: Regex,

    /// Pattern whose first capture group is the owner id and second the
    /// score id, applied to the page's `og:url`.
    pub page_url_pattern: Regex,

    /// Attribute holding the embedded data block.
    pub data_attr: String,

    /// Class that identifies the data-block element, if any.
    pub data_class: Option<String>,

    /// File name of the page-index side document under the base path.
    pub index_document: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::for_host("musescore.com")
    }
}

impl SiteProfile {
    /// Profile for a site laid out like the public score library, hosted at `host`.
    pub fn for_host(host: &str) -> Self {
        let h = regex::escape(host);
        Self {
            host_marker: host.to_string(),
            base_url_pattern: Regex::new(&format!(
                r"(https?://{h}/static/musescore/scoredata/gen/[a-zA-Z0-9/]*)/score"
            ))
            .unwrap(),
            page_url_pattern: Regex::new(&format!(r"https?://{h}/user/(\d+)/scores/(\d+)/?$"))
                .unwrap(),
            data_attr: "data-content".to_string(),
            data_class: Some("js-store".to_string()),
            index_document: "space.jsonp".to_string(),
        }
    }

    /// Replace the base-URL pattern. Fails if `pattern` has no capture group.
    pub fn with_base_url_pattern(mut self, pattern: &str) -> Result<Self, ScoreError> {
        let re = Regex::new(pattern)
            .map_err(|e| ScoreError::InvalidConfig(format!("base URL pattern: {e}")))?;
        if re.captures_len() < 2 {
            return Err(ScoreError::InvalidConfig(
                "base URL pattern needs one capture group".into(),
            ));
        }
        self.base_url_pattern = re;
        Ok(self)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where artifacts are resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// Scrape the score page for direct artifact URLs. (default)
    #[default]
    Page,
    /// Resolve the `.mscz` through the content-addressed dataset and convert locally.
    Dataset,
}

/// How the `mxl` address is derived.
///
/// The hosting site has at times embedded a direct MusicXML link and at
/// other times only exposed one beside the MP3. Both derivations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MxlStrategy {
    /// Use an embedded `.mxl` link if present, else derive from the mp3 address. (default)
    #[default]
    Auto,
    /// Only accept a directly embedded `.mxl` link.
    Direct,
    /// Resolve `mp3`, then substitute the suffix.
    FromMp3,
}

/// How the PDF page count is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaginationStrategy {
    /// Count distinct pages in the jsonp page-index document. (default)
    #[default]
    IndexDocument,
    /// GET pages 0, 1, 2, … until the first 404.
    Probe,
}

/// Sequential or bounded-parallel page fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchMode {
    /// One page at a time. (default)
    #[default]
    Sequential,
    /// Up to `concurrency` pages in flight.
    Parallel { concurrency: usize },
}

impl FetchMode {
    /// Parallel mode sized to the host's available parallelism (fallback 8).
    pub fn parallel() -> Self {
        FetchMode::Parallel {
            concurrency: default_concurrency(),
        }
    }

    pub fn concurrency(self) -> usize {
        match self {
            FetchMode::Sequential => 1,
            FetchMode::Parallel { concurrency } => concurrency,
        }
    }
}

/// Detected hardware parallelism, or 8 when it cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}
