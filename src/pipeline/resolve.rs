//! ArtifactResolver: derive retrieval addresses from a parsed page.
//!
//! Addresses are a deterministic function of the [`ScoreDocument`] and the
//! format. Most formats hang off the shared base path as `score.<ext>`.
//! MusicXML is the exception: depending on the era of the page it is
//! either linked directly or only reachable by swapping the MP3 suffix.

use crate::config::MxlStrategy;
use crate::document::{PageCount, ScoreDocument};
use crate::error::ScoreError;
use crate::format::{FormatSet, ScoreFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static RE_MXL_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+?\.mxl(?:\?[^\s"'<>]*)?"#).unwrap());

/// Where to retrieve one artifact from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArtifactAddress {
    /// Non-paginated formats.
    Single(String),
    /// One URL per page, in page-index order.
    Paged(Vec<String>),
}

impl ArtifactAddress {
    /// Number of retrievals this address needs.
    pub fn len(&self) -> usize {
        match self {
            ArtifactAddress::Single(_) => 1,
            ArtifactAddress::Paged(pages) => pages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// URL of page `index` (0-based) of the paginated format.
pub fn page_url(base_url: &str, index: usize) -> String {
    format!("{base_url}/score_{index}.svg")
}

/// Resolve the address of `format` for `document`.
///
/// # Errors
/// * [`ScoreError::UnsupportedFormat`] when `format` is outside `formats`.
/// * [`ScoreError::Parse`] for [`MxlStrategy::Direct`] without an embedded link.
/// * [`ScoreError::Internal`] for the paginated format when the page count
///   has not been computed yet.
pub fn resolve_address(
    document: &ScoreDocument,
    format: ScoreFormat,
    formats: FormatSet,
    mxl_strategy: MxlStrategy,
) -> Result<ArtifactAddress, ScoreError> {
    formats.check(format)?;

    let address = match format {
        ScoreFormat::Pdf => {
            let count = match document.page_count {
                PageCount::Computed(n) => n,
                PageCount::Uncomputed => {
                    return Err(ScoreError::Internal(
                        "page count must be computed before resolving the PDF address".into(),
                    ))
                }
            };
            ArtifactAddress::Paged(
                (0..count)
                    .map(|i| page_url(&document.base_url, i))
                    .collect(),
            )
        }
        ScoreFormat::Mxl => ArtifactAddress::Single(resolve_mxl(document, formats, mxl_strategy)?),
        other => ArtifactAddress::Single(direct_url(document, other)),
    };

    debug!("Resolved {} address: {:?}", format, address);
    Ok(address)
}

fn direct_url(document: &ScoreDocument, format: ScoreFormat) -> String {
    format!("{}/score.{}", document.base_url, format.extension())
}

fn resolve_mxl(
    document: &ScoreDocument,
    formats: FormatSet,
    strategy: MxlStrategy,
) -> Result<String, ScoreError> {
    let embedded = RE_MXL_LINK
        .find(&document.data_block)
        .map(|m| m.as_str().to_string());

    match (strategy, embedded) {
        (MxlStrategy::Direct | MxlStrategy::Auto, Some(link)) => Ok(link),
        (MxlStrategy::Direct, None) => Err(ScoreError::parse(
            "embedded data block",
            "no direct .mxl link",
        )),
        (MxlStrategy::Auto | MxlStrategy::FromMp3, _) => {
            let mp3 = match resolve_address(document, ScoreFormat::Mp3, formats, strategy)? {
                ArtifactAddress::Single(url) => url,
                ArtifactAddress::Paged(_) => {
                    return Err(ScoreError::Internal("mp3 resolved to a paged address".into()))
                }
            };
            Ok(substitute_suffix(&mp3, "mp3", "mxl"))
        }
    }
}

/// Replace the extension of the URL's last path segment, keeping any query.
fn substitute_suffix(url: &str, from: &str, to: &str) -> String {
    let (path, query) = match url.find('?') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    match path.strip_suffix(&format!(".{from}")) {
        Some(stem) => format!("{stem}.{to}{query}"),
        None => format!("{path}.{to}{query}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteProfile;

    const BASE: &str = "https://musescore.com/static/musescore/scoredata/gen/1/9/3/4766391/ab12";

    fn doc(extra: &str) -> ScoreDocument {
        let raw = format!(
            r#"<meta property="og:title" content="T"><div class="js-store" data-content="{BASE}/score_0.svg {extra}"></div>"#
        );
        ScoreDocument::parse(raw, &SiteProfile::default()).unwrap()
    }

    #[test]
    fn non_paginated_formats_compose_base_and_suffix() {
        let d = doc("");
        for (fmt, suffix) in [(ScoreFormat::Mp3, "mp3"), (ScoreFormat::Mid, "mid")] {
            assert_eq!(
                resolve_address(&d, fmt, FormatSet::V3, MxlStrategy::Auto).unwrap(),
                ArtifactAddress::Single(format!("{BASE}/score.{suffix}"))
            );
        }
    }

    #[test]
    fn unsupported_format_fails() {
        let d = doc("");
        let err = resolve_address(&d, ScoreFormat::Flac, FormatSet::V3, MxlStrategy::Auto)
            .unwrap_err();
        assert!(matches!(err, ScoreError::UnsupportedFormat { .. }));
        let err = resolve_address(&d, ScoreFormat::Pdf, FormatSet::V2, MxlStrategy::Auto)
            .unwrap_err();
        assert!(matches!(err, ScoreError::UnsupportedFormat { .. }));
    }

    #[test]
    fn mxl_from_mp3_substitutes_suffix() {
        let d = doc("https://cdn.example/x/score.mxl?token=1");
        let addr = resolve_address(&d, ScoreFormat::Mxl, FormatSet::V3, MxlStrategy::FromMp3).unwrap();
        assert_eq!(addr, ArtifactAddress::Single(format!("{BASE}/score.mxl")));
    }

    #[test]
    fn mxl_direct_uses_embedded_link() {
        let d = doc("https://cdn.example/x/score.mxl?token=1");
        let addr = resolve_address(&d, ScoreFormat::Mxl, FormatSet::V3, MxlStrategy::Direct).unwrap();
        assert_eq!(
            addr,
            ArtifactAddress::Single("https://cdn.example/x/score.mxl?token=1".into())
        );
    }

    #[test]
    fn mxl_direct_without_link_fails() {
        let d = doc("");
        let err = resolve_address(&d, ScoreFormat::Mxl, FormatSet::V3, MxlStrategy::Direct)
            .unwrap_err();
        assert!(matches!(err, ScoreError::Parse { .. }));
    }

    #[test]
    fn mxl_auto_prefers_link_then_falls_back() {
        let with = doc("https://cdn.example/y.mxl");
        assert_eq!(
            resolve_address(&with, ScoreFormat::Mxl, FormatSet::V3, MxlStrategy::Auto).unwrap(),
            ArtifactAddress::Single("https://cdn.example/y.mxl".into())
        );
        let without = doc("");
        assert_eq!(
            resolve_address(&without, ScoreFormat::Mxl, FormatSet::V3, MxlStrategy::Auto).unwrap(),
            ArtifactAddress::Single(format!("{BASE}/score.mxl"))
        );
    }

    #[test]
    fn pdf_requires_computed_page_count() {
        let mut d = doc("");
        let err = resolve_address(&d, ScoreFormat::Pdf, FormatSet::V3, MxlStrategy::Auto)
            .unwrap_err();
        assert!(matches!(err, ScoreError::Internal(_)));

        d.page_count = PageCount::Computed(3);
        let addr = resolve_address(&d, ScoreFormat::Pdf, FormatSet::V3, MxlStrategy::Auto).unwrap();
        assert_eq!(
            addr,
            ArtifactAddress::Paged(vec![
                format!("{BASE}/score_0.svg"),
                format!("{BASE}/score_1.svg"),
                format!("{BASE}/score_2.svg"),
            ])
        );
        assert_eq!(addr.len(), 3);
    }

    #[test]
    fn suffix_substitution_keeps_query() {
        assert_eq!(substitute_suffix("https://a/s.mp3?x=1", "mp3", "mxl"), "https://a/s.mxl?x=1");
        assert_eq!(substitute_suffix("https://a/s", "mp3", "mxl"), "https://a/s.mxl");
    }
}
