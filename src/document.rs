//! The parsed score page.
//!
//! [`ScoreDocument::parse`] is a pure function of the page body and the
//! [`SiteProfile`]; fetching lives in [`crate::pipeline::page`]. The
//! document is owned by the invocation that fetched it and is never shared
//! across concurrent downloads.

use crate::config::SiteProfile;
use crate::error::ScoreError;
use crate::html::HtmlTags;
use serde::Serialize;

/// Page count of the paginated format.
///
/// Resolved once per document, before any concurrent page fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PageCount {
    #[default]
    Uncomputed,
    Computed(usize),
}

impl PageCount {
    pub fn get(self) -> Option<usize> {
        match self {
            PageCount::Uncomputed => None,
            PageCount::Computed(n) => Some(n),
        }
    }
}

/// Metadata fields published in the page's `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    /// `og:title`
    pub title: Option<String>,
    /// `og:url`
    pub url: Option<String>,
    /// `musescore:author`
    pub author: Option<String>,
    /// `musescore:composer`
    pub composer: Option<String>,
}

impl PageMetadata {
    pub const FIELDS: [(&'static str, &'static str); 4] = [
        ("title", "og:title"),
        ("url", "og:url"),
        ("author", "musescore:author"),
        ("composer", "musescore:composer"),
    ];

    fn from_tags(tags: &HtmlTags) -> Self {
        let grab = |key: &str| tags.meta(key).map(str::to_string);
        Self {
            title: grab("og:title"),
            url: grab("og:url"),
            author: grab("musescore:author"),
            composer: grab("musescore:composer"),
        }
    }

    /// Lookup by field name or by meta property.
    pub fn get(&self, name: &str) -> Option<&str> {
        let field = Self::FIELDS
            .iter()
            .find(|(field, prop)| *field == name || *prop == name)
            .map(|(field, _)| *field)?;
        match field {
            "title" => self.title.as_deref(),
            "url" => self.url.as_deref(),
            "author" => self.author.as_deref(),
            "composer" => self.composer.as_deref(),
            _ => None,
        }
    }
}

/// A fetched score page with its derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreDocument {
    /// Raw page body.
    #[serde(skip)]
    pub raw: String,
    /// Human-readable title (`og:title`).
    pub title: String,
    /// URL prefix shared by every format-specific artifact.
    pub base_url: String,
    /// The single embedded data block, entity-decoded with `\/` normalised.
    #[serde(skip)]
    pub data_block: String,
    pub metadata: PageMetadata,
    pub page_count: PageCount,
}

impl ScoreDocument {
    /// Parse a score page.
    ///
    /// # Errors
    /// [`ScoreError::Parse`] when the title is absent, the data block is
    /// absent or duplicated, or no base path is found inside it.
    pub fn parse(raw: impl Into<String>, site: &SiteProfile) -> Result<Self, ScoreError> {
        let raw = raw.into();
        let tags = HtmlTags::parse(&raw);
        let metadata = PageMetadata::from_tags(&tags);

        let title = metadata
            .title
            .clone()
            .ok_or_else(|| ScoreError::parse("score page", "og:title meta field is missing"))?;

        let data_block = extract_data_block(&tags, site)?;

        let base_url = site
            .base_url_pattern
            .captures(&data_block)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                ScoreError::parse(
                    "embedded data block",
                    format!("no base URL matching {}", site.base_url_pattern.as_str()),
                )
            })?;

        Ok(Self {
            raw,
            title,
            base_url,
            data_block,
            metadata,
            page_count: PageCount::Uncomputed,
        })
    }

    /// Parse only what the dataset path needs: the title and metadata.
    ///
    /// The data block is not required here since artifacts come from the
    /// dataset, not from page links.
    pub fn parse_metadata(raw: &str) -> Result<PageMetadata, ScoreError> {
        let metadata = PageMetadata::from_tags(&HtmlTags::parse(raw));
        if metadata.title.is_none() {
            return Err(ScoreError::parse(
                "score page",
                "og:title meta field is missing",
            ));
        }
        Ok(metadata)
    }
}

/// Exactly one element must carry the data attribute.
fn extract_data_block(tags: &HtmlTags, site: &SiteProfile) -> Result<String, ScoreError> {
    let mut blocks = tags
        .with_attr(&site.data_attr, site.data_class.as_deref())
        .filter_map(|t| t.attr(&site.data_attr));

    let first = blocks.next().ok_or_else(|| {
        ScoreError::parse(
            "score page",
            format!("embedded data block ({}) is missing", site.data_attr),
        )
    })?;
    if blocks.next().is_some() {
        return Err(ScoreError::parse(
            "score page",
            format!("more than one embedded data block ({})", site.data_attr),
        ));
    }
    Ok(first.replace("\\/", "/"))
}
