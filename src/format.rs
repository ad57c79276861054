//! Output formats and the versioned sets that admit them.
//!
//! The supported set grew over time: audio only, then MusicXML, then PDF,
//! then everything MuseScore can export. A [`FormatSet`] pins one of those
//! generations so that a selector outside it is a validation failure
//! rather than a silent fallback.

use crate::error::ScoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single downloadable output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFormat {
    Pdf,
    Mscz,
    Mxl,
    Mid,
    Mp3,
    Flac,
    Ogg,
}

impl ScoreFormat {
    /// All formats, in display order.
    pub const ALL: [ScoreFormat; 7] = [
        ScoreFormat::Pdf,
        ScoreFormat::Mscz,
        ScoreFormat::Mxl,
        ScoreFormat::Mid,
        ScoreFormat::Mp3,
        ScoreFormat::Flac,
        ScoreFormat::Ogg,
    ];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ScoreFormat::Pdf => "pdf",
            ScoreFormat::Mscz => "mscz",
            ScoreFormat::Mxl => "mxl",
            ScoreFormat::Mid => "mid",
            ScoreFormat::Mp3 => "mp3",
            ScoreFormat::Flac => "flac",
            ScoreFormat::Ogg => "ogg",
        }
    }

    /// Paginated formats are assembled from one download per page.
    pub fn is_paginated(self) -> bool {
        matches!(self, ScoreFormat::Pdf)
    }
}

impl fmt::Display for ScoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ScoreFormat {
    type Err = ScoreError;

    /// Parse against the widest set. Use [`FormatSet::parse`] to validate
    /// against a narrower generation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatSet::V4.parse(s)
    }
}

/// A generation of supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormatSet {
    /// `{mid, mp3}`
    V1,
    /// `{mid, mp3, mxl}`
    V2,
    /// `{mid, mp3, mxl, pdf}`: everything the score page links to.
    #[default]
    V3,
    /// `{pdf, mscz, mxl, mid, mp3, flac, ogg}`: everything a converter can export.
    V4,
}

impl FormatSet {
    pub fn formats(self) -> &'static [ScoreFormat] {
        use ScoreFormat::*;
        match self {
            FormatSet::V1 => &[Mid, Mp3],
            FormatSet::V2 => &[Mid, Mp3, Mxl],
            FormatSet::V3 => &[Mid, Mp3, Mxl, Pdf],
            FormatSet::V4 => &[Pdf, Mscz, Mxl, Mid, Mp3, Flac, Ogg],
        }
    }

    pub fn contains(self, format: ScoreFormat) -> bool {
        self.formats().contains(&format)
    }

    /// Fail with [`ScoreError::UnsupportedFormat`] unless `format` is in this set.
    pub fn check(self, format: ScoreFormat) -> Result<ScoreFormat, ScoreError> {
        if self.contains(format) {
            Ok(format)
        } else {
            Err(self.unsupported(format.extension()))
        }
    }

    /// Parse a selector string (case-insensitive, `midi` is an alias of `mid`).
    pub fn parse(self, s: &str) -> Result<ScoreFormat, ScoreError> {
        let normalised = s.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match normalised.as_str() {
            "pdf" => ScoreFormat::Pdf,
            "mscz" => ScoreFormat::Mscz,
            "mxl" => ScoreFormat::Mxl,
            "mid" | "midi" => ScoreFormat::Mid,
            "mp3" => ScoreFormat::Mp3,
            "flac" => ScoreFormat::Flac,
            "ogg" => ScoreFormat::Ogg,
            _ => return Err(self.unsupported(s)),
        };
        self.check(format)
    }

    fn unsupported(self, format: &str) -> ScoreError {
        ScoreError::UnsupportedFormat {
            format: format.to_string(),
            supported: self
                .formats()
                .iter()
                .map(|f| f.extension())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
