//! Local score archives (`.mscz`).
//!
//! An archive is a zip holding one `.mscx` score document plus assets. The
//! score path is listed in `META-INF/container.xml`; metadata lives in
//! `<metaTag name="…">` elements of the score document. Nothing else about
//! the score format is interpreted here.

use crate::document::PageMetadata;
use crate::error::ScoreError;
use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Code page 437, bytes 0x80..=0xFF.
const CP437_HIGH: &str = "ÇüéâäàåçêëèïîìÄÅÉæÆôöòûùÿÖÜ¢£¥₧ƒáíóúñÑªº¿⌐¬½¼¡«»░▒▓│┤╡╢╖╕╣║╗╝╜╛┐└┴┬├─┼╞╟╚╔╩╦╠═╬╧╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀αßΓπΣσµτΦΘΩδ∞φε∩≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{a0}";

/// Metadata tags of a score document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreMetadata {
    pub arranger: String,
    pub composer: String,
    pub copyright: String,
    /// `None` when absent or not `YYYY-MM-DD`.
    pub creation_date: Option<NaiveDate>,
    pub lyricist: String,
    pub movement_number: String,
    pub movement_title: String,
    /// OS the score was created on.
    pub platform: String,
    pub poet: String,
    /// URL of the score when it was hosted online.
    pub source: String,
    pub translator: String,
    pub work_number: String,
    pub work_title: String,
}

impl ScoreMetadata {
    /// Page meta properties that override archive fields.
    pub const PAGE_OVERRIDES: [(&'static str, &'static str); 4] = [
        ("arranger", "musescore:author"),
        ("composer", "musescore:composer"),
        ("work_title", "og:title"),
        ("source", "og:url"),
    ];

    /// Dynamic lookup. Accepts `workTitle` as well as `work_title`.
    ///
    /// `creation_date` is rendered as `YYYY-MM-DD`.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match normalize_tag(name).as_str() {
            "arranger" => &self.arranger,
            "composer" => &self.composer,
            "copyright" => &self.copyright,
            "creation_date" => {
                return self.creation_date.map(|d| d.format("%Y-%m-%d").to_string())
            }
            "lyricist" => &self.lyricist,
            "movement_number" => &self.movement_number,
            "movement_title" => &self.movement_title,
            "platform" => &self.platform,
            "poet" => &self.poet,
            "source" => &self.source,
            "translator" => &self.translator,
            "work_number" => &self.work_number,
            "work_title" => &self.work_title,
            _ => return None,
        };
        Some(value.clone())
    }

    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "arranger" => &mut self.arranger,
            "composer" => &mut self.composer,
            "copyright" => &mut self.copyright,
            "creation_date" => {
                self.creation_date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok();
                return;
            }
            "lyricist" => &mut self.lyricist,
            "movement_number" => &mut self.movement_number,
            "movement_title" => &mut self.movement_title,
            "platform" => &mut self.platform,
            "poet" => &mut self.poet,
            "source" => &mut self.source,
            "translator" => &mut self.translator,
            "work_number" => &mut self.work_number,
            "work_title" => &mut self.work_title,
            other => {
                debug!("Ignoring unknown metaTag '{}'", other);
                return;
            }
        };
        *slot = value;
    }

    /// Overwrite arranger, composer, title and source from the live page.
    ///
    /// A field the page lacks keeps its archive value.
    pub fn update_from_page(&mut self, page: &PageMetadata) {
        for (field, property) in Self::PAGE_OVERRIDES {
            match page.get(property) {
                Some(value) => self.set(field, value.to_string()),
                None => warn!(
                    "Page has no '{}' meta field; keeping archive {}",
                    property, field
                ),
            }
        }
    }
}

/// `workTitle` → `work_title`.
fn normalize_tag(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A score archive held in memory.
#[derive(Debug, Clone)]
pub struct MsczScore {
    bytes: Vec<u8>,
    mscx_path: String,
    pub metadata: ScoreMetadata,
}

impl MsczScore {
    /// Open an archive and read its metadata.
    ///
    /// # Errors
    /// [`ScoreError::Parse`] when the bytes are not a zip, the container
    /// manifest is missing, or the score document it names is absent.
    /// Unreadable metadata is not an error; it yields the default.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ScoreError> {
        let (mscx_path, mscx) = {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))
                .map_err(|e| ScoreError::parse("score archive", e.to_string()))?;

            let container = read_entry(&mut archive, CONTAINER_PATH)?;
            let declared = rootfile_path(&container)?;

            let names: Vec<String> = archive.file_names().map(str::to_string).collect();
            let mscx_path = if names.contains(&declared) {
                declared
            } else {
                // Non-UTF-8-flagged entries come back CP437-decoded.
                let mangled = decode_cp437(declared.as_bytes());
                if !names.contains(&mangled) {
                    return Err(ScoreError::parse(
                        "score archive",
                        format!("'{}' listed in {} is missing", declared, CONTAINER_PATH),
                    ));
                }
                debug!("Using CP437-decoded entry name '{}'", mangled);
                mangled
            };
            let mscx = read_entry(&mut archive, &mscx_path)?;
            (mscx_path, mscx)
        };

        let metadata = match parse_meta_tags(&mscx) {
            Ok(m) => m,
            Err(e) => {
                warn!("Score metadata unreadable ({}); using defaults", e);
                ScoreMetadata::default()
            }
        };

        Ok(Self {
            bytes,
            mscx_path,
            metadata,
        })
    }

    /// Read a local `.mscz` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScoreError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ScoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_bytes(bytes)
    }

    /// The raw archive.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Path of the score document inside the archive.
    pub fn mscx_path(&self) -> &str {
        &self.mscx_path
    }

    /// File name of the score document without directory or `.mscx`.
    pub fn file_stem(&self) -> &str {
        let name = self.mscx_path.rsplit('/').next().unwrap_or(&self.mscx_path);
        name.strip_suffix(".mscx").unwrap_or(name)
    }
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, ScoreError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ScoreError::parse("score archive", format!("{name}: {e}")))?;
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| ScoreError::parse("score archive", format!("{name}: {e}")))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `full-path` of the first `<rootfile>` in the container manifest.
fn rootfile_path(container: &str) -> Result<String, ScoreError> {
    let mut reader = Reader::from_str(container);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attr_value(&e, "full-path") {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::parse(CONTAINER_PATH, e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Err(ScoreError::parse(CONTAINER_PATH, "no rootfile full-path"))
}

fn attr_value(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Collect `<metaTag name="…">text</metaTag>` into [`ScoreMetadata`].
fn parse_meta_tags(mscx: &str) -> Result<ScoreMetadata, quick_xml::Error> {
    let mut reader = Reader::from_str(mscx);
    let mut buf = Vec::new();
    let mut metadata = ScoreMetadata::default();
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"metaTag" => {
                current = attr_value(&e, "name").map(|n| (normalize_tag(&n), String::new()));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"metaTag" => {
                if let Some(name) = attr_value(&e, "name") {
                    metadata.set(&normalize_tag(&name), String::new());
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&t.unescape()?);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"metaTag" => {
                if let Some((name, value)) = current.take() {
                    metadata.set(&name, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(metadata)
}

/// Decode bytes as code page 437.
fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x00..=0x7f => b as char,
            _ => CP437_HIGH
                .chars()
                .nth((b - 0x80) as usize)
                .unwrap_or(char::REPLACEMENT_CHARACTER),
        })
        .collect()
}
