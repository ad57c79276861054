//! Minimal start-tag scanner for score pages.
//!
//! The pipeline never needs a DOM, only two lookups:
//!
//! * attribute-keyed element lookup (`<meta property="og:title" content=…>`),
//! * enumeration of elements carrying a given attribute (the embedded data
//!   block).
//!
//! Both are served by scanning start tags with a regex that understands
//! quoted attribute values, so a `>` inside a quoted JSON payload does not
//! end the tag early.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_START_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<([a-zA-Z][a-zA-Z0-9-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*/?>"#,
    )
    .unwrap()
});

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

static RE_NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").unwrap());

/// One start tag with its attributes, values already entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Tag {
    /// Attribute lookup, case-insensitive on the key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// `true` when the whitespace-separated `class` list contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().any(|t| t == class))
            .unwrap_or(false)
    }
}

/// All start tags of a page, in document order.
#[derive(Debug, Clone, Default)]
pub struct HtmlTags {
    tags: Vec<Tag>,
}

impl HtmlTags {
    pub fn parse(html: &str) -> Self {
        let tags = RE_START_TAG
            .captures_iter(html)
            .map(|caps| Tag {
                name: caps[1].to_ascii_lowercase(),
                attrs: parse_attrs(caps.get(2).map(|m| m.as_str()).unwrap_or("")),
            })
            .collect();
        Self { tags }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// `content` of the first `<meta>` whose `property` or `name` equals `key`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .filter(|t| t.name == "meta")
            .find(|t| t.attr("property") == Some(key) || t.attr("name") == Some(key))
            .and_then(|t| t.attr("content"))
    }

    /// Every tag that carries `attr`, optionally restricted to a class.
    pub fn with_attr<'a>(
        &'a self,
        attr: &'a str,
        class: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.attr(attr).is_some())
            .filter(move |t| class.map_or(true, |c| t.has_class(c)))
    }
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    RE_ATTR
        .captures_iter(raw)
        .map(|caps| {
            let key = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| unescape_entities(m.as_str()))
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

/// Decode the HTML entities that occur in attribute values.
pub fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let numeric = RE_NUMERIC_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    // &amp; last so "&amp;quot;" decodes to "&quot;", not '"'.
    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
