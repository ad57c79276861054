//! File-name sanitisation for titles.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Map a title to a filesystem-safe stem.
///
/// Every non-alphanumeric character becomes `_`, runs of `_` collapse to
/// one, and leading or trailing `_` are stripped. Total and idempotent; the
/// result may be empty.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    RE_UNDERSCORES
        .replace_all(&replaced, "_")
        .trim_matches('_')
        .to_string()
}
