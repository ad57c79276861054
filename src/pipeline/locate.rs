//! Locator: turn a user-supplied score URL into a [`ScoreIdentity`].
//!
//! The numeric score id is the URL's trailing path segment. The owner id
//! is not always visible in the URL (`/classicman/scores/4766391` uses a
//! vanity name), so it is filled in later from the fetched page's `og:url`
//! via [`ScoreIdentity::with_owner`].

use crate::config::SiteProfile;
use crate::error::ScoreError;
use serde::Serialize;
use tracing::debug;

/// Resolved identity of one score. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreIdentity {
    reference: String,
    score_id: u64,
    owner_id: Option<u64>,
}

impl ScoreIdentity {
    /// The URL the identity was resolved from.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn score_id(&self) -> u64 {
        self.score_id
    }

    pub fn owner_id(&self) -> Option<u64> {
        self.owner_id
    }

    /// Fill in the owner from the page's canonical URL.
    ///
    /// Returns the identity unchanged when `page_url` does not match the
    /// site's `/user/<owner>/scores/<id>` shape or names a different score.
    pub fn with_owner(self, page_url: &str, site: &SiteProfile) -> Self {
        let Some(caps) = site.page_url_pattern.captures(page_url.trim()) else {
            return self;
        };
        let owner = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
        let id = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
        if id != Some(self.score_id) {
            debug!(
                "og:url names score {:?}, expected {}; owner left unset",
                id, self.score_id
            );
            return self;
        }
        Self {
            owner_id: owner,
            ..self
        }
    }
}

/// Resolve a score URL against `site`.
///
/// # Errors
/// [`ScoreError::InvalidReference`] when the host marker is missing or the
/// trailing path segment is not an integer.
pub fn resolve(url_or_id: &str, site: &SiteProfile) -> Result<ScoreIdentity, ScoreError> {
    let input = url_or_id.trim();
    let invalid = |reason: &str| ScoreError::InvalidReference {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if !input.contains(&site.host_marker) {
        return Err(invalid(&format!("not a {} URL", site.host_marker)));
    }

    let score_id = trailing_segment(input)
        .ok_or_else(|| invalid("missing score id"))?
        .parse::<u64>()
        .map_err(|_| invalid("trailing path segment is not a numeric score id"))?;

    let identity = ScoreIdentity {
        reference: input.to_string(),
        score_id,
        owner_id: None,
    }
    .with_owner(input, site);

    debug!(
        "Resolved score {} (owner {:?})",
        identity.score_id, identity.owner_id
    );
    Ok(identity)
}

/// Last non-empty path segment, ignoring query string and fragment.
fn trailing_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
