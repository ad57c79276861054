//! Page-count discovery for the paginated format.
//!
//! Runs once per document, before any page fetch is issued, and records the
//! result in [`ScoreDocument::page_count`].

use crate::config::{PaginationStrategy, SiteProfile};
use crate::document::{PageCount, ScoreDocument};
use crate::error::ScoreError;
use crate::pipeline::page::get_text;
use crate::pipeline::resolve::page_url;
use crate::transport::Transport;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Probing gives up after this many consecutive successful pages.
pub const MAX_PROBED_PAGES: usize = 1000;

static RE_JSONP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*jsonp\d+\((.*)\)\s*;?\s*$").unwrap());

#[derive(Debug, Deserialize)]
struct SpaceIndex {
    space: Vec<SpaceEntry>,
}

#[derive(Debug, Deserialize)]
struct SpaceEntry {
    page: serde_json::Value,
}

/// Compute and store the page count unless it is already known.
pub async fn ensure_page_count(
    document: &mut ScoreDocument,
    strategy: PaginationStrategy,
    transport: &dyn Transport,
    site: &SiteProfile,
) -> Result<usize, ScoreError> {
    if let PageCount::Computed(n) = document.page_count {
        return Ok(n);
    }
    let count = match strategy {
        PaginationStrategy::IndexDocument => {
            count_pages_from_index(&document.base_url, transport, site).await?
        }
        PaginationStrategy::Probe => {
            probe_page_count(&document.base_url, transport, MAX_PROBED_PAGES).await?
        }
    };
    info!("Score has {} page(s)", count);
    document.page_count = PageCount::Computed(count);
    Ok(count)
}

/// One GET of the jsonp page index; counts distinct `space[].page` values.
pub async fn count_pages_from_index(
    base_url: &str,
    transport: &dyn Transport,
    site: &SiteProfile,
) -> Result<usize, ScoreError> {
    let url = format!("{base_url}/{}", site.index_document);
    let text = get_text(transport, &url).await?;
    count_distinct_pages(&text)
}

/// Unwrap a `jsonp<digits>(…)` payload and count distinct page numbers.
pub fn count_distinct_pages(jsonp: &str) -> Result<usize, ScoreError> {
    let inner = RE_JSONP
        .captures(jsonp)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ScoreError::parse("page index", "not a jsonp<N>(…) payload"))?
        .as_str();

    let index: SpaceIndex = serde_json::from_str(inner)
        .map_err(|e| ScoreError::parse("page index", e.to_string()))?;

    let pages: HashSet<String> = index.space.iter().map(|e| e.page.to_string()).collect();
    debug!(
        "Page index lists {} entries over {} distinct pages",
        index.space.len(),
        pages.len()
    );
    Ok(pages.len())
}

/// GET `score_0.svg`, `score_1.svg`, … until the first 404.
///
/// Any other non-success status, or a transport failure, aborts the probe.
/// A host that keeps answering past `max_pages` is a parse error.
pub async fn probe_page_count(
    base_url: &str,
    transport: &dyn Transport,
    max_pages: usize,
) -> Result<usize, ScoreError> {
    let mut count = 0;
    loop {
        if count >= max_pages {
            return Err(ScoreError::parse(
                "page probe",
                format!("no 404 within {max_pages} pages under {base_url}"),
            ));
        }
        let url = page_url(base_url, count);
        let response = transport
            .get(&url)
            .await
            .map_err(|e| e.into_score_error(&url))?;
        if response.is_not_found() {
            debug!("Probe stopped at page {} (404)", count);
            return Ok(count);
        }
        if !response.is_success() {
            return Err(ScoreError::status(&url, response.status));
        }
        count += 1;
    }
}
