//! PageFetcher: one GET of the canonical score page.

use crate::config::SiteProfile;
use crate::document::{PageMetadata, ScoreDocument};
use crate::error::ScoreError;
use crate::pipeline::locate::ScoreIdentity;
use crate::transport::{HttpResponse, Transport};
use tracing::info;

/// GET `url`, mapping every failure and non-2xx status to a typed error.
async fn get_success(transport: &dyn Transport, url: &str) -> Result<HttpResponse, ScoreError> {
    let response = transport
        .get(url)
        .await
        .map_err(|e| e.into_score_error(url))?;
    if !response.is_success() {
        return Err(ScoreError::status(url, response.status));
    }
    Ok(response)
}

/// GET `url` and return the body.
pub(crate) async fn get_ok(transport: &dyn Transport, url: &str) -> Result<Vec<u8>, ScoreError> {
    Ok(get_success(transport, url).await?.body)
}

/// GET `url` and return the body as lossy UTF-8.
pub(crate) async fn get_text(transport: &dyn Transport, url: &str) -> Result<String, ScoreError> {
    Ok(get_success(transport, url).await?.text())
}

async fn fetch_page_text(
    identity: &ScoreIdentity,
    transport: &dyn Transport,
) -> Result<String, ScoreError> {
    let url = identity.reference();
    info!("Downloading score page {}", url);
    get_text(transport, url).await
}

/// Fetch and parse the score page.
///
/// Returns the document together with the identity, now carrying the owner
/// id when the page's `og:url` reveals it.
pub async fn fetch_document(
    identity: ScoreIdentity,
    transport: &dyn Transport,
    site: &SiteProfile,
) -> Result<(ScoreIdentity, ScoreDocument), ScoreError> {
    let raw = fetch_page_text(&identity, transport).await?;
    info!("Parsing score page");
    let document = ScoreDocument::parse(raw, site)?;
    let identity = match document.metadata.url.as_deref() {
        Some(url) => identity.with_owner(url, site),
        None => identity,
    };
    Ok((identity, document))
}

/// Fetch the page for its metadata only (dataset resolution).
pub async fn fetch_metadata(
    identity: ScoreIdentity,
    transport: &dyn Transport,
    site: &SiteProfile,
) -> Result<(ScoreIdentity, PageMetadata), ScoreError> {
    let raw = fetch_page_text(&identity, transport).await?;
    let metadata = ScoreDocument::parse_metadata(&raw)?;
    let identity = match metadata.url.as_deref() {
        Some(url) => identity.with_owner(url, site),
        None => identity,
    };
    Ok((identity, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::locate;
    use crate::transport::MemoryTransport;

    const URL: &str = "https://musescore.com/classicman/scores/4766391";

    fn body() -> String {
        r#"<meta property="og:title" content="Etude">
<meta property="og:url" content="https://musescore.com/user/7/scores/4766391">
<div class="js-store" data-content="https://musescore.com/static/musescore/scoredata/gen/a/b/score_0.svg"></div>"#
            .to_string()
    }

    #[tokio::test]
    async fn fetch_fills_owner_from_og_url() {
        let site = SiteProfile::default();
        let t = MemoryTransport::new().with_body(URL, body());
        let identity = locate::resolve(URL, &site).unwrap();
        let (identity, doc) = fetch_document(identity, &t, &site).await.unwrap();
        assert_eq!(identity.owner_id(), Some(7));
        assert_eq!(doc.title, "Etude");
        assert_eq!(t.requests().len(), 1);
    }

    #[tokio::test]
    async fn connection_failure_is_network_error() {
        let site = SiteProfile::default();
        let t = MemoryTransport::new()
            .with_failure(URL, TransportError::Connect("refused".into()));
        let identity = locate::resolve(URL, &site).unwrap();
        let err = fetch_document(identity, &t, &site).await.unwrap_err();
        assert!(matches!(err, ScoreError::Network { status: None, .. }));
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let site = SiteProfile::default();
        let t = MemoryTransport::new().with_status(URL, 503);
        let identity = locate::resolve(URL, &site).unwrap();
        let err = fetch_document(identity, &t, &site).await.unwrap_err();
        assert!(matches!(err, ScoreError::Network { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn metadata_only_tolerates_missing_block() {
        let site = SiteProfile::default();
        let t = MemoryTransport::new().with_body(URL, r#"<meta property="og:title" content="X">"#);
        let identity = locate::resolve(URL, &site).unwrap();
        let (_, meta) = fetch_metadata(identity, &t, &site).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("X"));
    }
}
