//! Content-addressed resolution through an IPFS gateway.
//!
//! The dataset is published under a fixed IPNS key. Archives are sharded by
//! `score_id % 20` and stored as `<shard>/<score_id>.mscz`:
//!
//! 1. `dag/resolve` on the IPNS key yields the current root CID.
//! 2. `block/stat` on `/ipfs/<root>/<shard>/<id>.mscz` yields the archive CID,
//!    or a "no link named" message when the score is absent.
//! 3. `/ipfs/<cid>` serves the archive itself.

use crate::error::ScoreError;
use crate::pipeline::page::get_ok;
use crate::transport::Transport;
use serde::Deserialize;
use tracing::{debug, info};

/// IPNS key of the published score dataset.
pub const DATASET_KEY: &str = "QmSdXtvzC8v8iTTZuj5cVmiugnzbR1QATYRcGix4bBsioP";

/// Number of shard directories under the dataset root.
pub const SHARD_RADIX: u64 = 20;

#[derive(Debug, Deserialize)]
struct DagResolve {
    #[serde(rename = "Cid")]
    cid: Option<CidLink>,
}

#[derive(Debug, Deserialize)]
struct CidLink {
    #[serde(rename = "/")]
    link: String,
}

#[derive(Debug, Deserialize)]
struct BlockStat {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Dataset path of one score's archive, relative to the root CID.
pub fn archive_path(root: &str, score_id: u64) -> String {
    format!("/ipfs/{root}/{}/{score_id}.mscz", score_id % SHARD_RADIX)
}

/// Resolve the dataset root CID.
pub async fn resolve_root(mirror: &str, transport: &dyn Transport) -> Result<String, ScoreError> {
    let url = format!("{mirror}/api/v0/dag/resolve?arg=/ipns/{DATASET_KEY}");
    let body = get_ok(transport, &url).await?;
    let parsed: DagResolve = serde_json::from_slice(&body)
        .map_err(|e| ScoreError::parse("dataset root response", e.to_string()))?;
    let root = parsed
        .cid
        .map(|c| c.link)
        .ok_or_else(|| ScoreError::parse("dataset root response", "missing Cid"))?;
    debug!("Dataset root is {}", root);
    Ok(root)
}

/// Resolve the archive CID of `score_id` under `root`.
///
/// The gateway answers a missing link with a non-success status and a JSON
/// `Message`, so the body is inspected before the status.
pub async fn resolve_archive(
    mirror: &str,
    root: &str,
    score_id: u64,
    transport: &dyn Transport,
) -> Result<String, ScoreError> {
    let url = format!(
        "{mirror}/api/v0/block/stat?arg={}",
        archive_path(root, score_id)
    );
    let response = transport
        .get(&url)
        .await
        .map_err(|e| e.into_score_error(&url))?;

    let stat: Option<BlockStat> = serde_json::from_slice(&response.body).ok();
    if let Some(BlockStat {
        message: Some(message),
        ..
    }) = &stat
    {
        if message.contains("no link named") {
            return Err(ScoreError::NotInDataset { score_id });
        }
    }
    if !response.is_success() {
        return Err(ScoreError::status(&url, response.status));
    }

    match stat {
        Some(BlockStat { key: Some(key), .. }) => Ok(key),
        Some(BlockStat {
            message: Some(message),
            ..
        }) => Err(ScoreError::parse("dataset block response", message)),
        _ => Err(ScoreError::parse("dataset block response", "missing Key")),
    }
}

/// Resolve and download the `.mscz` archive of `score_id`.
pub async fn fetch_archive(
    mirror: &str,
    score_id: u64,
    transport: &dyn Transport,
) -> Result<Vec<u8>, ScoreError> {
    info!("Resolving score {} through {}", score_id, mirror);
    let root = resolve_root(mirror, transport).await?;
    let cid = resolve_archive(mirror, &root, score_id, transport).await?;
    let url = format!("{mirror}/ipfs/{cid}");
    info!("Downloading archive {}", cid);
    get_ok(transport, &url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, MemoryTransport};

    const MIRROR: &str = "https://gw.example";

    fn with_root(t: MemoryTransport) -> MemoryTransport {
        t.with_body(
            format!("{MIRROR}/api/v0/dag/resolve?arg=/ipns/{DATASET_KEY}"),
            r#"{"Cid":{"/":"bafyroot"},"RemPath":""}"#,
        )
    }

    #[test]
    fn shard_path() {
        assert_eq!(archive_path("R", 4766391), "/ipfs/R/11/4766391.mscz");
        assert_eq!(archive_path("R", 40), "/ipfs/R/0/40.mscz");
    }

    #[tokio::test]
    async fn resolves_and_downloads() {
        let t = with_root(MemoryTransport::new())
            .with_body(
                format!("{MIRROR}/api/v0/block/stat?arg=/ipfs/bafyroot/11/4766391.mscz"),
                r#"{"Key":"bafyscore","Size":123}"#,
            )
            .with_body(format!("{MIRROR}/ipfs/bafyscore"), "PK\x03\x04");
        let bytes = fetch_archive(MIRROR, 4766391, &t).await.unwrap();
        assert_eq!(bytes, b"PK\x03\x04");
        assert_eq!(t.requests().len(), 3);
    }

    #[tokio::test]
    async fn missing_link_is_not_in_dataset() {
        let t = with_root(MemoryTransport::new()).with_response(
            format!("{MIRROR}/api/v0/block/stat?arg=/ipfs/bafyroot/2/2.mscz"),
            HttpResponse {
                status: 500,
                body: br#"{"Message":"no link named \"2.mscz\" under bafy","Code":0}"#.to_vec(),
            },
        );
        let err = fetch_archive(MIRROR, 2, &t).await.unwrap_err();
        assert!(matches!(err, ScoreError::NotInDataset { score_id: 2 }));
    }

    #[tokio::test]
    async fn missing_cid_is_parse_error() {
        let t = MemoryTransport::new().with_body(
            format!("{MIRROR}/api/v0/dag/resolve?arg=/ipns/{DATASET_KEY}"),
            "{}",
        );
        let err = resolve_root(MIRROR, &t).await.unwrap_err();
        assert!(matches!(err, ScoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn gateway_error_without_message_is_network() {
        let t = with_root(MemoryTransport::new())
            .with_status(format!("{MIRROR}/api/v0/block/stat?arg=/ipfs/bafyroot/3/3.mscz"), 502);
        let err = fetch_archive(MIRROR, 3, &t).await.unwrap_err();
        assert!(matches!(err, ScoreError::Network { status: Some(502), .. }));
    }
}
