//! ArtifactFetcher: retrieve resolved addresses.
//!
//! A single address is one GET. A paged address is one GET per page,
//! sequential or bounded-parallel, with each page written to
//! `<scratch>/<index>.svg`. Parallel completion order is arbitrary; pages
//! are re-sorted by index before assembly, so both modes hand the
//! assembler identical input.
//!
//! The scratch directory is a [`tempfile::TempDir`] owned by
//! [`fetch_artifact`]. Page futures are polled in place rather than
//! spawned, so when one fails the remaining ones are dropped before the
//! directory is, and it is removed on every exit path.

use crate::config::FetchMode;
use crate::error::ScoreError;
use crate::format::ScoreFormat;
use crate::pipeline::assemble::PageAssembler;
use crate::pipeline::page::get_ok;
use crate::pipeline::resolve::ArtifactAddress;
use crate::progress::ProgressCallback;
use crate::transport::Transport;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Retrieved bytes of one artifact, already assembled when paginated.
#[derive(Debug, Clone)]
pub struct ArtifactPayload {
    pub format: ScoreFormat,
    pub bytes: Vec<u8>,
    /// Number of GETs that produced this payload.
    pub pages: usize,
}

/// One page stored in scratch space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPage {
    /// 0-based page index.
    pub index: usize,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Retrieve `address` and return the artifact bytes.
///
/// Paged addresses are fetched per `mode` and handed to `assembler`.
pub async fn fetch_artifact(
    address: &ArtifactAddress,
    format: ScoreFormat,
    mode: FetchMode,
    transport: &dyn Transport,
    assembler: &dyn PageAssembler,
    progress: Option<&ProgressCallback>,
) -> Result<ArtifactPayload, ScoreError> {
    match address {
        ArtifactAddress::Single(url) => {
            if let Some(cb) = progress {
                cb.on_download_start(1);
                cb.on_page_start(1, 1);
            }
            info!("Downloading {} from {}", format, url);
            let bytes = match get_ok(transport, url).await {
                Ok(b) => b,
                Err(e) => {
                    if let Some(cb) = progress {
                        cb.on_page_error(1, 1, &e.to_string());
                    }
                    return Err(e);
                }
            };
            if let Some(cb) = progress {
                cb.on_page_complete(1, 1, bytes.len());
                cb.on_download_complete(1, bytes.len());
            }
            Ok(ArtifactPayload {
                format,
                bytes,
                pages: 1,
            })
        }
        ArtifactAddress::Paged(urls) => {
            let scratch = tempfile::Builder::new()
                .prefix("scoredl-pages-")
                .tempdir()
                .map_err(|e| ScoreError::Io {
                    path: std::env::temp_dir(),
                    source: e,
                })?;

            let pages = fetch_pages(urls, mode, scratch.path(), transport, progress).await?;
            let bytes = assembler.assemble(&pages).await?;
            // `scratch` drops here, after assembly has read every page.
            Ok(ArtifactPayload {
                format,
                bytes,
                pages: pages.len(),
            })
        }
    }
}

/// Fetch every page into `scratch`, returning them sorted by index.
pub async fn fetch_pages(
    urls: &[String],
    mode: FetchMode,
    scratch: &Path,
    transport: &dyn Transport,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<ScratchPage>, ScoreError> {
    let total = urls.len();
    if let Some(cb) = progress {
        cb.on_download_start(total);
    }
    info!("Fetching {} page(s), {:?}", total, mode);

    let mut pages = match mode {
        FetchMode::Sequential => {
            let mut pages = Vec::with_capacity(total);
            for (index, url) in urls.iter().enumerate() {
                pages.push(fetch_one_page(index, url, total, scratch, transport, progress).await?);
            }
            pages
        }
        FetchMode::Parallel { concurrency } => {
            stream::iter(urls.iter().enumerate())
                .map(|(index, url)| fetch_one_page(index, url, total, scratch, transport, progress))
                .buffer_unordered(concurrency.max(1))
                .try_collect::<Vec<_>>()
                .await?
        }
    };

    pages.sort_by_key(|p| p.index);

    let total_bytes: usize = pages.iter().map(|p| p.bytes).sum();
    if let Some(cb) = progress {
        cb.on_download_complete(total, total_bytes);
    }
    Ok(pages)
}

async fn fetch_one_page(
    index: usize,
    url: &str,
    total: usize,
    scratch: &Path,
    transport: &dyn Transport,
    progress: Option<&ProgressCallback>,
) -> Result<ScratchPage, ScoreError> {
    let page_num = index + 1;
    if let Some(cb) = progress {
        cb.on_page_start(page_num, total);
    }

    let result: Result<ScratchPage, ScoreError> = async {
        let body = get_ok(transport, url).await?;
        let path = scratch.join(format!("{index}.svg"));
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| ScoreError::Io {
                path: path.clone(),
                source: e,
            })?;
        debug!("Page {} → {} ({} bytes)", page_num, path.display(), body.len());
        Ok(ScratchPage {
            index,
            path,
            bytes: body.len(),
        })
    }
    .await;

    if let Some(cb) = progress {
        match &result {
            Ok(page) => cb.on_page_complete(page_num, total, page.bytes),
            Err(e) => cb.on_page_error(page_num, total, &e.to_string()),
        }
    }
    result
}
