//! Download entry points.
//!
//! [`download`] runs the whole pipeline and returns the artifact in memory.
//! [`download_to_file`] adds an atomic write, so a failed run never leaves a
//! partial file at the destination. [`inspect`] stops after the page fetch.

use crate::config::{FetchConfig, Resolution};
use crate::converter::{export_bytes, Converter};
use crate::error::ScoreError;
use crate::format::ScoreFormat;
use crate::mscz::MsczScore;
use crate::output::{DownloadOutput, DownloadStats, ScoreSummary};
use crate::pipeline::assemble::PdfAssembler;
use crate::pipeline::fetch::fetch_artifact;
use crate::pipeline::locate::{self, ScoreIdentity};
use crate::pipeline::{dataset, page, pagination, resolve};
use crate::transport::{HttpTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Download one score in the configured format.
///
/// # Arguments
/// * `input`:  score page URL
/// * `config`: download configuration
///
/// # Errors
/// The first failing stage's [`ScoreError`]. Nothing is retried.
pub async fn download(
    input: impl AsRef<str>,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting download: {} as {}", input, config.format);

    config.format_set().check(config.format)?;
    let transport = resolve_transport(config)?;

    // ── Step 1: Locate ───────────────────────────────────────────────────
    let identity = locate::resolve(input, &config.site)?;

    let mut output = match config.resolution {
        Resolution::Page => download_from_page(identity, transport.as_ref(), config).await?,
        Resolution::Dataset => {
            download_from_dataset(identity, transport.as_ref(), config).await?
        }
    };

    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Download complete: {} bytes of {} in {}ms",
        output.stats.bytes, output.format, output.stats.total_duration_ms
    );
    Ok(output)
}

async fn download_from_page(
    identity: ScoreIdentity,
    transport: &dyn Transport,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    // ── Step 2: Fetch and parse the page ─────────────────────────────────
    let (identity, mut document) = page::fetch_document(identity, transport, &config.site).await?;

    // ── Step 3: Page count, before any page fetch ────────────────────────
    if config.format.is_paginated() {
        pagination::ensure_page_count(&mut document, config.pagination, transport, &config.site)
            .await?;
    }

    // ── Step 4: Resolve ──────────────────────────────────────────────────
    let address = resolve::resolve_address(
        &document,
        config.format,
        config.format_set(),
        config.mxl_strategy,
    )?;

    // ── Step 5: Fetch (and assemble) ─────────────────────────────────────
    let fetch_start = Instant::now();
    let assembler = PdfAssembler::new(config.dpi);
    let payload = fetch_artifact(
        &address,
        config.format,
        config.fetch_mode,
        transport,
        &assembler,
        config.progress_callback.as_ref(),
    )
    .await?;

    let stats = DownloadStats {
        pages: payload.pages,
        bytes: payload.bytes.len(),
        fetch_duration_ms: fetch_start.elapsed().as_millis() as u64,
        total_duration_ms: 0,
    };

    Ok(DownloadOutput {
        bytes: payload.bytes,
        format: payload.format,
        title: document.title,
        identity: Some(identity),
        resolution: Resolution::Page,
        score_metadata: None,
        mscx_stem: None,
        stats,
    })
}

async fn download_from_dataset(
    identity: ScoreIdentity,
    transport: &dyn Transport,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    // The page is still fetched once, for the title and metadata overrides.
    let (identity, page_meta) = page::fetch_metadata(identity, transport, &config.site).await?;

    let fetch_start = Instant::now();
    if let Some(cb) = &config.progress_callback {
        cb.on_download_start(1);
        cb.on_page_start(1, 1);
    }
    let archive = match dataset::fetch_archive(&config.mirror, identity.score_id(), transport).await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Some(cb) = &config.progress_callback {
                cb.on_page_error(1, 1, &e.to_string());
            }
            return Err(e);
        }
    };
    if let Some(cb) = &config.progress_callback {
        cb.on_page_complete(1, 1, archive.len());
        cb.on_download_complete(1, archive.len());
    }

    let mut score = MsczScore::from_bytes(archive)?;
    if config.update_metadata {
        score.metadata.update_from_page(&page_meta);
    }

    let bytes = export_bytes(&score, config.format, converter(config)).await?;
    let title = if score.metadata.work_title.is_empty() {
        page_meta.title.clone().unwrap_or_default()
    } else {
        score.metadata.work_title.clone()
    };

    let stats = DownloadStats {
        pages: 1,
        bytes: bytes.len(),
        fetch_duration_ms: fetch_start.elapsed().as_millis() as u64,
        total_duration_ms: 0,
    };

    Ok(DownloadOutput {
        bytes,
        format: config.format,
        title,
        identity: Some(identity),
        resolution: Resolution::Dataset,
        mscx_stem: Some(score.file_stem().to_string()),
        score_metadata: Some(score.metadata),
        stats,
    })
}

/// Download a score and write it to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn download_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    let output = download(input, config).await?;
    write_atomic(output_path.as_ref(), &output.bytes).await?;
    Ok(output)
}

/// Synchronous wrapper around [`download`].
///
/// Creates a temporary tokio runtime internally.
pub fn download_sync(
    input: impl AsRef<str>,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScoreError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(download(input, config))
}

/// Fetch the page and report what is known about the score, without
/// downloading any artifact.
///
/// In page mode this includes the base URL and the page count (one extra
/// GET with the index strategy). A page count that cannot be found (404)
/// is reported as unknown rather than failing the whole inspection.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &FetchConfig,
) -> Result<ScoreSummary, ScoreError> {
    let transport = resolve_transport(config)?;
    let transport = transport.as_ref();
    let identity = locate::resolve(input.as_ref(), &config.site)?;
    let formats = config.format_set().formats().to_vec();

    match config.resolution {
        Resolution::Page => {
            let (identity, mut document) =
                page::fetch_document(identity, transport, &config.site).await?;
            let pages = match pagination::ensure_page_count(
                &mut document,
                config.pagination,
                transport,
                &config.site,
            )
            .await
            {
                Ok(n) => Some(n),
                Err(e) if e.is_not_found() => {
                    warn!("Page count unavailable: {}", e);
                    None
                }
                Err(e) => return Err(e),
            };
            Ok(ScoreSummary {
                identity,
                title: document.title,
                resolution: Resolution::Page,
                base_url: Some(document.base_url),
                metadata: document.metadata,
                page_count: pages,
                formats,
            })
        }
        Resolution::Dataset => {
            let (identity, metadata) =
                page::fetch_metadata(identity, transport, &config.site).await?;
            Ok(ScoreSummary {
                identity,
                title: metadata.title.clone().unwrap_or_default(),
                resolution: Resolution::Dataset,
                base_url: None,
                metadata,
                page_count: None,
                formats,
            })
        }
    }
}

/// Export a local `.mscz` archive in the configured format.
pub async fn export_local(
    path: impl AsRef<Path>,
    config: &FetchConfig,
) -> Result<DownloadOutput, ScoreError> {
    let start = Instant::now();
    let path = path.as_ref();
    info!("Exporting local archive {}", path.display());

    let score = MsczScore::from_file(path)?;
    let bytes = export_bytes(&score, config.format, converter(config)).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(DownloadOutput {
        stats: DownloadStats {
            pages: 1,
            bytes: bytes.len(),
            fetch_duration_ms: elapsed,
            total_duration_ms: elapsed,
        },
        bytes,
        format: config.format,
        title: score.metadata.work_title.clone(),
        identity: None,
        resolution: Resolution::Dataset,
        mscx_stem: Some(score.file_stem().to_string()),
        score_metadata: Some(score.metadata),
    })
}

/// `true` when `input` names a local score archive rather than a URL.
pub fn is_local_archive(input: &str) -> bool {
    let path = Path::new(input);
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ScoreFormat::Mscz.extension()))
        && path.is_file()
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScoreError> {
    let write_err = |e: std::io::Error| ScoreError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let tmp_path = path.with_file_name(format!(".{name}.part"));

    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// The injected transport, else a fresh HTTP client.
fn resolve_transport(config: &FetchConfig) -> Result<Arc<dyn Transport>, ScoreError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }
    let http = HttpTransport::new(config.timeout_secs)
        .map_err(|e| ScoreError::Internal(format!("HTTP client: {e}")))?;
    Ok(Arc::new(http))
}

fn converter(config: &FetchConfig) -> Option<&dyn Converter> {
    config.converter.as_deref()
}
