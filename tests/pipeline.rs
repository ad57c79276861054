//! Offline end-to-end tests.
//!
//! Every test drives the public entry points through a [`MemoryTransport`]
//! seeded from `tests/fixtures/score_page.html`, so nothing touches the
//! network. PDF assembly needs libpdfium and is covered by unit tests on the
//! fetch stage instead.

use async_trait::async_trait;
use scoredl::{
    download, download_to_file, inspect, Converter, FetchConfig, FormatSet, HttpResponse,
    MemoryTransport, MxlStrategy, PaginationStrategy, Resolution, ScoreError, ScoreFormat,
    SiteProfile,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAGE_URL: &str = "https://example-host/user/42/scores/12345";
const BASE: &str = "https://cdn.example/gen/ab/cd";
const MIRROR: &str = "https://gw.example";
const MP3: &[u8] = b"ID3...mp3bytes";

fn page_html() -> String {
    std::fs::read_to_string(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/score_page.html"),
    )
    .unwrap()
}

fn site() -> SiteProfile {
    SiteProfile::for_host("example-host")
        .with_base_url_pattern(r"(https?://cdn\.example/gen/[a-zA-Z0-9/]*)/score")
        .unwrap()
}

fn transport() -> MemoryTransport {
    MemoryTransport::new().with_body(PAGE_URL, page_html())
}

fn config(format: ScoreFormat, transport: &MemoryTransport) -> FetchConfig {
    FetchConfig::builder()
        .format(format)
        .site(site())
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap()
}

/// A minimal `.mscz`: container manifest plus one `.mscx` with metadata.
fn mscz() -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut w = zip::ZipWriter::new(&mut cursor);
        let opts = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        w.start_file("META-INF/container.xml", opts).unwrap();
        w.write_all(
            br#"<?xml version="1.0"?><container><rootfiles><rootfile full-path="Gymnopedie.mscx"/></rootfiles></container>"#,
        )
        .unwrap();
        w.start_file("Gymnopedie.mscx", opts).unwrap();
        w.write_all(
            br#"<?xml version="1.0"?><museScore version="3.02"><Score>
<metaTag name="workTitle">Gymnopedie 1</metaTag>
<metaTag name="composer">E. Satie</metaTag>
<metaTag name="creationDate">2019-05-17</metaTag>
</Score></museScore>"#,
        )
        .unwrap();
        w.finish().unwrap();
    }
    cursor.into_inner()
}

fn dataset_transport() -> MemoryTransport {
    transport()
        .with_body(
            format!(
                "{MIRROR}/api/v0/dag/resolve?arg=/ipns/QmSdXtvzC8v8iTTZuj5cVmiugnzbR1QATYRcGix4bBsioP"
            ),
            r#"{"Cid":{"/":"bafyroot"},"RemPath":""}"#,
        )
        .with_body(
            format!("{MIRROR}/api/v0/block/stat?arg=/ipfs/bafyroot/5/12345.mscz"),
            r#"{"Key":"bafyarchive","Size":4096}"#,
        )
        .with_body(format!("{MIRROR}/ipfs/bafyarchive"), mscz())
}

fn dataset_config(format: ScoreFormat, transport: &MemoryTransport) -> FetchConfig {
    FetchConfig::builder()
        .format(format)
        .resolution(Resolution::Dataset)
        .mirror(MIRROR)
        .site(site())
        .transport(Arc::new(transport.clone()))
        .converter(Arc::new(TagConverter))
        .build()
        .unwrap()
}

/// Writes `<format>:<input size>` instead of running MuseScore.
struct TagConverter;

#[async_trait]
impl Converter for TagConverter {
    async fn convert(
        &self,
        input: &Path,
        format: ScoreFormat,
        output: &Path,
    ) -> Result<PathBuf, ScoreError> {
        let size = std::fs::metadata(input).unwrap().len();
        std::fs::write(output, format!("{format}:{size}")).unwrap();
        Ok(output.to_path_buf())
    }
}

// ── Page resolution ──────────────────────────────────────────────────────────

#[tokio::test]
async fn mp3_download_writes_payload_to_file() {
    let t = transport().with_body(format!("{BASE}/score.mp3"), MP3);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mp3");

    let output = download_to_file(PAGE_URL, &path, &config(ScoreFormat::Mp3, &t))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), MP3);
    assert_eq!(output.title, "Gymnopédie No. 1");
    assert_eq!(output.file_name(), "Gymnopédie_No_1.mp3");
    assert_eq!(output.stats.bytes, MP3.len());
    let identity = output.identity.unwrap();
    assert_eq!(identity.score_id(), 12345);
    assert_eq!(identity.owner_id(), Some(42));
    assert_eq!(t.requests(), vec![PAGE_URL.to_string(), format!("{BASE}/score.mp3")]);
}

#[tokio::test]
async fn midi_lives_next_to_mp3() {
    let t = transport().with_body(format!("{BASE}/score.mid"), "MThd");
    let output = download(PAGE_URL, &config(ScoreFormat::Mid, &t))
        .await
        .unwrap();
    assert_eq!(output.bytes, b"MThd");
}

#[tokio::test]
async fn mxl_falls_back_to_mp3_suffix_swap() {
    let t = transport().with_body(format!("{BASE}/score.mxl"), "PK-mxl");
    let mut cfg = config(ScoreFormat::Mxl, &t);
    cfg.mxl_strategy = MxlStrategy::Auto;

    let output = download(PAGE_URL, &cfg).await.unwrap();
    assert_eq!(output.bytes, b"PK-mxl");
    assert_eq!(t.requests().last().unwrap(), &format!("{BASE}/score.mxl"));
}

#[tokio::test]
async fn direct_mxl_without_link_is_parse_error() {
    let t = transport();
    let mut cfg = config(ScoreFormat::Mxl, &t);
    cfg.mxl_strategy = MxlStrategy::Direct;

    let err = download(PAGE_URL, &cfg).await.unwrap_err();
    assert!(matches!(err, ScoreError::Parse { .. }), "got {err:?}");
    assert_eq!(t.requests(), vec![PAGE_URL.to_string()]);
}

#[tokio::test]
async fn format_outside_set_fails_before_any_request() {
    let t = transport();
    let mut cfg = config(ScoreFormat::Mp3, &t);
    cfg.format = ScoreFormat::Pdf;
    cfg.formats = Some(FormatSet::V2);

    let err = download(PAGE_URL, &cfg).await.unwrap_err();
    assert!(matches!(err, ScoreError::UnsupportedFormat { .. }));
    assert!(t.requests().is_empty());
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let t = transport();
    let err = download(PAGE_URL, &config(ScoreFormat::Mp3, &t))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[tokio::test]
async fn foreign_url_is_rejected_without_request() {
    let t = transport();
    let err = download(
        "https://elsewhere.example/user/1/scores/2",
        &config(ScoreFormat::Mp3, &t),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScoreError::InvalidReference { .. }));
    assert!(t.requests().is_empty());
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let t = transport().with_status(format!("{BASE}/score.mp3"), 500);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mp3");

    let err = download_to_file(PAGE_URL, &path, &config(ScoreFormat::Mp3, &t))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoreError::Network { status: Some(500), .. }));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn public_score_url_with_default_site() {
    const URL: &str = "https://musescore.com/user/1/scores/4766391";
    const CDN: &str = "https://musescore.com/static/musescore/scoredata/gen/1/9/3/4766391/ab12";
    let html = r#"<meta property="og:title" content="Gnossienne">
<meta property="og:url" content="https://musescore.com/user/1/scores/4766391">
<div class="js-store" data-content="{&quot;urls&quot;:{&quot;image_path&quot;:&quot;https:\/\/musescore.com\/static\/musescore\/scoredata\/gen\/1\/9\/3\/4766391\/ab12\/score_&quot;}}"></div>"#;
    let t = MemoryTransport::new()
        .with_body(URL, html)
        .with_body(format!("{CDN}/score.mp3"), MP3);
    let cfg = FetchConfig::builder()
        .format(ScoreFormat::Mp3)
        .transport(Arc::new(t.clone()))
        .build()
        .unwrap();

    let output = download(URL, &cfg).await.unwrap();
    assert_eq!(output.bytes, MP3);
    assert_eq!(output.file_name(), "Gnossienne.mp3");
    let identity = output.identity.unwrap();
    assert_eq!(identity.score_id(), 4766391);
    assert_eq!(identity.owner_id(), Some(1));
    assert_eq!(t.requests(), vec![URL.to_string(), format!("{CDN}/score.mp3")]);
}

// ── Inspect and pagination ───────────────────────────────────────────────────

#[tokio::test]
async fn inspect_counts_distinct_index_pages() {
    let t = transport().with_body(
        format!("{BASE}/space.jsonp"),
        r#"jsonp1582734560({"space":[{"page":0,"x":1},{"page":0,"x":2},{"page":1},{"page":2}]});"#,
    );
    let summary = inspect(PAGE_URL, &config(ScoreFormat::Pdf, &t))
        .await
        .unwrap();

    assert_eq!(summary.page_count, Some(3));
    assert_eq!(summary.base_url.as_deref(), Some(BASE));
    assert_eq!(summary.metadata.composer.as_deref(), Some("Erik Satie"));
    assert_eq!(summary.identity.owner_id(), Some(42));
    assert_eq!(t.requests().len(), 2);
}

#[tokio::test]
async fn inspect_probes_until_first_missing_page() {
    let t = transport()
        .with_body(format!("{BASE}/score_0.svg"), "<svg/>")
        .with_body(format!("{BASE}/score_1.svg"), "<svg/>")
        .with_body(format!("{BASE}/score_2.svg"), "<svg/>");
    let mut cfg = config(ScoreFormat::Pdf, &t);
    cfg.pagination = PaginationStrategy::Probe;

    let summary = inspect(PAGE_URL, &cfg).await.unwrap();
    assert_eq!(summary.page_count, Some(3));
    assert_eq!(t.requests().last().unwrap(), &format!("{BASE}/score_3.svg"));
}

#[tokio::test]
async fn inspect_without_page_index_leaves_count_unknown() {
    let summary = inspect(PAGE_URL, &config(ScoreFormat::Pdf, &transport()))
        .await
        .unwrap();
    assert_eq!(summary.page_count, None);
    assert_eq!(summary.base_url.as_deref(), Some(BASE));
    assert_eq!(summary.title, "Gymnopédie No. 1");
}

#[tokio::test]
async fn inspect_index_server_error_still_fails() {
    let t = transport().with_status(format!("{BASE}/space.jsonp"), 502);
    let err = inspect(PAGE_URL, &config(ScoreFormat::Pdf, &t))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoreError::Network { status: Some(502), .. }));
}

#[tokio::test]
async fn summary_serialises_to_json() {
    let t = transport().with_body(format!("{BASE}/space.jsonp"), r#"jsonp1({"space":[{"page":0}]})"#);
    let summary = inspect(PAGE_URL, &config(ScoreFormat::Pdf, &t))
        .await
        .unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["title"], "Gymnopédie No. 1");
    assert_eq!(json["page_count"], 1);
}

// ── Dataset resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn dataset_mscz_is_returned_untouched() {
    let t = dataset_transport();
    let output = download(PAGE_URL, &dataset_config(ScoreFormat::Mscz, &t))
        .await
        .unwrap();

    assert_eq!(output.bytes, mscz());
    assert_eq!(output.resolution, Resolution::Dataset);
    // The page title overrides the archive's own.
    assert_eq!(output.title, "Gymnopédie No. 1");
    let meta = output.score_metadata.unwrap();
    assert_eq!(meta.composer, "Erik Satie");
    assert_eq!(meta.arranger, "satie-fan");
    assert_eq!(meta.source, PAGE_URL);
    assert_eq!(meta.creation_date.map(|d| d.to_string()).as_deref(), Some("2019-05-17"));
}

#[tokio::test]
async fn dataset_keeps_archive_metadata_when_asked() {
    let t = dataset_transport();
    let mut cfg = dataset_config(ScoreFormat::Mscz, &t);
    cfg.update_metadata = false;

    let output = download(PAGE_URL, &cfg).await.unwrap();
    assert_eq!(output.title, "Gymnopedie 1");
    assert_eq!(output.score_metadata.unwrap().composer, "E. Satie");
}

#[tokio::test]
async fn dataset_export_goes_through_converter() {
    let t = dataset_transport();
    let output = download(PAGE_URL, &dataset_config(ScoreFormat::Flac, &t))
        .await
        .unwrap();

    assert_eq!(output.bytes, format!("flac:{}", mscz().len()).into_bytes());
    assert_eq!(output.file_name(), "Gymnopédie_No_1.flac");
}

#[tokio::test]
async fn score_missing_from_dataset() {
    let t = dataset_transport().with_response(
        format!("{MIRROR}/api/v0/block/stat?arg=/ipfs/bafyroot/5/12345.mscz"),
        HttpResponse {
            status: 500,
            body: br#"{"Message":"no link named \"12345.mscz\" under bafyshard","Code":0,"Type":"error"}"#
                .to_vec(),
        },
    );
    let err = download(PAGE_URL, &dataset_config(ScoreFormat::Mscz, &t))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoreError::NotInDataset { score_id: 12345 }));
}

#[tokio::test]
async fn dataset_inspect_skips_base_url() {
    let t = transport();
    let summary = inspect(PAGE_URL, &dataset_config(ScoreFormat::Mscz, &t))
        .await
        .unwrap();
    assert_eq!(summary.base_url, None);
    assert_eq!(summary.page_count, None);
    assert!(summary.formats.contains(&ScoreFormat::Ogg));
}
