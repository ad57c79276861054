//! CLI binary for scoredl.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `FetchConfig` and writes results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use scoredl::{
    download, export_local, inspect, is_local_archive, write_atomic, DownloadOutput,
    DownloadProgressCallback, FetchConfig, FetchMode, FormatSet, MuseScoreConverter, MxlStrategy,
    PaginationStrategy, ProgressCallback, Resolution, ScoreFormat, ScoreSummary, SiteProfile,
    DEFAULT_MIRROR,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use userscript_cache::ScriptStatus;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Pages may complete out of order in parallel
/// mode, so start times are keyed by page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_download_start` reports the page total.
    fn new_dynamic(label: &str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Fetching");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Clear the bar if the download ended before `on_download_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl DownloadProgressCallback for CliProgressCallback {
    fn on_download_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        if total_pages > 1 {
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Fetching {total_pages} pages…"))
            ));
        }
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(page_num);
        if total > 1 {
            self.bar.println(format!(
                "  {} Page {:>3}/{:<3}  {:<8}  {}",
                green("✓"),
                page_num,
                total,
                dim(&format!("{bytes:>7} bytes")),
                dim(&format!("{secs:.1}s")),
            ));
        }
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);

        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_download_complete(&self, total_pages: usize, total_bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} fetched  {}",
            green("✔"),
            bold(&format!(
                "{total_pages} {}",
                if total_pages == 1 { "file" } else { "pages" }
            )),
            dim(&format!("{total_bytes} bytes")),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # MP3 to stdout
  scoredl https://musescore.com/user/1/scores/4766391 > score.mp3

  # MIDI, named after the score title, in ~/Music
  scoredl -f mid -O --output-dir ~/Music https://musescore.com/user/1/scores/4766391

  # PDF, fetching pages in parallel
  scoredl -f pdf -t -o score.pdf https://musescore.com/user/1/scores/4766391

  # Original .mscz from the dataset, or FLAC converted through MuseScore
  scoredl --source dataset -f mscz -O https://musescore.com/user/1/scores/4766391
  scoredl --source dataset -f flac -O https://musescore.com/user/1/scores/4766391

  # Export a local archive
  scoredl -f mxl -o score.mxl ./score.mscz

  # Many scores, one URL per line (# comments allowed)
  scoredl --batch urls.txt -f pdf -O --output-dir scores/

  # Inspect a score page (no artifact download)
  scoredl --inspect-only --json https://musescore.com/user/1/scores/4766391

  # Refresh the in-browser downloader script
  scoredl --update-userscript

FORMAT SETS:
  Set  Formats                              Default for
  ───  ───────────────────────────────────  ────────────
  v1   mid, mp3
  v2   mid, mp3, mxl
  v3   mid, mp3, mxl, pdf                   --source page
  v4   pdf, mscz, mxl, mid, mp3, flac, ogg  --source dataset

ENVIRONMENT VARIABLES:
  SCOREDL_*                  Every flag, e.g. SCOREDL_FORMAT=pdf
  SCOREDL_USERSCRIPT_URL     Where --update-userscript fetches from
  SCOREDL_SCRIPT_CACHE_DIR   Override the userscript cache directory
  PDFIUM_LIB_PATH            Path to libpdfium for PDF page assembly
  RUST_LOG                   Override the log filter

SETUP:
  PDF output needs libpdfium (system-wide or via PDFIUM_LIB_PATH).
  Dataset exports other than mscz need MuseScore on PATH
  (musescore4, mscore4portable, musescore3, musescore, mscore) or --musescore.
"#;

/// Download scores as MP3, MIDI, MusicXML, PDF and more.
#[derive(Parser, Debug)]
#[command(
    name = "scoredl",
    version,
    about = "Download scores as MP3, MIDI, MusicXML, PDF and more",
    long_about = "Download scores from an online score library. Artifacts are resolved from the \
score page itself, or from the content-addressed dataset of original .mscz archives, which \
MuseScore can then export to any supported format.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Score URL, or a local .mscz file to export.
    #[arg(
        required_unless_present_any = ["batch", "update_userscript"],
        conflicts_with = "batch"
    )]
    input: Option<String>,

    /// File with one score URL per line; blank lines and `#` comments are skipped.
    #[arg(long, env = "SCOREDL_BATCH")]
    batch: Option<PathBuf>,

    /// Output format: pdf, mscz, mxl, mid, mp3, flac, ogg.
    #[arg(short, long, env = "SCOREDL_FORMAT", default_value = "mp3")]
    format: String,

    /// Restrict formats to one generation (default: v3 for page, v4 for dataset).
    #[arg(long, env = "SCOREDL_FORMAT_SET", value_enum)]
    format_set: Option<FormatSetArg>,

    /// Write the artifact to this file instead of stdout.
    #[arg(short, long, env = "SCOREDL_OUTPUT", conflicts_with_all = ["remote_name", "batch"])]
    output: Option<PathBuf>,

    /// Name the file after the score title, inside --output-dir.
    #[arg(short = 'O', long, env = "SCOREDL_REMOTE_NAME")]
    remote_name: bool,

    /// Directory for -O and --batch output.
    #[arg(long, env = "SCOREDL_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Fetch PDF pages in parallel.
    #[arg(short = 't', long, env = "SCOREDL_PARALLEL")]
    parallel: bool,

    /// Pages in flight with --parallel (default: available CPU parallelism).
    #[arg(short = 'j', long, env = "SCOREDL_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Rasterisation DPI for PDF page assembly (36–600).
    #[arg(long, env = "SCOREDL_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// Where artifacts come from.
    #[arg(long, env = "SCOREDL_SOURCE", value_enum, default_value = "page")]
    source: SourceArg,

    /// IPFS gateway for --source dataset.
    #[arg(long, env = "SCOREDL_MIRROR", default_value = DEFAULT_MIRROR)]
    mirror: String,

    /// How the mxl address is derived.
    #[arg(long, env = "SCOREDL_MXL_STRATEGY", value_enum, default_value = "auto")]
    mxl_strategy: MxlArg,

    /// How the PDF page count is discovered.
    #[arg(long, env = "SCOREDL_PAGINATION", value_enum, default_value = "index")]
    pagination: PaginationArg,

    /// Keep the dataset archive's own metadata instead of the page's.
    #[arg(long, env = "SCOREDL_DONT_UPDATE")]
    dont_update: bool,

    /// MuseScore executable for dataset exports (default: searched on PATH).
    #[arg(long, env = "SCOREDL_MUSESCORE")]
    musescore: Option<PathBuf>,

    /// Site host that score URLs must contain.
    #[arg(long, env = "SCOREDL_HOST", default_value = "musescore.com")]
    host: String,

    /// Print score information only, no download.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON record instead of text.
    #[arg(long, env = "SCOREDL_JSON")]
    json: bool,

    /// Refresh the cached in-browser downloader script.
    #[arg(long)]
    update_userscript: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCOREDL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCOREDL_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCOREDL_NO_PROGRESS")]
    no_progress: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "SCOREDL_TIMEOUT", default_value_t = 60)]
    timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Page,
    Dataset,
}

impl From<SourceArg> for Resolution {
    fn from(v: SourceArg) -> Self {
        match v {
            SourceArg::Page => Resolution::Page,
            SourceArg::Dataset => Resolution::Dataset,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatSetArg {
    V1,
    V2,
    V3,
    V4,
}

impl From<FormatSetArg> for FormatSet {
    fn from(v: FormatSetArg) -> Self {
        match v {
            FormatSetArg::V1 => FormatSet::V1,
            FormatSetArg::V2 => FormatSet::V2,
            FormatSetArg::V3 => FormatSet::V3,
            FormatSetArg::V4 => FormatSet::V4,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MxlArg {
    Auto,
    Direct,
    FromMp3,
}

impl From<MxlArg> for MxlStrategy {
    fn from(v: MxlArg) -> Self {
        match v {
            MxlArg::Auto => MxlStrategy::Auto,
            MxlArg::Direct => MxlStrategy::Direct,
            MxlArg::FromMp3 => MxlStrategy::FromMp3,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PaginationArg {
    Index,
    Probe,
}

impl From<PaginationArg> for PaginationStrategy {
    fn from(v: PaginationArg) -> Self {
        match v {
            PaginationArg::Index => PaginationStrategy::IndexDocument,
            PaginationArg::Probe => PaginationStrategy::Probe,
        }
    }
}

/// Where a downloaded artifact goes.
enum Destination {
    File(PathBuf),
    Named(PathBuf),
    Stdout,
}

impl Destination {
    fn from_cli(cli: &Cli) -> Self {
        if let Some(ref path) = cli.output {
            Destination::File(path.clone())
        } else if cli.remote_name || cli.batch.is_some() {
            Destination::Named(cli.output_dir.clone())
        } else {
            Destination::Stdout
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let destination = Destination::from_cli(&cli);
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Userscript refresh ───────────────────────────────────────────────
    if cli.update_userscript {
        refresh_userscript(cli.quiet)?;
        if cli.input.is_none() && cli.batch.is_none() {
            return Ok(());
        }
    }

    let config = build_config(&cli)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in inputs(&cli).await? {
            let summary = inspect(&input, &config)
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;
            print_summary(&summary, cli.json)?;
        }
        return Ok(());
    }

    if matches!(destination, Destination::Stdout) && cli.json {
        bail!("--json needs a file destination (-o or -O); stdout carries the artifact");
    }

    // ── Run downloads ────────────────────────────────────────────────────
    let inputs = inputs(&cli).await?;
    let total = inputs.len();
    for (i, input) in inputs.iter().enumerate() {
        if total > 1 && !cli.quiet {
            eprintln!("{} [{}/{}] {}", cyan("◆"), i + 1, total, bold(input));
        }

        let mut item_config = config.clone();
        let bar = show_progress.then(|| CliProgressCallback::new_dynamic(input));
        if let Some(ref cb) = bar {
            item_config.progress_callback = Some(Arc::clone(cb) as ProgressCallback);
        }

        let result = if is_local_archive(input) {
            export_local(input, &item_config).await
        } else {
            download(input, &item_config).await
        };
        if let Some(ref cb) = bar {
            cb.abandon();
        }
        let output = result.with_context(|| format!("Download failed: {input}"))?;

        let written = deliver(&output, &destination).await?;
        report(&cli, &output, written.as_deref())?;
    }

    Ok(())
}

/// Map CLI args to `FetchConfig`.
fn build_config(cli: &Cli) -> Result<FetchConfig> {
    let format: ScoreFormat = cli.format.parse().context("Invalid --format")?;
    let fetch_mode = if cli.parallel {
        match cli.concurrency {
            Some(n) => FetchMode::Parallel { concurrency: n },
            None => FetchMode::parallel(),
        }
    } else {
        FetchMode::Sequential
    };

    let mut builder = FetchConfig::builder()
        .format(format)
        .resolution(cli.source.into())
        .mxl_strategy(cli.mxl_strategy.into())
        .pagination(cli.pagination.into())
        .fetch_mode(fetch_mode)
        .dpi(cli.dpi)
        .mirror(cli.mirror.clone())
        .update_metadata(!cli.dont_update)
        .timeout_secs(cli.timeout)
        .site(SiteProfile::for_host(&cli.host));

    if let Some(set) = cli.format_set {
        builder = builder.formats(set.into());
    } else if cli.input.as_deref().is_some_and(is_local_archive) {
        // A local archive can be exported to anything the converter handles.
        builder = builder.formats(FormatSet::V4);
    }
    if let Some(ref exe) = cli.musescore {
        builder = builder.converter(Arc::new(MuseScoreConverter::new(exe)));
    }

    builder.build().context("Invalid configuration")
}

/// The single input, or the URLs listed in `--batch`.
async fn inputs(cli: &Cli) -> Result<Vec<String>> {
    if let Some(ref path) = cli.batch {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read batch file {}", path.display()))?;
        return Ok(parse_batch(&text));
    }
    match cli.input {
        Some(ref input) => Ok(vec![input.clone()]),
        None => bail!("A score URL or --batch FILE is required"),
    }
}

/// One entry per non-blank line that is not a `#` comment.
fn parse_batch(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Write the artifact. Returns the path written, `None` for stdout.
async fn deliver(output: &DownloadOutput, destination: &Destination) -> Result<Option<PathBuf>> {
    let path = match destination {
        Destination::File(path) => path.clone(),
        Destination::Named(dir) => dir.join(output.file_name()),
        Destination::Stdout => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(&output.bytes)
                .and_then(|_| handle.flush())
                .context("Failed to write to stdout")?;
            return Ok(None);
        }
    };
    write_atomic(&path, &output.bytes)
        .await
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(Some(path))
}

fn report(cli: &Cli, output: &DownloadOutput, written: Option<&Path>) -> Result<()> {
    if cli.json {
        let record = serde_json::json!({
            "title": output.title,
            "format": output.format,
            "score_id": output.identity.as_ref().map(|i| i.score_id()),
            "path": written.map(|p| p.display().to_string()),
            "stats": output.stats,
            "metadata": output.score_metadata,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise output")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    match written {
        Some(path) => eprintln!(
            "{}  {}  {} bytes  {}ms  →  {}",
            green("✔"),
            output.title,
            output.stats.bytes,
            output.stats.total_duration_ms,
            bold(&path.display().to_string()),
        ),
        None => eprintln!(
            "{}  {}  {}",
            green("✔"),
            output.title,
            dim(&format!(
                "{} bytes of {} in {}ms",
                output.stats.bytes, output.format, output.stats.total_duration_ms
            )),
        ),
    }
    Ok(())
}

fn print_summary(summary: &ScoreSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("Failed to serialize summary")?
        );
        return Ok(());
    }
    println!("URL:          {}", summary.identity.reference());
    println!("Score id:     {}", summary.identity.score_id());
    if let Some(owner) = summary.identity.owner_id() {
        println!("Owner id:     {}", owner);
    }
    println!("Title:        {}", summary.title);
    if let Some(ref a) = summary.metadata.author {
        println!("Author:       {}", a);
    }
    if let Some(ref c) = summary.metadata.composer {
        println!("Composer:     {}", c);
    }
    if let Some(ref base) = summary.base_url {
        println!("Base URL:     {}", base);
    }
    if let Some(pages) = summary.page_count {
        println!("Pages:        {}", pages);
    }
    let formats: Vec<&str> = summary.formats.iter().map(|f| f.extension()).collect();
    println!("Formats:      {}", formats.join(", "));
    Ok(())
}

fn refresh_userscript(quiet: bool) -> Result<()> {
    let url = userscript_cache::script_url();
    let dir = userscript_cache::cache_dir();

    // The cache crate uses blocking reqwest.
    let status = tokio::task::block_in_place(|| userscript_cache::update_userscript(&url, &dir))
        .context("Failed to update the downloader script")?;

    if !quiet {
        let path = dir.join(userscript_cache::SCRIPT_FILE);
        match status {
            ScriptStatus::UpToDate => eprintln!(
                "{} already at latest version  {}",
                green("✔"),
                dim(&path.display().to_string())
            ),
            ScriptStatus::Updated => eprintln!(
                "{} new version downloaded  →  {}",
                green("✔"),
                bold(&path.display().to_string())
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_skips_blanks_and_comments() {
        let text = "\n# favourites\nhttps://musescore.com/user/1/scores/2\n   \n  https://musescore.com/user/1/scores/3  \n#https://musescore.com/user/1/scores/4\n";
        assert_eq!(
            parse_batch(text),
            vec![
                "https://musescore.com/user/1/scores/2",
                "https://musescore.com/user/1/scores/3",
            ]
        );
    }

    #[test]
    fn url_and_batch_are_exclusive() {
        let r = Cli::try_parse_from(["scoredl", "--batch", "urls.txt", "https://x/1"]);
        assert!(r.is_err());
    }

    #[test]
    fn input_optional_with_update_userscript() {
        let cli = Cli::try_parse_from(["scoredl", "--update-userscript"]).unwrap();
        assert!(cli.input.is_none());
        assert!(Cli::try_parse_from(["scoredl", "-f", "pdf"]).is_err());
    }

    #[test]
    fn flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "scoredl",
            "-f",
            "midi",
            "-t",
            "-j",
            "3",
            "--source",
            "dataset",
            "--dont-update",
            "https://musescore.com/user/1/scores/2",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.format, ScoreFormat::Mid);
        assert_eq!(config.fetch_mode, FetchMode::Parallel { concurrency: 3 });
        assert_eq!(config.resolution, Resolution::Dataset);
        assert!(!config.update_metadata);
    }

    #[test]
    fn format_outside_set_is_rejected() {
        let cli = Cli::try_parse_from([
            "scoredl",
            "-f",
            "flac",
            "https://musescore.com/user/1/scores/2",
        ])
        .unwrap();
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn destination_selection() {
        let named = Cli::try_parse_from(["scoredl", "-O", "https://x/1"]).unwrap();
        assert!(matches!(Destination::from_cli(&named), Destination::Named(_)));
        let stdout = Cli::try_parse_from(["scoredl", "https://x/1"]).unwrap();
        assert!(matches!(Destination::from_cli(&stdout), Destination::Stdout));
        assert!(Cli::try_parse_from(["scoredl", "-o", "a.mp3", "-O", "https://x/1"]).is_err());
    }
}
