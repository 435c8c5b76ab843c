//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate: maps CLI flags to an
//! `ExtractionRequest` + `ExtractionConfig`, runs the vision-LLM engine and
//! prints the result as JSON or an exported document.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::extract::write_atomic;
use edgequake_ocr::{
    export, EngineHandle, ExportFormat, ExportPage, ExtractionConfig, ExtractionProgressCallback,
    ExtractionRequest, Extractor, ProgressCallback, VlmEngine, VlmSettings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per recognised page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until the page count is known (set in `on_extraction_start`).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize, detections: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{detections:>3} boxes")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.finish_and_clear();
    }

    fn on_extraction_complete(&self, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} page(s) recognised",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Plain OCR of an image, JSON to stdout
  edgeocr receipt.jpg

  # Markdown export of a PDF
  edgeocr --mode markdown --format markdown paper.pdf -o paper.md

  # Locate a term and get its boxes
  edgeocr --mode find_ref --find-term "Total" invoice.pdf

  # Word document with figures cropped and embedded
  edgeocr --mode markdown --crop-figures --format docx report.pdf -o report.docx

  # Key-value extraction with a schema
  edgeocr --mode kv_json --schema '{"invoice_no": "", "date": ""}' invoice.png

MODES:
  plain_ocr  markdown  tables_csv  tables_md  kv_json  figure_chart
  find_ref   layout_map  pii_redact  multilingual  describe  freeform

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  MAX_PDF_WORKERS         Concurrent page renders (default 4)
  OCR_PDF_DPI             Rendering DPI (default 144)
"#;

/// Grounded OCR for images and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "edgeocr",
    version,
    about = "Grounded OCR for images and PDFs using Vision LLMs",
    long_about = "Rasterise images and PDFs, read each page with a vision model and return \
text plus labelled bounding boxes. Results print as JSON or export to Markdown, HTML or DOCX.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image/PDF path or HTTP/HTTPS URL.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "EDGEOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Extraction mode (see MODES in --help).
    #[arg(long, env = "EDGEOCR_MODE", default_value = "plain_ocr")]
    mode: String,

    /// Free-text prompt for the `freeform` mode.
    #[arg(long, default_value = "")]
    prompt: String,

    /// Ask the engine for bounding boxes.
    #[arg(long)]
    grounding: bool,

    /// Ask for an image description too (figure_chart, describe).
    #[arg(long)]
    include_caption: bool,

    /// Term to locate in `find_ref` mode.
    #[arg(long)]
    find_term: Option<String>,

    /// JSON schema text for `kv_json` mode.
    #[arg(long)]
    schema: Option<String>,

    /// Engine base size (passed through).
    #[arg(long, default_value_t = 1024)]
    base_size: u32,

    /// Engine image size (passed through).
    #[arg(long, default_value_t = 640)]
    image_size: u32,

    /// Engine crop mode (passed through).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    crop_mode: bool,

    /// Rendering DPI (72–600).
    #[arg(long, value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Concurrent page renders.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Crop `image` detections into figures and inline them in exports.
    #[arg(long)]
    crop_figures: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value = "json")]
    format: FormatArg,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGEOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGEOCR_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDGEOCR_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Json,
    Markdown,
    Html,
    Docx,
}

impl FormatArg {
    fn export_format(self) -> Option<ExportFormat> {
        match self {
            FormatArg::Json => None,
            FormatArg::Markdown => Some(ExportFormat::Markdown),
            FormatArg::Html => Some(ExportFormat::Html),
            FormatArg::Docx => Some(ExportFormat::Docx),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && io::stderr().is_terminal();
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

    if cli.format == FormatArg::Docx && cli.output.is_none() {
        anyhow::bail!("--format docx needs an output file (-o report.docx)");
    }

    // ── Engine ───────────────────────────────────────────────────────────
    let settings = VlmSettings {
        provider_name: cli.provider.clone(),
        model: cli.model.clone(),
        ..VlmSettings::default()
    };
    let engine = VlmEngine::from_settings(settings).context("Recognition engine unavailable")?;

    // ── Config + request ─────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let request = build_request(&cli);

    let extractor = Extractor::new(EngineHandle::ready(Arc::new(engine)), config);
    let start = Instant::now();

    // ── Run extraction ───────────────────────────────────────────────────
    let result = match (cli.format.export_format(), cli.output.as_ref()) {
        (Some(format), Some(path)) => extractor
            .extract_to_file(&cli.input, &request, path, format)
            .await
            .context("Extraction failed")?,
        (Some(format), None) => {
            let result = extractor
                .extract(&cli.input, &request)
                .await
                .context("Extraction failed")?;
            let bytes = export(&ExportPage::from_result(&result), format, true)
                .context("Export failed")?;
            write_stdout(&bytes)?;
            result
        }
        (None, output) => {
            let result = extractor
                .extract(&cli.input, &request)
                .await
                .context("Extraction failed")?;
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
            match output {
                Some(path) => write_atomic(path, json.as_bytes())
                    .await
                    .context("Failed to write output")?,
                None => write_stdout(json.as_bytes())?,
            }
            result
        }
    };

    if !cli.quiet {
        let pages = result.pages.as_ref().map_or(1, Vec::len);
        let boxes = result
            .pages
            .as_ref()
            .map_or(result.boxes.len(), |p| p.iter().map(|p| p.detections.len()).sum());
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} page(s)  {} boxes  {}ms{}",
            green("✔"),
            pages,
            boxes,
            start.elapsed().as_millis(),
            target
        );
    }

    Ok(())
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(bytes)
        .context("Failed to write to stdout")?;
    if !bytes.ends_with(b"\n") {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`, starting from the environment.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let env = ExtractionConfig::from_env();
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi.unwrap_or(env.dpi))
        .max_workers(cli.workers.unwrap_or(env.max_workers))
        .max_image_pixels(env.max_image_pixels)
        .crop_figures(cli.crop_figures)
        .download_timeout_secs(env.download_timeout_secs);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `ExtractionRequest`.
fn build_request(cli: &Cli) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(cli.mode.trim())
        .prompt(cli.prompt.as_str())
        .grounding(cli.grounding)
        .include_caption(cli.include_caption)
        .base_size(cli.base_size)
        .image_size(cli.image_size)
        .crop_mode(cli.crop_mode);
    if let Some(ref term) = cli.find_term {
        request = request.find_term(term.as_str());
    }
    if let Some(ref schema) = cli.schema {
        request = request.schema(schema.as_str());
    }
    request
}
