//! CLI binary for receipt2latex.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `EnsembleConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt2latex::{
    run, write_selected, CandidatePolicy, EnsembleConfig, EnsembleOutput, EnsembleProgressCallback,
    MediaTypePolicy, ProgressCallback, ProviderSpec, Selection,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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

/// Terminal progress: one bar over the extraction backends, one log line per
/// backend as it finishes (possibly out of order), then a spinner while the
/// judge thinks.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading receipt…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl EnsembleProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_providers: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len} models  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_providers as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Querying {total_providers} vision models…"))
        ));
    }

    fn on_extraction_start(&self, index: usize, provider_id: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(provider_id.to_string());
    }

    fn on_extraction_complete(&self, index: usize, provider_id: &str, text_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Model {:<2} {:<48} {}  {}",
            green("✓"),
            index,
            provider_id,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_error(&self, index: usize, provider_id: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Model {:<2} {:<48} {}  {}",
            red("✗"),
            index,
            provider_id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_judge_start(&self, candidates: usize) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix("Judging");
        self.bar
            .set_message(format!("comparing {candidates} candidate tables…"));
    }

    fn on_run_complete(&self, successful: usize, total: usize, winner: Option<usize>) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let head = if failed == 0 { green("✔") } else { cyan("⚠") };
        let verdict = match winner {
            Some(n) => format!("judge picked model {n}"),
            None => "no model attributed".to_string(),
        };
        eprintln!(
            "{} {}/{} models answered  —  {}",
            head,
            bold(&successful.to_string()),
            total,
            verdict
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default ensemble (pixtral, qwen-2-vl, llama-3.2 vision; judged by command-r)
  receipt2latex data/receipt4.jpeg

  # Pick the models yourself
  receipt2latex -m mistralai/pixtral-12b -m qwen/qwen-2-vl-7b-instruct receipt.png

  # Keep failed extractions away from the judge
  receipt2latex --candidates exclude-failed receipt.jpeg -o table.tex

  # One call at a time, full JSON report
  receipt2latex --sequential --json receipt.jpeg > report.json

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      Provider credential
  RECEIPT2LATEX_MODELS    Comma-separated extraction models
  RECEIPT2LATEX_JUDGE     Judge model
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract receipt line items to LaTeX with an ensemble of vision models.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2latex",
    version,
    about = "Extract receipt line items to LaTeX with an ensemble of vision models and a judge",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Receipt image (JPEG, PNG, GIF or WebP).
    image: PathBuf,

    /// Write the selected table to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT2LATEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Extraction model; repeat for several. Defaults to the built-in trio.
    #[arg(short = 'm', long = "model", env = "RECEIPT2LATEX_MODELS", value_delimiter = ',')]
    models: Vec<String>,

    /// Judge model.
    #[arg(long, env = "RECEIPT2LATEX_JUDGE", default_value = receipt2latex::config::DEFAULT_JUDGE_MODEL)]
    judge: String,

    /// Provider credential.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Endpoint root of the OpenAI-compatible API.
    #[arg(long, env = "RECEIPT2LATEX_BASE_URL", default_value = receipt2latex::provider::openrouter::DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-call timeout in seconds.
    #[arg(long, env = "RECEIPT2LATEX_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Maximum extraction calls in flight.
    #[arg(short, long, env = "RECEIPT2LATEX_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Call the models one after another.
    #[arg(long, env = "RECEIPT2LATEX_SEQUENTIAL")]
    sequential: bool,

    /// What the judge sees of failed extractions.
    #[arg(long, value_enum, env = "RECEIPT2LATEX_CANDIDATES", default_value = "pass-through")]
    candidates: CandidatesArg,

    /// Media type declared for the image: auto (sniff), jpeg, png, webp, gif.
    #[arg(long, env = "RECEIPT2LATEX_MEDIA_TYPE", default_value = "auto")]
    media_type: String,

    /// File holding a custom extraction instruction.
    #[arg(long, env = "RECEIPT2LATEX_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// File holding custom judge criteria.
    #[arg(long, env = "RECEIPT2LATEX_JUDGE_PROMPT")]
    judge_prompt: Option<PathBuf>,

    /// Print the full run report as JSON.
    #[arg(long)]
    json: bool,

    /// Also print every candidate to stderr.
    #[arg(long)]
    show_candidates: bool,

    /// Disable the progress bar.
    #[arg(long, env = "RECEIPT2LATEX_NO_PROGRESS")]
    no_progress: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CandidatesArg {
    PassThrough,
    ExcludeFailed,
    Annotate,
}

impl From<CandidatesArg> for CandidatePolicy {
    fn from(v: CandidatesArg) -> Self {
        match v {
            CandidatesArg::PassThrough => CandidatePolicy::PassThrough,
            CandidatesArg::ExcludeFailed => CandidatePolicy::ExcludeFailed,
            CandidatesArg::Annotate => CandidatePolicy::Annotate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn EnsembleProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = run(&cli.image, &config).await.context("Ensemble run failed")?;

    if cli.show_candidates && !cli.quiet {
        print_candidates(&output);
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        output.into_result().context("Judge failed")?;
        return Ok(());
    }

    let output = output.into_result().context("Judge failed")?;
    let selected = output.selected_text().unwrap_or_default();

    match &output.selection {
        Some(Selection::NoWinner) if !cli.quiet => {
            eprintln!("{} judge found no table that meets the criteria", cyan("⚠"))
        }
        Some(Selection::NoCandidates) if !cli.quiet => {
            eprintln!("{} no candidate was available to judge", red("✘"))
        }
        _ => {}
    }

    if let Some(ref path) = cli.output {
        write_selected(&output, path)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}ms  →  {}",
                green("✔"),
                output.stats.total_duration_ms,
                bold(&path.display().to_string())
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(selected.as_bytes())
            .context("Failed to write to stdout")?;
        if !selected.is_empty() && !selected.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {} distinct answers",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
            output.stats.distinct_outputs,
        );
    }

    Ok(())
}

/// Map CLI args to `EnsembleConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<EnsembleConfig> {
    let mut builder = EnsembleConfig::builder()
        .judge_model(cli.judge.clone())
        .base_url(cli.base_url.clone())
        .api_timeout_secs(cli.api_timeout)
        .concurrency(cli.concurrency)
        .sequential(cli.sequential)
        .candidate_policy(cli.candidates.clone().into())
        .media_type(parse_media_type(&cli.media_type)?);

    let models: Vec<&str> = cli
        .models
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect();
    if !models.is_empty() {
        builder = builder.providers(models.into_iter().map(ProviderSpec::from_id).collect());
    }

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref path) = cli.instruction {
        builder = builder.instruction(read_text(path).await?);
    }
    if let Some(ref path) = cli.judge_prompt {
        builder = builder.judge_prompt(read_text(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}

/// Parse `--media-type` into a `MediaTypePolicy`.
fn parse_media_type(s: &str) -> Result<MediaTypePolicy> {
    let policy = match s.trim().to_lowercase().as_str() {
        "auto" | "sniff" => MediaTypePolicy::Sniff,
        "jpeg" | "jpg" | "image/jpeg" => MediaTypePolicy::AssumeJpeg,
        "png" => MediaTypePolicy::Declared("image/png".into()),
        "webp" => MediaTypePolicy::Declared("image/webp".into()),
        "gif" => MediaTypePolicy::Declared("image/gif".into()),
        other if other.starts_with("image/") => MediaTypePolicy::Declared(other.to_string()),
        other => anyhow::bail!("Unknown media type '{other}' (use auto, jpeg, png, webp, gif)"),
    };
    Ok(policy)
}

fn print_candidates(output: &EnsembleOutput) {
    for c in &output.candidates {
        eprintln!(
            "\n{} {}",
            bold(&format!("=== Model {}: {} ===", c.index, c.label)),
            dim(&c.provider_id)
        );
        match c.outcome() {
            Ok(text) => eprintln!("{text}"),
            Err(e) => eprintln!("{}", red(&e.to_string())),
        }
    }
    eprintln!();
}
