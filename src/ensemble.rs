//! Ensemble entry points: fan out to every extraction backend, then judge.
//!
//! Every configured backend is always attempted. Calls run concurrently
//! (bounded by `concurrency`) unless the config asks for sequential mode;
//! either way results keep configuration order. Winners and progress events
//! are reported by configured backend number (`ExtractionResult::index`),
//! never by the option number the judge saw, which shifts when
//! [`CandidatePolicy::ExcludeFailed`](crate::config::CandidatePolicy) hides
//! failures.

use crate::config::EnsembleConfig;
use crate::error::ReceiptError;
use crate::output::{EnsembleOutput, EnsembleStats};
use crate::pipeline::compare;
use crate::pipeline::extract::{ExtractionResult, Extractor};
use crate::pipeline::image::{load_image, ImagePayload};
use crate::pipeline::select::{Candidate, Selection, Selector};
use crate::progress::ProgressCallback;
use crate::prompts::{DEFAULT_EXTRACTION_PROMPT, DEFAULT_JUDGE_PROMPT};
use crate::provider::{CompletionProvider, OpenRouterProvider};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Extract a receipt image with every configured backend and let the judge
/// pick the best table.
///
/// # Returns
/// `Ok(EnsembleOutput)` even if some extractions or the judge call failed;
/// use [`EnsembleOutput::into_result`] to treat a judge failure as an error.
///
/// # Errors
/// Returns `Err(ReceiptError)` only for fatal errors, all detected before
/// any network call:
/// - Invalid configuration (see [`EnsembleConfig::validate`])
/// - Image missing, unreadable, empty, or of unknown type
/// - No provider credential available
pub async fn run(
    image_path: impl AsRef<Path>,
    config: &EnsembleConfig,
) -> Result<EnsembleOutput, ReceiptError> {
    let path = image_path.as_ref();
    info!("Starting ensemble run: {}", path.display());

    config.validate()?;
    let image = load_image(path, &config.media_type).await?;
    let provider = resolve_provider(config)?;
    run_with_image(image, provider, config).await
}

/// Same as [`run`], for image bytes already in memory.
pub async fn run_from_bytes(
    bytes: &[u8],
    config: &EnsembleConfig,
) -> Result<EnsembleOutput, ReceiptError> {
    config.validate()?;
    let image = ImagePayload::from_bytes(bytes, &config.media_type, Path::new("<memory>"))?;
    let provider = resolve_provider(config)?;
    run_with_image(image, provider, config).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    image_path: impl AsRef<Path>,
    config: &EnsembleConfig,
) -> Result<EnsembleOutput, ReceiptError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReceiptError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(run(image_path, config))
}

/// Run the ensemble and write the selected table to `output_path`.
///
/// The file is written atomically (temp file in the same directory, then
/// rename). When the judge finds no acceptable candidate the file is empty.
///
/// # Errors
/// Everything [`run`] returns, plus [`ReceiptError::JudgeFailed`] and
/// [`ReceiptError::OutputWriteFailed`].
pub async fn run_to_file(
    image_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &EnsembleConfig,
) -> Result<EnsembleOutput, ReceiptError> {
    let output = run(image_path, config).await?.into_result()?;
    write_selected(&output, output_path).await?;
    Ok(output)
}

/// Write the selected table (empty when there is none) to `path` atomically.
pub async fn write_selected(
    output: &EnsembleOutput,
    path: impl AsRef<Path>,
) -> Result<(), ReceiptError> {
    let path = path.as_ref().to_path_buf();
    let text = output.selected_text().unwrap_or_default().to_string();

    tokio::task::spawn_blocking(move || write_atomic(&path, &text))
        .await
        .map_err(|e| ReceiptError::Internal(format!("write task failed: {e}")))?
}

fn write_atomic(path: &Path, text: &str) -> Result<(), ReceiptError> {
    let fail = |source: std::io::Error| ReceiptError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(text.as_bytes()).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the completion provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Explicit credential** (`config.api_key`).
/// 3. **Environment** (`OPENROUTER_API_KEY`).
fn resolve_provider(config: &EnsembleConfig) -> Result<Arc<dyn CompletionProvider>, ReceiptError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let provider = match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            OpenRouterProvider::with_options(key, &config.base_url, config.api_timeout_secs)?
        }
        _ => OpenRouterProvider::from_env(&config.base_url, config.api_timeout_secs)?,
    };
    Ok(Arc::new(provider))
}

async fn run_with_image(
    image: ImagePayload,
    provider: Arc<dyn CompletionProvider>,
    config: &EnsembleConfig,
) -> Result<EnsembleOutput, ReceiptError> {
    let total_start = Instant::now();
    let total = config.providers.len();
    info!(
        "Extracting with {} model(s) via {} ({}, {} bytes)",
        total,
        provider.name(),
        image.media_type,
        image.byte_len
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    // ── Step 1: Fan out extraction calls ─────────────────────────────────
    let extractor = Extractor::new(Arc::clone(&provider)).with_media_type(config.media_type.clone());
    let instruction = config
        .instruction
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);

    let extraction_start = Instant::now();
    let candidates = if config.sequential {
        extract_sequential(&extractor, &image, instruction, config).await
    } else {
        extract_concurrent(&extractor, &image, instruction, config).await
    };
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    let successful: Vec<&ExtractionResult> = candidates.iter().filter(|c| c.is_success()).collect();
    info!(
        "Extraction finished: {}/{} succeeded in {}ms",
        successful.len(),
        total,
        extraction_duration_ms
    );

    // ── Step 2: Compare ──────────────────────────────────────────────────
    let texts: Vec<&str> = successful.iter().map(|c| c.text.as_str()).collect();
    let distinct_outputs = compare::agreement_groups(&texts).len();
    let table_like = texts.iter().filter(|t| compare::looks_like_table(t)).count();

    // ── Step 3: Judge ────────────────────────────────────────────────────
    let selector = Selector::new(provider)
        .with_judge_model(config.judge_model.clone())
        .with_criteria(
            config
                .judge_prompt
                .as_deref()
                .unwrap_or(DEFAULT_JUDGE_PROMPT),
        )
        .with_policy(config.candidate_policy);
    let options: Vec<Candidate> = candidates.iter().map(Candidate::from).collect();

    let prompt = selector.render(&options);
    if let Some(ref cb) = config.progress_callback {
        cb.on_judge_start(prompt.as_ref().map_or(0, |p| p.shown.len()));
    }

    let (selection, judge_error, judged, judge_tokens, judge_duration_ms) =
        match selector.judge_rendered(prompt, &options).await {
            Ok(j) => (
                Some(j.selection),
                None,
                j.shown,
                (j.input_tokens as u64, j.output_tokens as u64),
                j.duration_ms,
            ),
            Err(e) => {
                warn!("Judge {} failed — {}", config.judge_model, e);
                (None, Some(e), 0, (0, 0), 0)
            }
        };

    match &selection {
        Some(Selection::NoWinner) => warn!("Judge found no acceptable candidate"),
        Some(Selection::NoCandidates) => warn!("No candidate was available to judge"),
        _ => {}
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(
            successful.len(),
            total,
            selection.as_ref().and_then(Selection::index),
        );
    }

    let stats = EnsembleStats {
        total_providers: total,
        successful: successful.len(),
        failed: total - successful.len(),
        distinct_outputs,
        table_like,
        judged,
        total_input_tokens: candidates.iter().map(|c| c.input_tokens as u64).sum::<u64>()
            + judge_tokens.0,
        total_output_tokens: candidates.iter().map(|c| c.output_tokens as u64).sum::<u64>()
            + judge_tokens.1,
        extraction_duration_ms,
        judge_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Ensemble complete: {}/{} candidates, {}ms total",
        stats.successful, stats.total_providers, stats.total_duration_ms
    );

    Ok(EnsembleOutput {
        image: image.source.clone(),
        media_type: image.media_type.clone(),
        candidates,
        selection,
        judge_error,
        stats,
    })
}

/// Issue every extraction at once (bounded by `concurrency`), keeping order.
async fn extract_concurrent(
    extractor: &Extractor,
    image: &ImagePayload,
    instruction: &str,
    config: &EnsembleConfig,
) -> Vec<ExtractionResult> {
    let callback = config.progress_callback.as_ref();
    stream::iter(config.providers.iter().enumerate().map(|(i, spec)| async move {
        let index = i + 1;
        if let Some(cb) = callback {
            cb.on_extraction_start(index, &spec.id);
        }
        let result = extractor.extract_image(image, spec, index, instruction).await;
        notify_done(callback, &result);
        result
    }))
    .buffered(config.concurrency)
    .collect()
    .await
}

/// Issue extractions one after another.
async fn extract_sequential(
    extractor: &Extractor,
    image: &ImagePayload,
    instruction: &str,
    config: &EnsembleConfig,
) -> Vec<ExtractionResult> {
    let callback = config.progress_callback.as_ref();
    let mut results = Vec::with_capacity(config.providers.len());
    for (i, spec) in config.providers.iter().enumerate() {
        let index = i + 1;
        info!("Processing with {} ({})", spec.label, spec.id);
        if let Some(cb) = callback {
            cb.on_extraction_start(index, &spec.id);
        }
        let result = extractor.extract_image(image, spec, index, instruction).await;
        notify_done(callback, &result);
        results.push(result);
    }
    results
}

fn notify_done(callback: Option<&ProgressCallback>, result: &ExtractionResult) {
    if let Some(cb) = callback {
        match &result.error {
            None => cb.on_extraction_complete(result.index, &result.provider_id, result.text.len()),
            Some(e) => cb.on_extraction_error(result.index, &result.provider_id, &e.to_string()),
        }
    }
}
