//! # receipt2latex
//!
//! Extract the line items of a receipt photo into a LaTeX table by asking
//! several Vision Language Models (VLMs) and letting a judge model pick the
//! best answer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! receipt.jpeg
//!  │
//!  ├─ 1. Image    read bytes, resolve media type, base64 data URL
//!  ├─ 2. Extract  one call per backend (pixtral / qwen / llama …), concurrent
//!  ├─ 3. Compare  normalise outputs, group identical tables
//!  ├─ 4. Judge    numbered options → judge model → verbatim winner
//!  └─ 5. Output   selected table + every candidate + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt2latex::{run, EnsembleConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from OPENROUTER_API_KEY
//!     let config = EnsembleConfig::default();
//!     let output = run("data/receipt4.jpeg", &config).await?.into_result()?;
//!     match output.selected_text() {
//!         Some(table) => println!("{table}"),
//!         None => eprintln!("no candidate met the criteria"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2latex` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod ensemble;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    default_providers, CandidatePolicy, EnsembleConfig, EnsembleConfigBuilder, MediaTypePolicy,
    ProviderSpec,
};
pub use ensemble::{run, run_from_bytes, run_sync, run_to_file, write_selected};
pub use error::{ProviderError, ReceiptError};
pub use output::{EnsembleOutput, EnsembleStats};
pub use pipeline::extract::{ExtractionRequest, ExtractionResult, Extractor};
pub use pipeline::select::{Candidate, Selection, Selector};
pub use progress::{EnsembleProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{
    ChatMessage, Completion, CompletionProvider, CompletionRequest, ContentPart, OpenRouterProvider,
};
