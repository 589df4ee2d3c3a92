//! The selector: show every candidate to a judge model and keep its pick.
//!
//! Candidates are numbered `Option 1`, `Option 2`, … in input order, skipping
//! any the [`CandidatePolicy`] hides. The judge's reply is kept verbatim and
//! attributed back to its input position, which is what callers should
//! report: option numbers only mean something inside the judge prompt. A blank reply is the explicit
//! [`Selection::NoWinner`] outcome, a failed judge call is an `Err`, and an
//! empty candidate list short-circuits to [`Selection::NoCandidates`]
//! without contacting the judge.

use crate::config::{CandidatePolicy, DEFAULT_JUDGE_MODEL};
use crate::error::ProviderError;
use crate::pipeline::compare;
use crate::pipeline::extract::ExtractionResult;
use crate::prompts::{judge_instruction, option_label, DEFAULT_JUDGE_PROMPT};
use crate::provider::{ChatMessage, CompletionProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One option offered to the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub provider_id: String,
    /// Model output, or the failure description for failed extractions.
    pub text: String,
    pub failed: bool,
}

impl Candidate {
    pub fn new(provider_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            text: text.into(),
            failed: false,
        }
    }

    /// Candidate standing for a failed extraction.
    pub fn failure(provider_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(provider_id, text)
        }
    }
}

impl From<&ExtractionResult> for Candidate {
    fn from(r: &ExtractionResult) -> Self {
        Self {
            provider_id: r.provider_id.clone(),
            text: r.candidate_text(),
            failed: !r.is_success(),
        }
    }
}

/// What the judge decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Selection {
    /// The judge returned a table.
    Winner {
        /// Judge reply, verbatim.
        text: String,
        /// 1-based option number, as shown to the judge, that the reply
        /// reproduces. Differs from `index` when failures were hidden.
        option: Option<usize>,
        /// 1-based position of that candidate in the selector's input.
        /// In an ensemble run this is the configured backend number.
        index: Option<usize>,
        /// Provider of that candidate.
        provider_id: Option<String>,
    },
    /// The judge replied, but found no candidate acceptable.
    NoWinner,
    /// There was nothing to judge; the judge was not called.
    NoCandidates,
}

impl Selection {
    /// The selected text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Selection::Winner { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn option(&self) -> Option<usize> {
        match self {
            Selection::Winner { option, .. } => *option,
            _ => None,
        }
    }

    /// 1-based input position of the attributed candidate.
    pub fn index(&self) -> Option<usize> {
        match self {
            Selection::Winner { index, .. } => *index,
            _ => None,
        }
    }

    pub fn is_winner(&self) -> bool {
        matches!(self, Selection::Winner { .. })
    }
}

/// A rendered judge prompt plus the candidates it shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgePrompt {
    pub instruction: String,
    /// `shown[n - 1]` is the input index of `Option n`.
    pub shown: Vec<usize>,
}

/// Result of a judge call with usage figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub selection: Selection,
    pub shown: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Asks one fixed judge model to pick among candidates.
#[derive(Clone)]
pub struct Selector {
    provider: Arc<dyn CompletionProvider>,
    judge_model: String,
    criteria: String,
    policy: CandidatePolicy,
}

impl Selector {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            criteria: DEFAULT_JUDGE_PROMPT.to_string(),
            policy: CandidatePolicy::default(),
        }
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = model.into();
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = criteria.into();
        self
    }

    pub fn with_policy(mut self, policy: CandidatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn judge_model(&self) -> &str {
        &self.judge_model
    }

    /// Render the judge instruction, or `None` when no option would be shown.
    pub fn render(&self, candidates: &[Candidate]) -> Option<JudgePrompt> {
        let shown: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !(c.failed && self.policy == CandidatePolicy::ExcludeFailed))
            .map(|(i, _)| i)
            .collect();
        if shown.is_empty() {
            return None;
        }

        let annotate = self.policy == CandidatePolicy::Annotate;
        let options = shown
            .iter()
            .enumerate()
            .map(|(n, &i)| {
                let c = &candidates[i];
                format!("{}\n{}", option_label(n + 1, annotate && c.failed), c.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Some(JudgePrompt {
            instruction: judge_instruction(&self.criteria, &options),
            shown,
        })
    }

    /// Pick the best candidate.
    pub async fn select(&self, candidates: &[Candidate]) -> Result<Selection, ProviderError> {
        self.judge(candidates).await.map(|j| j.selection)
    }

    /// Convenience for plain strings: every entry is an ordinary option.
    pub async fn select_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<Selection, ProviderError> {
        let candidates: Vec<Candidate> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Candidate::new(format!("option-{}", i + 1), t.as_ref()))
            .collect();
        self.select(&candidates).await
    }

    /// Pick the best candidate, reporting usage alongside the selection.
    pub async fn judge(&self, candidates: &[Candidate]) -> Result<Judgement, ProviderError> {
        self.judge_rendered(self.render(candidates), candidates).await
    }

    /// Like [`Selector::judge`], for a prompt already produced by
    /// [`Selector::render`] over the same `candidates`.
    pub async fn judge_rendered(
        &self,
        prompt: Option<JudgePrompt>,
        candidates: &[Candidate],
    ) -> Result<Judgement, ProviderError> {
        let Some(prompt) = prompt else {
            info!("No candidates to judge; skipping judge call");
            return Ok(Judgement {
                selection: Selection::NoCandidates,
                shown: 0,
                input_tokens: 0,
                output_tokens: 0,
                duration_ms: 0,
            });
        };

        let start = Instant::now();
        info!(
            "Asking {} to judge {} option(s)",
            self.judge_model,
            prompt.shown.len()
        );
        let request = CompletionRequest::new(
            self.judge_model.clone(),
            vec![ChatMessage::user_text(prompt.instruction)],
        );
        let completion = self.provider.complete(&request).await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Judge: {} input tokens, {} output tokens, {}ms",
            completion.prompt_tokens, completion.completion_tokens, duration_ms
        );

        let selection = if compare::is_blank(&completion.content) {
            Selection::NoWinner
        } else {
            let shown_texts: Vec<&str> = prompt
                .shown
                .iter()
                .map(|&i| candidates[i].text.as_str())
                .collect();
            let option = compare::attribute(&completion.content, &shown_texts);
            let input = option.map(|n| prompt.shown[n]);
            Selection::Winner {
                provider_id: input.map(|i| candidates[i].provider_id.clone()),
                option: option.map(|n| n + 1),
                index: input.map(|i| i + 1),
                text: completion.content,
            }
        };

        Ok(Judgement {
            selection,
            shown: prompt.shown.len(),
            input_tokens: completion.prompt_tokens,
            output_tokens: completion.completion_tokens,
            duration_ms,
        })
    }
}
