//! The extractor: one receipt image + one instruction → one model's raw text.
//!
//! The request is a single user turn holding the instruction and the image
//! as an embedded data URL. The first choice's text comes back verbatim; no
//! validation of the LaTeX is attempted here.
//!
//! A failed call does not abort anything. It is recorded on the
//! [`ExtractionResult`] so the orchestrator can decide what the judge sees.

use crate::config::{MediaTypePolicy, ProviderSpec};
use crate::error::{ProviderError, ReceiptError};
use crate::pipeline::image::{load_image, ImagePayload};
use crate::provider::{ChatMessage, CompletionProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Input of one extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub image_path: PathBuf,
    pub provider_id: String,
    pub instruction: String,
}

impl ExtractionRequest {
    pub fn new(
        image_path: impl Into<PathBuf>,
        provider_id: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            provider_id: provider_id.into(),
            instruction: instruction.into(),
        }
    }
}

/// Outcome of one extraction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// 1-based position in the configured provider list.
    pub index: usize,
    pub provider_id: String,
    pub label: String,
    /// Model output, verbatim. Empty when `error` is set.
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Set when the call failed.
    pub error: Option<ProviderError>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The tagged view: the text on success, the typed failure otherwise.
    pub fn outcome(&self) -> Result<&str, &ProviderError> {
        match &self.error {
            None => Ok(&self.text),
            Some(e) => Err(e),
        }
    }

    /// What a judge would be shown for this result: the text, or the
    /// failure description.
    pub fn candidate_text(&self) -> String {
        match &self.error {
            None => self.text.clone(),
            Some(e) => e.to_string(),
        }
    }
}

/// Runs extraction calls against a [`CompletionProvider`].
#[derive(Clone)]
pub struct Extractor {
    provider: Arc<dyn CompletionProvider>,
    media_type: MediaTypePolicy,
}

impl Extractor {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            media_type: MediaTypePolicy::default(),
        }
    }

    pub fn with_media_type(mut self, policy: MediaTypePolicy) -> Self {
        self.media_type = policy;
        self
    }

    /// Read the image named by `request` and run one extraction.
    ///
    /// # Errors
    /// Image problems (missing, unreadable, unknown type) are returned as
    /// `Err` before any network call. Provider failures are not: they are
    /// stored in [`ExtractionResult::error`].
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ReceiptError> {
        if request.instruction.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Extraction instruction must not be empty".into(),
            ));
        }
        let image = load_image(&request.image_path, &self.media_type).await?;
        let spec = ProviderSpec::from_id(request.provider_id.clone());
        Ok(self.extract_image(&image, &spec, 1, &request.instruction).await)
    }

    /// Run one extraction against an already-loaded image.
    pub async fn extract_image(
        &self,
        image: &ImagePayload,
        spec: &ProviderSpec,
        index: usize,
        instruction: &str,
    ) -> ExtractionResult {
        let start = Instant::now();
        let request = CompletionRequest::new(
            spec.id.clone(),
            vec![ChatMessage::user_with_image(instruction, image.data_url())],
        );

        match self.provider.complete(&request).await {
            Ok(completion) => {
                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    spec.id, completion.prompt_tokens, completion.completion_tokens, duration
                );
                ExtractionResult {
                    index,
                    provider_id: spec.id.clone(),
                    label: spec.label.clone(),
                    text: completion.content,
                    input_tokens: completion.prompt_tokens,
                    output_tokens: completion.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{}: extraction failed — {}", spec.id, e);
                ExtractionResult {
                    index,
                    provider_id: spec.id.clone(),
                    label: spec.label.clone(),
                    text: String::new(),
                    input_tokens: 0,
                    output_tokens: 0,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(status: u16, body: &str) -> ExtractionResult {
        ExtractionResult {
            index: 2,
            provider_id: "qwen/qwen-2-vl-7b-instruct".into(),
            label: "Qwen-2V".into(),
            text: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 12,
            error: Some(ProviderError::TransportFailure {
                provider_id: "qwen/qwen-2-vl-7b-instruct".into(),
                status,
                body: body.into(),
            }),
        }
    }

    #[test]
    fn failed_result_candidate_text_is_failure_message() {
        let r = failed(500, "error");
        assert!(!r.is_success());
        assert_eq!(
            r.candidate_text(),
            "Request failed with status code 500: error"
        );
        assert_eq!(r.outcome().unwrap_err().status(), Some(500));
    }

    #[test]
    fn successful_outcome_is_text() {
        let mut r = failed(500, "x");
        r.error = None;
        r.text = "\\begin{tabular}{l}\\end{tabular}".into();
        assert_eq!(r.outcome(), Ok("\\begin{tabular}{l}\\end{tabular}"));
    }

    #[test]
    fn result_serialises_error_inline() {
        let json = serde_json::to_value(failed(503, "busy")).unwrap();
        assert_eq!(json["error"]["kind"], "transport_failure");
        assert_eq!(json["error"]["status"], 503);
        assert_eq!(json["label"], "Qwen-2V");
    }
}
