//! OpenRouter (OpenAI-compatible) chat-completions client.
//!
//! One POST per call to `{base_url}/chat/completions` with a bearer
//! credential. The reqwest client carries the bounded wait, so a hung
//! backend surfaces as [`ProviderError::Timeout`] rather than blocking the
//! ensemble forever.

use super::{Completion, CompletionProvider, CompletionRequest};
use crate::error::{ProviderError, ReceiptError};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default endpoint root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Environment variable consulted when no credential is passed explicitly.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl fmt::Debug for OpenRouterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenRouterProvider {
    /// Client for the public OpenRouter endpoint with a 60 s bounded wait.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ReceiptError> {
        Self::with_options(api_key, DEFAULT_BASE_URL, 60)
    }

    /// Client for any OpenAI-compatible endpoint.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ReceiptError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ReceiptError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout_secs,
        })
    }

    /// Build from `OPENROUTER_API_KEY`.
    pub fn from_env(base_url: &str, timeout_secs: u64) -> Result<Self, ReceiptError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Self::with_options(key, base_url, timeout_secs),
            _ => Err(ReceiptError::ProviderNotConfigured {
                hint: format!("Set {API_KEY_ENV} or pass --api-key."),
            }),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn classify(&self, model: &str, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider_id: model.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            ProviderError::TransportException {
                provider_id: model.to_string(),
                cause: error_chain(&err),
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(&request.model, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify(&request.model, e))?;

        debug!(
            "{}: HTTP {} ({} bytes) in {:?}",
            request.model,
            status,
            body.len(),
            start.elapsed()
        );

        interpret_response(&request.model, status, &body)
    }
}

/// Turn a raw HTTP exchange into a completion or a typed failure.
///
/// Non-2xx statuses keep the exact status and body. A 2xx body must carry at
/// least one choice; its message text is returned verbatim.
pub fn interpret_response(
    model: &str,
    status: u16,
    body: &str,
) -> Result<Completion, ProviderError> {
    if !(200..300).contains(&status) {
        return Err(ProviderError::TransportFailure {
            provider_id: model.to_string(),
            status,
            body: body.to_string(),
        });
    }

    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            provider_id: model.to_string(),
            detail: format!("invalid JSON body: {e}"),
        })?;

    let usage = parsed.usage;
    let Some(first) = parsed.choices.into_iter().next() else {
        let detail = match parsed.error {
            Some(api) => format!("provider error: {}", api.message),
            None => "response contained no choices".to_string(),
        };
        return Err(ProviderError::MalformedResponse {
            provider_id: model.to_string(),
            detail,
        });
    };

    Ok(Completion {
        content: first.message.content.unwrap_or_default(),
        prompt_tokens: usage.as_ref().map_or(0, |u| u.prompt_tokens),
        completion_tokens: usage.as_ref().map_or(0, |u| u.completion_tokens),
    })
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(s) = source {
        let text = s.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = s.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_returns_first_choice_verbatim() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "  \\begin{tabular}{lll}\n"}},
                {"message": {"role": "assistant", "content": "second"}}
            ],
            "usage": {"prompt_tokens": 812, "completion_tokens": 95}
        }"#;
        let c = interpret_response("mistralai/pixtral-12b", 200, body).unwrap();
        assert_eq!(c.content, "  \\begin{tabular}{lll}\n");
        assert_eq!(c.prompt_tokens, 812);
        assert_eq!(c.completion_tokens, 95);
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let body = r#"{"choices":[{"message":{"content":"x"}}]}"#;
        let c = interpret_response("m", 200, body).unwrap();
        assert_eq!(c.prompt_tokens, 0);
        assert_eq!(c.completion_tokens, 0);
    }

    #[test]
    fn null_content_is_empty_text() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        let c = interpret_response("m", 200, body).unwrap();
        assert_eq!(c.content, "");
    }

    #[test]
    fn non_success_preserves_status_and_body() {
        let body = r#"{"error":{"message":"Rate limit exceeded","code":429}}"#;
        let err = interpret_response("qwen/qwen-2-vl-7b-instruct", 429, body).unwrap_err();
        assert_eq!(
            err,
            ProviderError::TransportFailure {
                provider_id: "qwen/qwen-2-vl-7b-instruct".into(),
                status: 429,
                body: body.into(),
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains(body));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = interpret_response("m", 200, r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn in_band_error_is_reported() {
        let body = r#"{"error":{"message":"Provider returned error","code":502}}"#;
        match interpret_response("m", 200, body).unwrap_err() {
            ProviderError::MalformedResponse { detail, .. } => {
                assert!(detail.contains("Provider returned error"), "got: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = interpret_response("m", 200, "<html>gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let p = OpenRouterProvider::with_options("k", "http://localhost:8080/v1/", 5).unwrap();
        assert_eq!(p.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn debug_redacts_key() {
        let p = OpenRouterProvider::new("sk-or-secret").unwrap();
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("sk-or-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
