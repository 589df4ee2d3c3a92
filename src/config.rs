//! Configuration types for an ensemble extraction run.
//!
//! All run behaviour is controlled through [`EnsembleConfig`], built via its
//! [`EnsembleConfigBuilder`]. The credential lives here, scoped to the config
//! instance, and is handed to the provider when the run starts.

use crate::error::ReceiptError;
use crate::progress::ProgressCallback;
use crate::provider::CompletionProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default judge model.
pub const DEFAULT_JUDGE_MODEL: &str = "cohere/command-r";

/// One extraction backend: the model identifier sent to the provider plus a
/// human-readable label for progress output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub id: String,
    pub label: String,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Spec whose label is the model id itself.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
        }
    }
}

/// The three vision backends used when the caller names none.
pub fn default_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new("mistralai/pixtral-12b", "PixTral 12B"),
        ProviderSpec::new("qwen/qwen-2-vl-7b-instruct", "Qwen-2V"),
        ProviderSpec::new("meta-llama/llama-3.2-11b-vision-instruct:free", "LLaMA-3.2"),
    ]
}

/// Configuration for one ensemble run.
///
/// # Example
/// ```rust
/// use receipt2latex::{CandidatePolicy, EnsembleConfig};
///
/// let config = EnsembleConfig::builder()
///     .model("mistralai/pixtral-12b")
///     .model("qwen/qwen-2-vl-7b-instruct")
///     .judge_model("cohere/command-r")
///     .candidate_policy(CandidatePolicy::ExcludeFailed)
///     .build()
///     .unwrap();
/// assert_eq!(config.providers.len(), 2);
/// ```
#[derive(Clone)]
pub struct EnsembleConfig {
    /// Extraction backends, in the order their candidates are numbered.
    pub providers: Vec<ProviderSpec>,

    /// Model that judges the candidates. Default: `cohere/command-r`.
    pub judge_model: String,

    /// Provider credential. If None, `OPENROUTER_API_KEY` is read at run start.
    pub api_key: Option<String>,

    /// Endpoint root for the OpenAI-compatible API.
    pub base_url: String,

    /// Bounded wait per completion call, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Maximum extraction calls in flight. Default: 4.
    pub concurrency: usize,

    /// Issue extraction calls strictly one after another. Default: false.
    pub sequential: bool,

    /// Extraction instruction. If None, uses [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub instruction: Option<String>,

    /// Judge criteria header. If None, uses [`crate::prompts::DEFAULT_JUDGE_PROMPT`].
    pub judge_prompt: Option<String>,

    /// What the judge sees of failed extractions. Default: [`CandidatePolicy::PassThrough`].
    pub candidate_policy: CandidatePolicy,

    /// How the image data-URL media type is chosen. Default: [`MediaTypePolicy::Sniff`].
    pub media_type: MediaTypePolicy,

    /// Pre-constructed provider. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn CompletionProvider>>,

    /// Optional per-provider progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            api_key: None,
            base_url: crate::provider::openrouter::DEFAULT_BASE_URL.to_string(),
            api_timeout_secs: 60,
            concurrency: 4,
            sequential: false,
            instruction: None,
            judge_prompt: None,
            candidate_policy: CandidatePolicy::default(),
            media_type: MediaTypePolicy::default(),
            provider: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EnsembleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleConfig")
            .field("providers", &self.providers)
            .field("judge_model", &self.judge_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("sequential", &self.sequential)
            .field("candidate_policy", &self.candidate_policy)
            .field("media_type", &self.media_type)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn CompletionProvider>"))
            .finish()
    }
}

impl EnsembleConfig {
    /// Check the constraints [`EnsembleConfigBuilder::build`] enforces.
    ///
    /// Run entry points call this too, since the fields are public and a
    /// config can be assembled without the builder.
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if self.providers.is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "At least one extraction model is required".into(),
            ));
        }
        if let Some(p) = self.providers.iter().find(|p| p.id.trim().is_empty()) {
            return Err(ReceiptError::InvalidConfig(format!(
                "Model id must not be empty (label '{}')",
                p.label
            )));
        }
        if self.judge_model.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Judge model must not be empty".into(),
            ));
        }
        if self.instruction.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ReceiptError::InvalidConfig(
                "Extraction instruction must not be empty".into(),
            ));
        }
        if self.api_timeout_secs == 0 {
            return Err(ReceiptError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ReceiptError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let MediaTypePolicy::Declared(ref mime) = self.media_type {
            if !mime.starts_with("image/") {
                return Err(ReceiptError::InvalidConfig(format!(
                    "Declared media type must be image/*, got '{mime}'"
                )));
            }
        }
        Ok(())
    }

    /// Create a new builder for `EnsembleConfig`.
    pub fn builder() -> EnsembleConfigBuilder {
        EnsembleConfigBuilder {
            config: Self::default(),
            explicit_providers: false,
        }
    }
}

/// Builder for [`EnsembleConfig`].
///
/// The first call to [`model`](Self::model) or [`provider_spec`](Self::provider_spec)
/// replaces the default backend list; later calls append.
pub struct EnsembleConfigBuilder {
    config: EnsembleConfig,
    explicit_providers: bool,
}

impl fmt::Debug for EnsembleConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl EnsembleConfigBuilder {
    pub fn provider_spec(mut self, spec: ProviderSpec) -> Self {
        if !self.explicit_providers {
            self.config.providers.clear();
            self.explicit_providers = true;
        }
        self.config.providers.push(spec);
        self
    }

    pub fn model(self, id: impl Into<String>) -> Self {
        self.provider_spec(ProviderSpec::from_id(id))
    }

    pub fn providers(mut self, specs: Vec<ProviderSpec>) -> Self {
        self.config.providers = specs;
        self.explicit_providers = true;
        self
    }

    pub fn judge_model(mut self, model: impl Into<String>) -> Self {
        self.config.judge_model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn sequential(mut self, v: bool) -> Self {
        self.config.sequential = v;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn judge_prompt(mut self, text: impl Into<String>) -> Self {
        self.config.judge_prompt = Some(text.into());
        self
    }

    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.config.candidate_policy = policy;
        self
    }

    pub fn media_type(mut self, policy: MediaTypePolicy) -> Self {
        self.config.media_type = policy;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EnsembleConfig, ReceiptError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the judge is shown of extractions that failed.
///
/// | Policy | Judge sees |
/// |--------|------------|
/// | `PassThrough` | the failure text as an ordinary option (default) |
/// | `ExcludeFailed` | only successful extractions, renumbered from 1 |
/// | `Annotate` | the failure text, labelled `Option N (extraction failed):` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePolicy {
    #[default]
    PassThrough,
    ExcludeFailed,
    Annotate,
}

/// How the media type in the image data URL is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaTypePolicy {
    /// Detect from the file's magic bytes; unknown signatures are an error. (default)
    #[default]
    Sniff,
    /// Always declare `image/jpeg`, whatever the bytes are.
    AssumeJpeg,
    /// Use the caller-declared media type, e.g. `image/png`.
    Declared(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let c = EnsembleConfig::default();
        assert_eq!(c.providers.len(), 3);
        assert_eq!(c.providers[0].id, "mistralai/pixtral-12b");
        assert_eq!(c.judge_model, "cohere/command-r");
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.candidate_policy, CandidatePolicy::PassThrough);
        assert_eq!(c.media_type, MediaTypePolicy::Sniff);
    }

    #[test]
    fn first_model_replaces_defaults() {
        let c = EnsembleConfig::builder()
            .model("a/one")
            .model("b/two")
            .build()
            .unwrap();
        let ids: Vec<_> = c.providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a/one", "b/two"]);
        assert_eq!(c.providers[1].label, "b/two");
    }

    #[test]
    fn empty_provider_list_rejected() {
        let err = EnsembleConfig::builder().providers(vec![]).build().unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidConfig(_)));
    }

    #[test]
    fn blank_model_id_rejected() {
        let err = EnsembleConfig::builder().model("  ").build().unwrap_err();
        assert!(err.to_string().contains("Model id"));
    }

    #[test]
    fn blank_instruction_rejected() {
        let err = EnsembleConfig::builder().instruction("\n").build().unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(EnsembleConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = EnsembleConfig::builder().concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("Concurrency"));
    }

    #[test]
    fn validate_catches_fields_set_without_builder() {
        let mut c = EnsembleConfig::default();
        assert!(c.validate().is_ok());
        c.concurrency = 0;
        assert!(matches!(c.validate(), Err(ReceiptError::InvalidConfig(_))));
    }

    #[test]
    fn declared_media_type_must_be_image() {
        let err = EnsembleConfig::builder()
            .media_type(MediaTypePolicy::Declared("text/plain".into()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = EnsembleConfig::builder().api_key("sk-or-v1-abc").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-or-v1-abc"));
    }
}
