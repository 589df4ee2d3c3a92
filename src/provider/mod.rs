//! Completion providers: the seam between the ensemble and the network.
//!
//! The extractor and the selector only ever see [`CompletionProvider`]. The
//! shipped implementation, [`openrouter::OpenRouterProvider`], speaks the
//! OpenAI-compatible `chat/completions` protocol; tests plug in scripted
//! in-memory providers through the same trait.
//!
//! A request names its model in [`CompletionRequest::model`], so one provider
//! instance (one credential, one HTTP client) serves every extraction
//! backend and the judge.

pub mod openrouter;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openrouter::OpenRouterProvider;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Image reference inside a content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Either an `https://` URL or a `data:<mime>;base64,<payload>` URL.
    pub url: String,
}

/// One item of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// User turn carrying only text.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// User turn carrying an instruction followed by one embedded image.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ],
        }
    }

    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single-shot chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    /// Provider-side model identifier, e.g. `mistralai/pixtral-12b`.
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// The first choice of a successful completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Message text, verbatim.
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// An external service that turns a chat request into generated text.
///
/// Implementations perform exactly one exchange per call: no retries, no
/// caching. Every failure is reported as a typed [`ProviderError`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Send `request` and return the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_message_serialises_as_openai_content_parts() {
        let msg = ChatMessage::user_with_image("Extract items", "data:image/jpeg;base64,AAAA");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "Extract items");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn request_carries_model() {
        let req = CompletionRequest::new("cohere/command-r", vec![ChatMessage::user_text("hi")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "cohere/command-r");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn text_skips_image_parts() {
        let msg = ChatMessage::user_with_image("only this", "data:image/png;base64,AA");
        assert_eq!(msg.text(), "only this");
    }
}
