//! The document-extractor seam and its VLM-backed implementation.
//!
//! [`DocumentExtractor`] is the only place the service talks to a model.
//! Everything upstream (validation, job bookkeeping) and downstream
//! (normalisation) is deterministic and testable without network access;
//! tests plug in a scripted extractor instead of [`LlmExtractor`].
//!
//! ## Message Layout
//!
//! 1. **System message** — the fixed extraction prompt
//! 2. **User message** — either the receipt image as a base64 attachment
//!    (empty text) or the receipt's raw text
//!
//! No retries happen here: a failed call fails the job, and the client
//! resubmits if it wants another attempt.

use crate::config::ServiceConfig;
use crate::error::{CupomError, ExtractorError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An encoded receipt image ready for a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub media_type: String,
    /// Base64 (standard alphabet) of the raw image bytes.
    pub encoded_bytes: String,
}

/// What gets sent to the extractor alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPayload {
    Image(ImagePayload),
    Text(String),
}

impl ExtractionPayload {
    /// Short label for logs; never includes the payload itself.
    pub fn describe(&self) -> String {
        match self {
            ExtractionPayload::Image(img) => {
                format!("{} ({} b64 chars)", img.media_type, img.encoded_bytes.len())
            }
            ExtractionPayload::Text(t) => format!("text ({} chars)", t.chars().count()),
        }
    }
}

/// Turns a receipt image or text into the model's raw textual answer.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        prompt: &str,
        payload: &ExtractionPayload,
    ) -> Result<String, ExtractorError>;
}

/// [`DocumentExtractor`] backed by an edgequake-llm provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build the extractor from configuration.
    ///
    /// A pre-built provider in the config is used as-is; otherwise the named
    /// provider is created through [`ProviderFactory`], which reads its API
    /// key from the environment.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CupomError> {
        let provider = match config.provider {
            Some(ref p) => Arc::clone(p),
            None => ProviderFactory::create_llm_provider(&config.provider_name, &config.model)
                .map_err(|e| CupomError::ProviderNotConfigured {
                    provider: config.provider_name.clone(),
                    hint: format!(
                        "Could not create provider with model '{}'. Check {}.\nError: {e}",
                        config.model, config.credential_env
                    ),
                })?,
        };
        info!(
            provider = %config.provider_name,
            model = %config.model,
            "Extractor ready"
        );
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl DocumentExtractor for LlmExtractor {
    async fn extract(
        &self,
        prompt: &str,
        payload: &ExtractionPayload,
    ) -> Result<String, ExtractorError> {
        let start = Instant::now();
        let messages = build_messages(prompt, payload);
        let options = build_options(self.temperature, self.max_tokens);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractorError::Api {
                message: e.to_string(),
            })?;

        debug!(
            "Extractor: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        // Empty answers are left for the normaliser to reject as invalid data.
        if response.content.trim().is_empty() {
            warn!("Extractor returned an empty response");
        }
        Ok(response.content)
    }
}

fn build_messages(prompt: &str, payload: &ExtractionPayload) -> Vec<ChatMessage> {
    let user = match payload {
        ExtractionPayload::Image(img) => ChatMessage::user_with_images(
            "",
            vec![ImageData::new(img.encoded_bytes.clone(), img.media_type.clone())],
        ),
        ExtractionPayload::Text(text) => ChatMessage::user(text.clone()),
    };
    vec![ChatMessage::system(prompt), user]
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ServiceConfig::default();
        let opts = build_options(config.temperature, config.max_tokens);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn messages_are_prompt_then_payload() {
        let payload = ExtractionPayload::Text("CUPOM FISCAL ...".into());
        let messages = build_messages("extract", &payload);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn describe_never_leaks_payload() {
        let img = ExtractionPayload::Image(ImagePayload {
            media_type: "image/png".into(),
            encoded_bytes: "c2VjcmV0".into(),
        });
        let label = img.describe();
        assert!(label.contains("image/png"));
        assert!(!label.contains("c2VjcmV0"));

        let text = ExtractionPayload::Text("CNPJ 00.000.000/0001-00".into());
        assert_eq!(text.describe(), "text (23 chars)");
    }
}
