//! Service configuration.
//!
//! All runtime behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. The binary maps CLI flags / environment
//! variables onto the builder; tests build configs directly.

use crate::error::CupomError;
use crate::prompts::{default_image_prompt, default_text_prompt};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the receipt extraction service.
///
/// # Example
/// ```rust
/// use cupom_fiscal::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .workers(4)
///     .extraction_timeout_secs(Some(90))
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on. Default: `0.0.0.0:5000`.
    pub bind_addr: SocketAddr,

    /// edgequake-llm provider name. Default: `"gemini"`.
    pub provider_name: String,

    /// Model identifier. Default: `"gemini-1.5-flash"`.
    pub model: String,

    /// Environment variable holding the extractor credential.
    /// Default: `"GEMINI_API_KEY"`.
    pub credential_env: String,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription, not generation; keep it near zero.
    pub temperature: f32,

    /// Maximum tokens the model may generate per receipt. Default: 4096.
    ///
    /// Long supermarket receipts with 80+ items approach 3 000 output tokens.
    pub max_tokens: usize,

    /// Extractions running at the same time. Default: 8.
    pub workers: usize,

    /// Submissions waiting for a worker before new ones get 503. Default: 256.
    pub queue_capacity: usize,

    /// Per-extraction timeout in seconds. Default: `Some(120)`.
    ///
    /// `None` waits on the extractor indefinitely; a hung call then leaves
    /// its job in `processing` forever.
    pub extraction_timeout_secs: Option<u64>,

    /// Largest accepted request body in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Custom prompt for image submissions. If None, uses the built-in one.
    pub image_prompt: Option<String>,

    /// Custom prompt for text submissions. If None, uses the built-in one.
    pub text_prompt: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            provider_name: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            credential_env: "GEMINI_API_KEY".to_string(),
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            workers: 8,
            queue_capacity: 256,
            extraction_timeout_secs: Some(120),
            max_upload_bytes: 10 * 1024 * 1024,
            image_prompt: None,
            text_prompt: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("credential_env", &self.credential_env)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("image_prompt", &self.image_prompt.as_ref().map(|_| "<custom>"))
            .field("text_prompt", &self.text_prompt.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check that the extractor credential is present.
    ///
    /// Skipped when a pre-built provider is configured, since that provider
    /// already carries whatever credential it needs.
    pub fn require_credential(&self) -> Result<(), CupomError> {
        if self.provider.is_some() {
            return Ok(());
        }
        match std::env::var(&self.credential_env) {
            Ok(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(CupomError::MissingCredential {
                var: self.credential_env.clone(),
            }),
        }
    }

    pub fn extraction_timeout(&self) -> Option<Duration> {
        self.extraction_timeout_secs.map(Duration::from_secs)
    }

    /// The prompt for image submissions, custom or built-in.
    pub fn resolved_image_prompt(&self) -> String {
        self.image_prompt.clone().unwrap_or_else(default_image_prompt)
    }

    /// The prompt for text submissions, custom or built-in.
    pub fn resolved_text_prompt(&self) -> String {
        self.text_prompt.clone().unwrap_or_else(default_text_prompt)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn credential_env(mut self, var: impl Into<String>) -> Self {
        self.config.credential_env = var.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n.max(1);
        self
    }

    /// `Some(0)` is treated as `None` (no timeout).
    pub fn extraction_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.extraction_timeout_secs = secs.filter(|s| *s > 0);
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.image_prompt = Some(prompt.into());
        self
    }

    pub fn text_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.text_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, CupomError> {
        let c = &self.config;
        if c.provider.is_none() && c.provider_name.trim().is_empty() {
            return Err(CupomError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(CupomError::InvalidConfig("model must not be empty".into()));
        }
        if c.credential_env.trim().is_empty() {
            return Err(CupomError::InvalidConfig(
                "credential variable name must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(CupomError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_upload_bytes < 1024 {
            return Err(CupomError::InvalidConfig(format!(
                "max_upload_bytes must be at least 1024, got {}",
                c.max_upload_bytes
            )));
        }
        Ok(self.config)
    }
}
