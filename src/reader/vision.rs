//! Page-image reader: renders the PDF and asks any vision-capable LLM.
//!
//! All rendered pages go into a single user turn together with the
//! instruction, so the model sees the whole report at once. This backend
//! works with every provider `edgequake-llm` supports, not only OpenAI.

use super::DocumentReader;
use crate::config::{PipelineConfig, DEFAULT_VISION_MODEL};
use crate::error::ReaderError;
use crate::model::Attachment;
use crate::pipeline::{encode, render};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const BACKEND: &str = "vision";

/// System turn for the page-image reader.
const VISION_SYSTEM_PROMPT: &str = "You read scanned financial reports. \
Answer strictly in the format the user asks for.";

pub struct VisionReader {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_pages: usize,
}

impl VisionReader {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_pages: config.max_pages,
        }
    }

    /// Resolve a provider from the configuration and environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ReaderError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ReaderError> {
        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify(e.to_string()))?;
        debug!(
            "vision: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Resolve the LLM provider, from most to least specific:
///
/// 1. a pre-built provider on the config;
/// 2. `provider_name` + `model` from the config;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, ReaderError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);

    if let Some(name) = &config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if config.has_openai_key() || std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    ProviderFactory::from_env()
        .map(|(llm, _embedding)| llm)
        .map_err(|e| ReaderError::NotConfigured {
            backend: BACKEND.into(),
            hint: format!(
                "no LLM provider could be detected; set OPENAI_API_KEY, ANTHROPIC_API_KEY or \
EDGEQUAKE_LLM_PROVIDER ({e})"
            ),
        })
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReaderError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| ReaderError::NotConfigured {
        backend: format!("{BACKEND}:{name}"),
        hint: e.to_string(),
    })
}

/// Map a provider error message onto the reader error kinds.
fn classify(message: String) -> ReaderError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("incorrect api key")
    {
        ReaderError::Auth {
            backend: BACKEND.into(),
            detail: message,
        }
    } else {
        ReaderError::Service {
            backend: BACKEND.into(),
            message,
        }
    }
}

#[async_trait]
impl DocumentReader for VisionReader {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn read(&self, attachment: &Attachment, instruction: &str) -> Result<String, ReaderError> {
        let pages =
            render::render_pdf(&attachment.filename, attachment.bytes.clone(), self.max_pages)
                .await?;
        let images = encode::encode_pages(&attachment.filename, &pages)?;
        debug!("{}: sending {} page images", attachment.filename, images.len());

        self.chat(vec![
            ChatMessage::system(VISION_SYSTEM_PROMPT),
            ChatMessage::user_with_images(instruction, images),
        ])
        .await
    }

    async fn ask(&self, prompt: &str) -> Result<String, ReaderError> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }
}
