//! Document-understanding backends.
//!
//! A [`DocumentReader`] takes one PDF and a natural-language instruction and
//! returns the model's free-form text answer. Parsing that answer is the
//! extractor's job, not the reader's.
//!
//! | Reader | Sends | Crates |
//! |--------|-------|--------|
//! | [`OpenAiFileReader`] | the PDF itself (base64 `input_file`) | `reqwest` |
//! | [`VisionReader`] | rendered PNG pages | `pdfium-render`, `edgequake-llm` |

pub mod openai;
pub mod vision;

use crate::config::{PipelineConfig, ReaderKind, DEFAULT_OPENAI_MODEL};
use crate::error::ReaderError;
use crate::model::Attachment;
use crate::prompts::CONNECTION_CHECK_PROMPT;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use openai::OpenAiFileReader;
pub use vision::VisionReader;

/// A backend that reads a PDF and answers an instruction about it.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Send one document plus the instruction; return the raw text answer.
    async fn read(&self, attachment: &Attachment, instruction: &str) -> Result<String, ReaderError>;

    /// Send a text-only prompt. Used to confirm credentials.
    async fn ask(&self, prompt: &str) -> Result<String, ReaderError>;
}

/// Build the reader selected by the configuration.
///
/// Returns `None` when the selected backend has no credentials; the
/// orchestrator then reports extraction as not configured instead of failing.
pub fn build_reader(config: &PipelineConfig) -> Option<Arc<dyn DocumentReader>> {
    match config.reader {
        ReaderKind::OpenAiFile => {
            let key = config.openai_api_key.as_deref().map(str::trim).unwrap_or("");
            if key.is_empty() {
                warn!("OPENAI_API_KEY is not set; PDF extraction is disabled");
                return None;
            }
            let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            match OpenAiFileReader::new(key, model, Duration::from_secs(config.api_timeout_secs)) {
                Ok(reader) => Some(Arc::new(reader)),
                Err(e) => {
                    warn!("OpenAI reader unavailable: {}", e);
                    None
                }
            }
        }
        ReaderKind::Vision => match VisionReader::from_config(config) {
            Ok(reader) => Some(Arc::new(reader)),
            Err(e) => {
                warn!("Vision reader unavailable: {}", e);
                None
            }
        },
    }
}

/// Send a trivial prompt and return the reply.
pub async fn connection_check(
    reader: &dyn DocumentReader,
    timeout: Duration,
) -> Result<String, ReaderError> {
    info!("Checking connection to {}", reader.name());
    match tokio::time::timeout(timeout, reader.ask(CONNECTION_CHECK_PROMPT)).await {
        Ok(reply) => reply.map(|r| r.trim().to_string()),
        Err(_) => Err(ReaderError::Timeout {
            backend: reader.name().to_string(),
            secs: timeout.as_secs(),
        }),
    }
}
