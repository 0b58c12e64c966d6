//! Extraction: one PDF attachment → an [`ExtractionResult`].
//!
//! The reader returns free-form text. Models are told to answer with a bare
//! JSON array but regularly wrap it in a code fence or a sentence, so the
//! response goes through a fixed ladder:
//!
//! 1. strip an outer Markdown fence and parse the whole text;
//! 2. scan each `[` in turn for a bracket-balanced, string-aware `[...]`
//!    slice that parses as a JSON array;
//! 3. give up with `parse_failed`, keeping the raw text for diagnosis.
//!
//! A response that is valid JSON but not an array (`{"funds": [...]}`)
//! falls through to step 2, so the first array nested inside it is used.

use crate::model::{Attachment, ExtractionOutcome, ExtractionResult};
use crate::prompts::extraction_instruction;
use crate::reader::DocumentReader;
use crate::registry::FundRegistry;
use crate::error::ReaderError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n?(.*?)\n?```\s*$").unwrap());

/// Hint returned when no backend is available.
pub const NOT_CONFIGURED_HINT: &str =
    "no document-understanding backend configured; set OPENAI_API_KEY or choose a vision provider";

/// Sends attachments to the configured reader and parses the answer.
pub struct Extractor {
    reader: Option<Arc<dyn DocumentReader>>,
    instruction: String,
    timeout: Duration,
}

impl Extractor {
    pub fn new(
        reader: Option<Arc<dyn DocumentReader>>,
        registry: &FundRegistry,
        timeout: Duration,
    ) -> Self {
        Self {
            reader,
            instruction: extraction_instruction(registry),
            timeout,
        }
    }

    /// False when extraction would only ever return `ai_not_configured`.
    pub fn is_configured(&self) -> bool {
        self.reader.is_some()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Extract one attachment. Never fails: every problem becomes an outcome.
    pub async fn extract(&self, attachment: &Attachment) -> ExtractionResult {
        let Some(reader) = &self.reader else {
            return ExtractionResult::new(
                &attachment.filename,
                ExtractionOutcome::AiNotConfigured {
                    hint: NOT_CONFIGURED_HINT.to_string(),
                },
            );
        };

        let start = Instant::now();
        info!(
            "Extracting {} ({} bytes) with {}",
            attachment.filename,
            attachment.size(),
            reader.name()
        );

        let response =
            match tokio::time::timeout(self.timeout, reader.read(attachment, &self.instruction))
                .await
            {
                Ok(r) => r,
                Err(_) => Err(ReaderError::Timeout {
                    backend: reader.name().to_string(),
                    secs: self.timeout.as_secs(),
                }),
            };

        let outcome = match response {
            Ok(text) => {
                debug!("{}: raw response {:?}", attachment.filename, text);
                parse_response(&text)
            }
            Err(ReaderError::NotConfigured { hint, .. }) => {
                ExtractionOutcome::AiNotConfigured { hint }
            }
            Err(e) => {
                warn!("{}: extraction failed: {}", attachment.filename, e);
                ExtractionOutcome::ServiceError {
                    message: e.to_string(),
                }
            }
        };

        let result = ExtractionResult::new(&attachment.filename, outcome);
        info!(
            "{}: {} ({} items) in {:?}",
            attachment.filename,
            result.status(),
            result.items().len(),
            start.elapsed()
        );
        result
    }
}

/// Run the parse ladder over a model response.
pub fn parse_response(text: &str) -> ExtractionOutcome {
    let stripped = strip_outer_fence(text);

    let whole = match serde_json::from_str::<Value>(stripped) {
        Ok(Value::Array(items)) => return records(items),
        Ok(other) => Some(json_kind(&other)),
        Err(_) => None,
    };

    if let Some(items) = first_embedded_array(stripped) {
        return records(items);
    }

    let reason = match whole {
        Some(kind) => format!("response is JSON but not an array ({kind}) and holds none"),
        None => "no JSON array found in response".to_string(),
    };
    parse_failed(reason, text)
}

fn records(items: Vec<Value>) -> ExtractionOutcome {
    if items.is_empty() {
        ExtractionOutcome::Empty
    } else {
        ExtractionOutcome::Records { items }
    }
}

fn parse_failed(reason: String, raw: &str) -> ExtractionOutcome {
    ExtractionOutcome::ParseFailed {
        reason,
        raw_response: raw.to_string(),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip_outer_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// First `[...]` slice, tried from each `[` in order, that parses as an array.
fn first_embedded_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(start, _)| {
        let end = balanced_end(text, start)?;
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        }
    })
}

/// Byte offset just past the `]` closing the `[` at `start`.
///
/// Brackets inside JSON string literals are ignored. Only ASCII bytes are
/// inspected, so the returned offset is always a char boundary.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
