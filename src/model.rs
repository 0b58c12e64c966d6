//! Values that flow through a single pipeline run.
//!
//! Everything here is ephemeral: records and extraction results live only
//! for the duration of one run. Persistent shapes (funds, price history)
//! are owned by [`crate::store`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated unit price for one fund on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundRecord {
    pub fund_id: String,
    pub date: NaiveDate,
    /// Full precision as printed in the report; never rounded.
    pub price: Decimal,
}

impl FundRecord {
    pub fn new(fund_id: impl Into<String>, date: NaiveDate, price: Decimal) -> Self {
        Self {
            fund_id: fund_id.into(),
            date,
            price,
        }
    }

    /// The `YYYY-MM-DD` key used for the price-history document.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// A message found by the attachment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHandle {
    pub id: String,
    pub received_at: DateTime<Utc>,
}

/// A binary document delivered with a message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Declared as a PDF by its filename (case-insensitive `.pdf`).
    pub fn is_pdf(&self) -> bool {
        self.filename.to_ascii_lowercase().ends_with(".pdf")
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Outcome of extracting one attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// The model returned a JSON array with at least one element.
    Records { items: Vec<Value> },
    /// The model returned an empty JSON array.
    Empty,
    /// No document-understanding backend is configured.
    AiNotConfigured { hint: String },
    /// The response did not contain a JSON array.
    ParseFailed { reason: String, raw_response: String },
    /// The backend call failed.
    ServiceError { message: String },
}

/// Per-attachment extraction result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    pub fn new(filename: impl Into<String>, outcome: ExtractionOutcome) -> Self {
        Self {
            filename: filename.into(),
            outcome,
        }
    }

    /// Raw items to hand to the validator; empty for every non-record outcome.
    pub fn items(&self) -> &[Value] {
        match &self.outcome {
            ExtractionOutcome::Records { items } => items,
            _ => &[],
        }
    }

    /// Short tag for logs and summaries.
    pub fn status(&self) -> &'static str {
        match self.outcome {
            ExtractionOutcome::Records { .. } => "records",
            ExtractionOutcome::Empty => "empty",
            ExtractionOutcome::AiNotConfigured { .. } => "ai_not_configured",
            ExtractionOutcome::ParseFailed { .. } => "parse_failed",
            ExtractionOutcome::ServiceError { .. } => "service_error",
        }
    }

    pub fn is_service_error(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::ServiceError { .. })
    }
}
