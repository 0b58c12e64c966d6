//! Reports produced by the pipeline stages and the run as a whole.
//!
//! Every report here is plain data with `Serialize`, so the HTTP trigger and
//! the CLI can return the same JSON body.

use crate::error::PipelineError;
use crate::model::{ExtractionResult, FundRecord};
use serde::Serialize;
use std::fmt;

// ── Validation ───────────────────────────────────────────────────────────

/// Why the validator discarded a raw item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum RejectReason {
    NotAnObject,
    MissingFundId,
    UnknownFund(String),
    MissingDate,
    InvalidDate(String),
    MissingPrice,
    InvalidPrice(String),
    NegativePrice(String),
}

impl RejectReason {
    /// Stable tag for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotAnObject => "not_an_object",
            RejectReason::MissingFundId => "missing_fund_id",
            RejectReason::UnknownFund(_) => "unknown_fund",
            RejectReason::MissingDate => "missing_date",
            RejectReason::InvalidDate(_) => "invalid_date",
            RejectReason::MissingPrice => "missing_price",
            RejectReason::InvalidPrice(_) => "invalid_price",
            RejectReason::NegativePrice(_) => "negative_price",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAnObject => f.write_str("item is not a JSON object"),
            RejectReason::MissingFundId => f.write_str("missing fundId"),
            RejectReason::UnknownFund(id) => write!(f, "unknown fund '{id}'"),
            RejectReason::MissingDate => f.write_str("missing date"),
            RejectReason::InvalidDate(d) => write!(f, "invalid date '{d}'"),
            RejectReason::MissingPrice => f.write_str("missing price"),
            RejectReason::InvalidPrice(p) => write!(f, "invalid price '{p}'"),
            RejectReason::NegativePrice(p) => write!(f, "negative price {p}"),
        }
    }
}

/// A discarded item and its position in the extracted array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub index: usize,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// Output of the validator for one extracted array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub records: Vec<FundRecord>,
    pub rejects: Vec<Rejection>,
}

// ── Reconciliation ───────────────────────────────────────────────────────

/// What happened to one record in the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Fund `latestUnit` updated and the history entry upserted.
    Saved,
    /// `funds/{fundId}` does not exist; nothing written.
    MissingFund,
    /// A storage call failed; earlier writes for this record may stand.
    Errored { message: String },
}

/// Per-record line of a [`ReconcileReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub fund_id: String,
    pub date: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

/// Tally of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub saved: usize,
    pub rejected_missing_fund: usize,
    pub errored: usize,
    pub outcomes: Vec<RecordResult>,
}

impl ReconcileReport {
    /// Fold one record result into the tally.
    pub fn push(mut self, result: RecordResult) -> Self {
        match result.outcome {
            RecordOutcome::Saved => self.saved += 1,
            RecordOutcome::MissingFund => self.rejected_missing_fund += 1,
            RecordOutcome::Errored { .. } => self.errored += 1,
        }
        self.outcomes.push(result);
        self
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

// ── Run ──────────────────────────────────────────────────────────────────

/// What one attachment contributed to the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentReport {
    #[serde(flatten)]
    pub extraction: ExtractionResult,
    /// Extraction calls made, including retries.
    pub attempts: u32,
    pub accepted: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejects: Vec<Rejection>,
}

/// Terminal success state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Reconciliation ran with at least one validated record.
    Saved,
    /// Reconciliation ran with zero validated records.
    NothingToSave,
    /// No matching message, or the message carried no PDF.
    NoAttachment,
    /// PDFs were found but no extraction backend is configured.
    ExtractionUnavailable,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Saved => "saved",
            RunOutcome::NothingToSave => "nothing_to_save",
            RunOutcome::NoAttachment => "no_attachment",
            RunOutcome::ExtractionUnavailable => "extraction_unavailable",
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub saved: usize,
    /// Validator rejects plus records whose fund does not exist.
    pub rejected: usize,
    pub errored: usize,
    pub attachments: Vec<AttachmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// A run that stopped before extraction.
    pub fn no_attachment(message_id: Option<String>, duration_ms: u64) -> Self {
        Self {
            outcome: RunOutcome::NoAttachment,
            message_id,
            saved: 0,
            rejected: 0,
            errored: 0,
            attachments: Vec::new(),
            reconcile: None,
            duration_ms,
        }
    }

    /// Human-readable one-liner for the response body.
    pub fn message(&self) -> String {
        match self.outcome {
            RunOutcome::Saved => format!(
                "Daily processing completed: {} saved, {} rejected, {} errored",
                self.saved, self.rejected, self.errored
            ),
            RunOutcome::NothingToSave => {
                "Daily processing completed: no fund prices to save".to_string()
            }
            RunOutcome::NoAttachment => {
                "Daily processing completed: no report email with a PDF attachment found"
                    .to_string()
            }
            RunOutcome::ExtractionUnavailable => "Daily processing completed without extraction: \
no document-understanding backend is configured (set OPENAI_API_KEY)"
                .to_string(),
        }
    }
}

/// Body returned by the HTTP trigger and printed by `fundprice run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn from_result(result: &Result<RunSummary, PipelineError>) -> Self {
        match result {
            Ok(summary) => Self {
                success: true,
                message: summary.message(),
                data: Some(summary.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                message: "There was a problem processing the report emails".to_string(),
                data: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// 200 for every terminal success state, 500 for a fatal error.
    pub fn status_code(&self) -> u16 {
        if self.success {
            200
        } else {
            500
        }
    }
}
