//! Run orchestration: locate → extract → validate → reconcile.
//!
//! ```text
//! start ─▶ search ─▶ select most recent ─┬─ none / no PDF ──────────▶ no_attachment
//!                                         └─ PDFs ─▶ extract (each) ─▶ validate
//!                                                          └────────▶ reconcile ─▶ summary
//! ```
//!
//! Only source failures and store-open failures abort a run. Everything that
//! goes wrong for one attachment or one record is recorded in the
//! [`RunSummary`] and the run still reports success.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::{Attachment, ExtractionOutcome, ExtractionResult, FundRecord};
use crate::output::{AttachmentReport, RunOutcome, RunSummary, ValidationReport};
use crate::pipeline::extract::Extractor;
use crate::pipeline::reconcile::reconcile;
use crate::pipeline::validate::validate_items;
use crate::progress::RunProgressCallback;
use crate::reader::{build_reader, DocumentReader};
use crate::registry::FundRegistry;
use crate::source::{select_most_recent, AttachmentSource, SearchQuery};
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

/// One configured pipeline: a source, an extractor and a store.
///
/// Cheap to share behind an `Arc`; the server and the scheduler both hold
/// one and call [`Pipeline::run_with_timeout`] for each trigger.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    source: Arc<dyn AttachmentSource>,
    store: Arc<dyn DocumentStore>,
    extractor: Extractor,
}

impl Pipeline {
    /// Build with the reader selected by `config`.
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Arc<dyn AttachmentSource>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let reader = build_reader(&config);
        Self::with_reader(config, source, reader, store)
    }

    /// Build with an explicit reader (`None` = extraction not configured).
    pub fn with_reader(
        config: Arc<PipelineConfig>,
        source: Arc<dyn AttachmentSource>,
        reader: Option<Arc<dyn DocumentReader>>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let extractor = Extractor::new(
            reader,
            &config.registry,
            Duration::from_secs(config.api_timeout_secs),
        );
        Self {
            config,
            source,
            store,
            extractor,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// [`Pipeline::run`] bounded by `run_timeout_secs`.
    pub async fn run_with_timeout(&self) -> Result<RunSummary, PipelineError> {
        let secs = self.config.run_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), self.run())
            .await
            .map_err(|_| PipelineError::Timeout { secs })?
    }

    /// Execute one run.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let progress = self.config.progress_callback.as_deref();
        if let Some(cb) = progress {
            cb.on_run_start();
        }
        info!(
            "Run started: source={}, store={}, environment={}",
            self.source.name(),
            self.store.name(),
            self.config.environment
        );

        // ── Locate ───────────────────────────────────────────────────────
        let query = SearchQuery::from_config(&self.config);
        let messages = self.source.search_recent(&query).await?;
        if let Some(cb) = progress {
            cb.on_messages_found(messages.len());
        }

        let Some(message) = select_most_recent(&messages) else {
            info!("No report email found from {}", query.sender);
            return Ok(self.finish_empty(None, start, progress));
        };
        info!(
            "Processing message {} received {}",
            message.id, message.received_at
        );

        let pdfs: Vec<Attachment> = self
            .source
            .fetch_attachments(message)
            .await?
            .into_iter()
            .filter(Attachment::is_pdf)
            .collect();
        if pdfs.is_empty() {
            info!("Message {} carries no PDF attachment", message.id);
            return Ok(self.finish_empty(Some(message.id.clone()), start, progress));
        }

        // ── Extract + validate ───────────────────────────────────────────
        let total = pdfs.len();
        let mut reports = Vec::with_capacity(total);
        let mut records: Vec<FundRecord> = Vec::new();
        let mut validation_rejected = 0usize;

        for (i, pdf) in pdfs.iter().enumerate() {
            if i > 0 && self.extractor.is_configured() && self.config.extraction_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.extraction_delay_ms)).await;
            }
            if let Some(cb) = progress {
                cb.on_attachment_start(&pdf.filename, i + 1, total);
            }

            let (extraction, attempts) = self.extract_with_retry(pdf).await;
            let validation = validate_items(extraction.items(), &self.config.registry);
            log_rejects(&extraction.filename, &validation);

            if let Some(cb) = progress {
                cb.on_attachment_complete(
                    &pdf.filename,
                    extraction.status(),
                    validation.records.len(),
                    validation.rejects.len(),
                );
            }

            validation_rejected += validation.rejects.len();
            let accepted = validation.records.len();
            records.extend(validation.records);
            reports.push(AttachmentReport {
                extraction,
                attempts,
                accepted,
                rejects: validation.rejects,
            });
        }

        // ── Reconcile ────────────────────────────────────────────────────
        let reconcile_report = reconcile(self.store.as_ref(), &records, progress).await;

        let outcome = if reports
            .iter()
            .all(|r| matches!(r.extraction.outcome, ExtractionOutcome::AiNotConfigured { .. }))
        {
            RunOutcome::ExtractionUnavailable
        } else if records.is_empty() {
            RunOutcome::NothingToSave
        } else {
            RunOutcome::Saved
        };

        let summary = RunSummary {
            outcome,
            message_id: Some(message.id.clone()),
            saved: reconcile_report.saved,
            rejected: validation_rejected + reconcile_report.rejected_missing_fund,
            errored: reconcile_report.errored,
            attachments: reports,
            reconcile: Some(reconcile_report),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if let Some(cb) = progress {
            cb.on_run_complete(summary.saved, summary.rejected, summary.errored);
        }
        info!(
            "Run finished: {} ({} saved, {} rejected, {} errored) in {}ms",
            outcome.as_str(),
            summary.saved,
            summary.rejected,
            summary.errored,
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Extract one attachment, retrying service errors with exponential backoff.
    async fn extract_with_retry(&self, pdf: &Attachment) -> (ExtractionResult, u32) {
        let mut attempt = 0u32;
        loop {
            let result = self.extractor.extract(pdf).await;
            attempt += 1;
            if !result.is_service_error() || attempt > self.config.max_retries {
                return (result, attempt);
            }
            let backoff = self
                .config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                pdf.filename, attempt, self.config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
    }

    fn finish_empty(
        &self,
        message_id: Option<String>,
        start: Instant,
        progress: Option<&dyn RunProgressCallback>,
    ) -> RunSummary {
        if let Some(cb) = progress {
            cb.on_run_complete(0, 0, 0);
        }
        RunSummary::no_attachment(message_id, start.elapsed().as_millis() as u64)
    }
}

/// Extract and validate one local document without touching storage.
pub async fn extract_document(
    extractor: &Extractor,
    registry: &FundRegistry,
    attachment: &Attachment,
) -> (ExtractionResult, ValidationReport) {
    let extraction = extractor.extract(attachment).await;
    let validation = validate_items(extraction.items(), registry);
    log_rejects(&attachment.filename, &validation);
    (extraction, validation)
}

fn log_rejects(filename: &str, validation: &ValidationReport) {
    for reject in &validation.rejects {
        warn!(
            "{}: item {} rejected ({}): {}",
            filename,
            reject.index,
            reject.reason.code(),
            reject.reason
        );
    }
}
