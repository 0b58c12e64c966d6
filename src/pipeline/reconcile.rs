//! Reconciliation: validated records → store writes.
//!
//! Each record is handled on its own:
//!
//! ```text
//! get    funds/{fundId}                                  absent → missing_fund
//! update funds/{fundId}                { latestUnit }
//! set    priceHistory/{fundId}/historical/{date}  { date, price }  (merge)
//! ```
//!
//! A failure on one record never stops the next one. The history entry is
//! keyed by fund and date, so reconciling the same record twice converges to
//! the same stored state.

use crate::model::FundRecord;
use crate::output::{ReconcileReport, RecordOutcome, RecordResult};
use crate::progress::RunProgressCallback;
use crate::store::{price_to_value, DocPath, Document, DocumentStore, SetOptions, LATEST_UNIT_FIELD};
use crate::error::StoreError;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Reconcile records sequentially, folding each outcome into the report.
pub async fn reconcile(
    store: &dyn DocumentStore,
    records: &[FundRecord],
    progress: Option<&dyn RunProgressCallback>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for record in records {
        let outcome = match reconcile_one(store, record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} {}: storage error: {}", record.fund_id, record.date_key(), e);
                RecordOutcome::Errored {
                    message: e.to_string(),
                }
            }
        };
        if outcome == RecordOutcome::Saved {
            if let Some(cb) = progress {
                cb.on_record_saved(&record.fund_id, &record.date_key());
            }
        }
        report = report.push(RecordResult {
            fund_id: record.fund_id.clone(),
            date: record.date_key(),
            outcome,
        });
    }

    info!(
        "Reconciled {} records on {}: {} saved, {} missing fund, {} errored",
        report.total(),
        store.name(),
        report.saved,
        report.rejected_missing_fund,
        report.errored
    );
    report
}

async fn reconcile_one(
    store: &dyn DocumentStore,
    record: &FundRecord,
) -> Result<RecordOutcome, StoreError> {
    let fund_path = DocPath::fund(&record.fund_id)?;
    if store.get(&fund_path).await?.is_none() {
        warn!("Fund not found: {}", record.fund_id);
        return Ok(RecordOutcome::MissingFund);
    }

    let price = price_to_value(&record.price);

    let mut latest = Document::new();
    latest.insert(LATEST_UNIT_FIELD.to_string(), price.clone());
    store.update(&fund_path, latest).await?;

    let date_key = record.date_key();
    let history_path = DocPath::price_history(&record.fund_id, &date_key)?;
    let mut entry = Document::new();
    entry.insert("date".to_string(), Value::String(date_key));
    entry.insert("price".to_string(), price);
    store.set(&history_path, entry, SetOptions::merge()).await?;

    debug!("Saved {} = {}", history_path, record.price);
    Ok(RecordOutcome::Saved)
}
