//! Progress-callback trait for pipeline run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves through a run. The CLI uses it to drive
//! a spinner; the server leaves it unset and relies on tracing logs.
//!
//! # Example
//!
//! ```rust
//! use fundprice_ingest::{PipelineConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SavedCounter(AtomicUsize);
//!
//! impl RunProgressCallback for SavedCounter {
//!     fn on_record_saved(&self, _fund_id: &str, _date: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .sender("reports@example.com")
//!     .progress_callback(Arc::new(SavedCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Runs are single-flow, so calls never overlap within
/// one run, but implementations must still be `Send + Sync` because the
/// server shares one config across requests.
pub trait RunProgressCallback: Send + Sync {
    /// Called once when the run starts, before the source is queried.
    fn on_run_start(&self) {}

    /// Called after the source search, with the number of matching messages.
    fn on_messages_found(&self, count: usize) {
        let _ = count;
    }

    /// Called just before an attachment is sent to the extractor.
    ///
    /// # Arguments
    /// * `filename` — declared attachment filename
    /// * `index`    — 1-indexed position among the selected attachments
    /// * `total`    — number of selected attachments
    fn on_attachment_start(&self, filename: &str, index: usize, total: usize) {
        let _ = (filename, index, total);
    }

    /// Called when extraction and validation of an attachment are done.
    ///
    /// # Arguments
    /// * `status`   — extraction status tag (`records`, `parse_failed`, …)
    /// * `accepted` — records that passed validation
    /// * `rejected` — records the validator discarded
    fn on_attachment_complete(&self, filename: &str, status: &str, accepted: usize, rejected: usize) {
        let _ = (filename, status, accepted, rejected);
    }

    /// Called after a record's fund and price-history writes both succeeded.
    fn on_record_saved(&self, fund_id: &str, date: &str) {
        let _ = (fund_id, date);
    }

    /// Called once the run reaches a terminal success state.
    fn on_run_complete(&self, saved: usize, rejected: usize, errored: usize) {
        let _ = (saved, rejected, errored);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
