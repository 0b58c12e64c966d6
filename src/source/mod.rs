//! Attachment sources: where the daily PDF comes from.
//!
//! A source answers two questions: which messages match the search, and
//! which attachments a message carries. The orchestrator decides which
//! message to process via [`select_most_recent`] instead of trusting the
//! order the source happens to return.

pub mod dir;
pub mod gmail;

use crate::error::PipelineError;
use crate::model::{Attachment, MessageHandle};
use async_trait::async_trait;
use std::cmp::Ordering;

pub use dir::DirectorySource;
pub use gmail::GmailSource;

/// Filters applied when searching for the report message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub sender: String,
    pub subject: String,
    pub within_days: u32,
    pub max_results: u32,
}

impl SearchQuery {
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self {
            sender: config.sender.clone(),
            subject: config.subject.clone(),
            within_days: config.within_days,
            max_results: config.max_results,
        }
    }
}

/// Where report messages and their attachments come from.
///
/// Errors returned here are fatal to the run: a source that cannot
/// authenticate or cannot be reached leaves nothing to reconcile.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Messages matching the query. Zero results is a valid outcome.
    async fn search_recent(&self, query: &SearchQuery) -> Result<Vec<MessageHandle>, PipelineError>;

    /// All attachments of a message; the caller filters for PDFs.
    async fn fetch_attachments(&self, message: &MessageHandle)
        -> Result<Vec<Attachment>, PipelineError>;
}

/// Order messages newest first. Equal timestamps keep source order
/// (callers rely on a stable sort).
pub fn newest_first(a: &MessageHandle, b: &MessageHandle) -> Ordering {
    b.received_at.cmp(&a.received_at)
}

/// Pick the single message to process: the newest one, ties broken by the
/// order the source returned them in.
pub fn select_most_recent(messages: &[MessageHandle]) -> Option<&MessageHandle> {
    let mut ordered: Vec<&MessageHandle> = messages.iter().collect();
    ordered.sort_by(|a, b| newest_first(a, b));
    ordered.into_iter().next()
}
