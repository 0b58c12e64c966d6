//! Local directory source for manual runs and tests.
//!
//! Each `*.pdf` file in the directory is one "message" carrying one
//! attachment, timestamped by its modification time. Sender and subject
//! filters do not apply; the `within_days` window does.

use super::{AttachmentSource, SearchQuery};
use crate::error::PipelineError;
use crate::model::{Attachment, MessageHandle};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads report PDFs from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn transport(&self, detail: impl std::fmt::Display) -> PipelineError {
        PipelineError::SourceTransport {
            service: format!("dir:{}", self.dir.display()),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl AttachmentSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn search_recent(&self, query: &SearchQuery) -> Result<Vec<MessageHandle>, PipelineError> {
        let cutoff = Utc::now() - Duration::days(i64::from(query.within_days));
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.transport(e))?;

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.transport(e))? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if !is_pdf {
                continue;
            }
            let meta = entry.metadata().await.map_err(|e| self.transport(e))?;
            let modified: DateTime<Utc> = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            if modified < cutoff {
                debug!("Skipping {} (older than {} days)", path.display(), query.within_days);
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push(MessageHandle {
                    id: name.to_string(),
                    received_at: modified,
                });
            }
        }
        // read_dir order is platform-defined; make the source order stable.
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.truncate(query.max_results as usize);
        Ok(found)
    }

    async fn fetch_attachments(
        &self,
        message: &MessageHandle,
    ) -> Result<Vec<Attachment>, PipelineError> {
        let path: PathBuf = self.dir.join(Path::new(&message.id));
        let bytes = tokio::fs::read(&path).await.map_err(|e| self.transport(e))?;
        Ok(vec![Attachment::new(message.id.clone(), bytes)])
    }
}
