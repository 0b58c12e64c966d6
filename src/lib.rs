//! # fundprice-ingest
//!
//! Extract daily investment-fund unit prices from an emailed PDF report and
//! reconcile them into a document store.
//!
//! ## Why this crate?
//!
//! The fiduciary publishes unit values only as a PDF table attached to a
//! daily email. There is no API and the table layout drifts, so instead of
//! hand-written PDF parsing the document goes to a document-understanding
//! model with a strict instruction, and everything the model says is checked
//! before it touches storage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! mailbox
//!  │
//!  ├─ 1. Locate     newest matching message, its PDF attachments
//!  ├─ 2. Extract    one model call per PDF, JSON-array parse ladder
//!  ├─ 3. Validate   registry + schema checks, distinct reject reasons
//!  ├─ 4. Reconcile  funds/{id}.latestUnit + priceHistory/{id}/historical/{date}
//!  └─ 5. Summary    counts and per-record outcomes as JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fundprice_ingest::{DirectorySource, JsonFileStore, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .sender("reports@fiduciary.example")
//!         .openai_api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let store = JsonFileStore::open("data/mpfi-qa-firestore-db.json").await?;
//!     let pipeline = Pipeline::new(
//!         Arc::new(config),
//!         Arc::new(DirectorySource::new("inbox")),
//!         Arc::new(store),
//!     );
//!     let summary = pipeline.run().await?;
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP trigger ([`server`]) |
//! | `cli`    | on      | the `fundprice` binary (clap, anyhow, tracing-subscriber, indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reader;
pub mod registry;
pub mod run;
pub mod schedule;
#[cfg(feature = "server")]
pub mod server;
pub mod source;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Environment, PipelineConfig, PipelineConfigBuilder, ReaderKind};
pub use error::{PipelineError, ReaderError, StoreError};
pub use model::{Attachment, ExtractionOutcome, ExtractionResult, FundRecord, MessageHandle};
pub use output::{
    AttachmentReport, ReconcileReport, RecordOutcome, RejectReason, Rejection, RunOutcome,
    RunResponse, RunSummary, ValidationReport,
};
pub use pipeline::extract::Extractor;
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use reader::{build_reader, connection_check, DocumentReader, OpenAiFileReader, VisionReader};
pub use registry::{FundRegistry, KnownFund};
pub use run::{extract_document, Pipeline};
pub use schedule::Scheduler;
pub use source::{AttachmentSource, DirectorySource, GmailSource, SearchQuery};
pub use store::{DocPath, Document, DocumentStore, JsonFileStore, MemoryStore, SetOptions};
