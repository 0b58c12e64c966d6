//! Error types for the fundprice-ingest library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed at all (mailbox
//!   authentication rejected, store unreadable, invalid configuration).
//!   Returned as `Err(PipelineError)` from [`crate::run::Pipeline::run`].
//!
//! * [`ReaderError`] — **Per attachment**: the document-understanding backend
//!   failed for one document. Converted into an
//!   [`crate::model::ExtractionResult`] so the run keeps going.
//!
//! * [`StoreError`] — **Per record**: a single storage operation failed.
//!   Converted into a [`crate::output::RecordOutcome`] by the reconciler.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Attachment source errors ─────────────────────────────────────────
    /// The mailbox rejected our credentials or the token exchange failed.
    #[error("Authentication with '{service}' failed: {detail}")]
    SourceAuth { service: String, detail: String },

    /// The mailbox could not be reached or returned an unexpected response.
    #[error("Transport error talking to '{service}': {detail}")]
    SourceTransport { service: String, detail: String },

    /// A credentials or token file could not be read or parsed.
    #[error("Cannot read credentials file '{path}': {detail}")]
    CredentialsUnreadable { path: PathBuf, detail: String },

    // ── Storage errors ───────────────────────────────────────────────────
    /// The document store could not be opened.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The fund registry file could not be loaded.
    #[error("Cannot load fund registry '{path}': {detail}")]
    RegistryUnreadable { path: PathBuf, detail: String },

    // ── Pdfium binding errors ────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Page rendering needs a pdfium shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or install libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    /// The run exceeded its execution budget.
    #[error("Run exceeded its {secs}s execution budget")]
    Timeout { secs: u64 },
}

/// A non-fatal error from a document-understanding backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    /// The backend has no usable credentials.
    #[error("Document-understanding backend '{backend}' is not configured: {hint}")]
    NotConfigured { backend: String, hint: String },

    /// The backend rejected our credentials (HTTP 401/403).
    #[error("Authentication error from '{backend}': {detail}")]
    Auth { backend: String, detail: String },

    /// The call did not finish within the configured timeout.
    #[error("Call to '{backend}' timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    /// The document could not be prepared for the backend (render, encode).
    #[error("Could not prepare '{filename}': {detail}")]
    Document { filename: String, detail: String },

    /// Any other service or network failure.
    #[error("Service error from '{backend}': {message}")]
    Service { backend: String, message: String },
}

/// A storage operation failure for a single document path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// `update` targeted a document that does not exist.
    #[error("Document '{path}' does not exist")]
    NotFound { path: String },

    /// A stored value is not a JSON object.
    #[error("Document '{path}' is not an object")]
    NotAnObject { path: String },

    /// The backing medium failed (file write, serialisation).
    #[error("Storage backend error at '{path}': {detail}")]
    Backend { path: String, detail: String },
}
