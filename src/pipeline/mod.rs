//! Stages of the extraction-and-reconciliation pipeline.
//!
//! Each submodule implements one step and is testable on its own; the
//! orchestrator in [`crate::run`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! attachment ──▶ extract ──▶ validate ──▶ reconcile
//!   (PDF)        (reader +    (registry    (store
//!                 parse)       + schema)    writes)
//! ```
//!
//! 1. [`extract`]   — one reader call per PDF, then the JSON-array parse
//!    ladder; the only stage with network I/O
//! 2. [`validate`]  — pure filtering of raw items into [`crate::model::FundRecord`]s
//! 3. [`reconcile`] — per-record upserts with isolated failures
//!
//! [`render`] and [`encode`] prepare payloads for the reader backends.

pub mod encode;
pub mod extract;
pub mod reconcile;
pub mod render;
pub mod validate;
