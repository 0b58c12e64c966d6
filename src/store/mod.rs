//! Document-store abstraction used by the reconciler.
//!
//! The store is document-oriented and addressed by collection/key paths,
//! mirroring a Firestore-style database:
//!
//! ```text
//! funds/{fundId}                                   { name, latestUnit, … }
//! priceHistory/{fundId}/historical/{YYYY-MM-DD}    { date, price }
//! ```
//!
//! Two engines ship with the crate: [`memory::MemoryStore`] for tests and
//! dry runs, and [`json_file::JsonFileStore`] which persists the same map to
//! a single JSON file with atomic writes.

pub mod json_file;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Collection holding one document per fund.
pub const FUNDS_COLLECTION: &str = "funds";
/// Collection holding per-fund price history.
pub const PRICE_HISTORY_COLLECTION: &str = "priceHistory";
/// Sub-collection of a price-history document keyed by date.
pub const HISTORY_SUBCOLLECTION: &str = "historical";
/// Field on a fund document overwritten with the newest price.
pub const LATEST_UNIT_FIELD: &str = "latestUnit";

/// Slash-separated document path (`collection/key[/collection/key…]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    /// Build a path from segments. Empty segments and segments containing
    /// `/` are rejected so that every path maps to exactly one document.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        let joined = parts.join("/");
        if parts.is_empty() || parts.len() % 2 != 0 {
            return Err(StoreError::Backend {
                path: joined,
                detail: "document paths need collection/key pairs".into(),
            });
        }
        if parts.iter().any(|p| p.is_empty() || p.contains('/')) {
            return Err(StoreError::Backend {
                path: joined,
                detail: "path segments must be non-empty and contain no '/'".into(),
            });
        }
        Ok(Self(joined))
    }

    /// `funds/{fund_id}`
    pub fn fund(fund_id: &str) -> Result<Self, StoreError> {
        Self::from_segments([FUNDS_COLLECTION, fund_id])
    }

    /// `priceHistory/{fund_id}/historical/{date_key}`
    pub fn price_history(fund_id: &str, date_key: &str) -> Result<Self, StoreError> {
        Self::from_segments([
            PRICE_HISTORY_COLLECTION,
            fund_id,
            HISTORY_SUBCOLLECTION,
            date_key,
        ])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segments(s.split('/'))
    }
}

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// Storage interface for fund and price-history documents.
///
/// Implementations must make `set` and `update` atomic per document: a
/// failed call leaves the previous document untouched.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Read a document; `Ok(None)` when absent.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document. With `merge`, fields not present in
    /// `value` survive and nested objects are merged recursively.
    async fn set(&self, path: &DocPath, value: Document, options: SetOptions)
        -> Result<(), StoreError>;

    /// Overwrite the given top-level fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document is absent.
    async fn update(&self, path: &DocPath, partial: Document) -> Result<(), StoreError>;
}

// ── Shared write semantics ───────────────────────────────────────────────

/// Compute the document produced by `set`.
pub(crate) fn apply_set(existing: Option<Document>, value: Document, merge: bool) -> Document {
    match (existing, merge) {
        (Some(mut current), true) => {
            merge_into(&mut current, value);
            current
        }
        _ => value,
    }
}

/// Compute the document produced by `update`.
pub(crate) fn apply_update(
    path: &DocPath,
    existing: Option<Document>,
    partial: Document,
) -> Result<Document, StoreError> {
    let mut current = existing.ok_or_else(|| StoreError::NotFound {
        path: path.to_string(),
    })?;
    for (k, v) in partial {
        current.insert(k, v);
    }
    Ok(current)
}

fn merge_into(target: &mut Document, source: Document) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

// ── Decimal ↔ JSON ───────────────────────────────────────────────────────

/// Encode a price as a JSON number built from its exact decimal text.
///
/// `serde_json` is built with `arbitrary_precision`, so the number keeps
/// the decimal's exact text (`121231233.54777123` stays as written).
pub fn price_to_value(price: &Decimal) -> Value {
    match Number::from_str(&price.to_string()) {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(price.to_string()),
    }
}

/// Decode a stored price (JSON number or numeric string).
pub fn price_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_number(n),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Convert a JSON number to a decimal through its textual form.
///
/// With `arbitrary_precision` the number prints exactly as it appeared in
/// the source JSON. Exponent notation is handled by the scientific parser.
pub(crate) fn decimal_from_number(n: &Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
