//! In-process document store.

use super::{apply_set, apply_update, DocPath, Document, DocumentStore, SetOptions};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A `BTreeMap` of documents keyed by path.
///
/// The lock is never held across an `.await`, so a std lock is enough.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocPath, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of documents.
    pub fn with_documents(docs: impl IntoIterator<Item = (DocPath, Document)>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().collect()),
        }
    }

    /// Insert or replace a document directly, bypassing the trait.
    pub fn insert(&self, path: DocPath, doc: Document) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(path, doc);
        }
    }

    /// Copy of every stored document, ordered by path.
    pub fn snapshot(&self) -> BTreeMap<DocPath, Document> {
        self.docs.read().map(|d| d.clone()).unwrap_or_default()
    }

    /// Number of documents whose path starts with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.docs
            .read()
            .map(|d| d.keys().filter(|k| k.as_str().starts_with(prefix)).count())
            .unwrap_or(0)
    }

    fn poisoned(path: &DocPath) -> StoreError {
        StoreError::Backend {
            path: path.to_string(),
            detail: "memory store lock poisoned".into(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().map_err(|_| Self::poisoned(path))?;
        Ok(docs.get(path).cloned())
    }

    async fn set(
        &self,
        path: &DocPath,
        value: Document,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(|_| Self::poisoned(path))?;
        let next = apply_set(docs.get(path).cloned(), value, options.merge);
        docs.insert(path.clone(), next);
        Ok(())
    }

    async fn update(&self, path: &DocPath, partial: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(|_| Self::poisoned(path))?;
        let next = apply_update(path, docs.get(path).cloned(), partial)?;
        docs.insert(path.clone(), next);
        Ok(())
    }
}
