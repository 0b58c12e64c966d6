//! Document store persisted to a single JSON file.
//!
//! The whole database is one JSON object mapping document paths to
//! documents. Every write serialises the full map to a temp file in the same
//! directory and renames it over the target, so a crash mid-write never
//! leaves a truncated database. The in-memory copy is only updated after the
//! rename succeeds.

use super::{apply_set, apply_update, DocPath, Document, DocumentStore, SetOptions};
use crate::error::{PipelineError, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON-file backed [`DocumentStore`].
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    docs: Mutex<BTreeMap<DocPath, Document>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the database file at `path`.
    ///
    /// A missing file yields an empty store; an unreadable or corrupt file is
    /// fatal because writing over it would lose data.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let docs = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => parse_database(&text).map_err(|detail| {
                PipelineError::StoreUnavailable(format!("'{}': {detail}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Database file {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(PipelineError::StoreUnavailable(format!(
                    "'{}': {e}",
                    path.display()
                )))
            }
        };
        debug!("Opened {} with {} documents", path.display(), docs.len());
        Ok(Self {
            path,
            docs: Mutex::new(docs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `next` to disk, then swap it in.
    async fn commit(
        &self,
        docs: &mut BTreeMap<DocPath, Document>,
        key: &DocPath,
        doc: Document,
    ) -> Result<(), StoreError> {
        let mut next = docs.clone();
        next.insert(key.clone(), doc);

        let serialisable: BTreeMap<&str, &Document> =
            next.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let bytes = serde_json::to_vec_pretty(&serialisable).map_err(|e| StoreError::Backend {
            path: key.to_string(),
            detail: e.to_string(),
        })?;

        let target = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| StoreError::Backend {
                path: key.to_string(),
                detail: format!("write task panicked: {e}"),
            })?
            .map_err(|e| StoreError::Backend {
                path: key.to_string(),
                detail: e.to_string(),
            })?;

        *docs = next;
        Ok(())
    }
}

fn parse_database(text: &str) -> Result<BTreeMap<DocPath, Document>, StoreError> {
    let raw: BTreeMap<String, Value> =
        serde_json::from_str(text).map_err(|e| StoreError::Backend {
            path: "<root>".into(),
            detail: e.to_string(),
        })?;
    raw.into_iter()
        .map(|(k, v)| {
            let path = k.parse::<DocPath>()?;
            match v {
                Value::Object(doc) => Ok((path, doc)),
                _ => Err(StoreError::NotAnObject { path: k }),
            }
        })
        .collect()
}

fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.lock().await.get(path).cloned())
    }

    async fn set(
        &self,
        path: &DocPath,
        value: Document,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        let next = apply_set(docs.get(path).cloned(), value, options.merge);
        self.commit(&mut docs, path, next).await
    }

    async fn update(&self, path: &DocPath, partial: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        let next = apply_update(path, docs.get(path).cloned(), partial)?;
        self.commit(&mut docs, path, next).await
    }
}
