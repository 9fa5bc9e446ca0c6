//! Document store seam: collections of documents addressed by path, read
//! with an optional equality filter and written through atomic batches.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{CollectionPath, DocumentPath, FieldChange, Fields, Mutation, Record, Write};

pub mod json;
pub mod memory;

pub use json::JsonDocumentStore;
pub use memory::MemoryDocumentStore;

/// Transactional write limit of the document store
pub const MAX_BATCH_WRITES: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt store snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("batch of {0} writes exceeds the limit of {}", MAX_BATCH_WRITES)]
    BatchTooLarge(usize),
    #[error("cannot update missing document {0}")]
    MissingDocument(String),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Igualdad simple `campo == valor`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Writes queued for one atomic commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.writes.push(mutation);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Mutation] {
        &self.writes
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.writes.iter().map(|m| m.target.to_string()).collect()
    }
}

#[cfg(test)]
impl WriteBatch {
    pub(crate) fn set(&mut self, target: DocumentPath, fields: Fields) {
        self.push(Mutation::set(target, fields));
    }

    pub(crate) fn delete_field(&mut self, target: DocumentPath, field: impl Into<String>) {
        self.push(Mutation::update(target, [(field.into(), FieldChange::Delete)]));
    }
}

/// Capability the migration commands need from the target store
pub trait DocumentStore {
    /// All documents of a collection in id order, optionally filtered
    fn stream(
        &self,
        collection: &CollectionPath,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Root collections that currently hold documents
    fn list_collections(&self) -> Result<Vec<CollectionPath>, StoreError>;

    /// Applies every write of the batch or none of them
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// In-memory document tree shared by the store backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    collections: BTreeMap<CollectionPath, BTreeMap<String, Fields>>,
}

impl Database {
    pub fn get(&self, path: &DocumentPath) -> Option<&Fields> {
        self.collections.get(&path.collection)?.get(&path.id)
    }

    pub fn insert(&mut self, path: DocumentPath, fields: Fields) {
        self.collections
            .entry(path.collection)
            .or_default()
            .insert(path.id, fields);
    }

    pub fn stream(&self, collection: &CollectionPath, filter: Option<&FieldFilter>) -> Vec<Record> {
        let Some(docs) = self.collections.get(collection) else {
            return Vec::new();
        };
        docs.iter()
            .filter(|(_, fields)| filter.map_or(true, |f| f.matches(fields)))
            .map(|(id, fields)| Record::new(id.clone(), fields.clone()))
            .collect()
    }

    pub fn root_collections(&self) -> Vec<CollectionPath> {
        self.collections
            .iter()
            .filter(|(path, docs)| path.is_root() && !docs.is_empty())
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }

    /// Validates the whole batch first, then applies it
    pub fn apply(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge(batch.len()));
        }

        // Updates may target documents created earlier in the same batch
        let mut created: Vec<&DocumentPath> = Vec::new();
        for mutation in batch.writes() {
            validate_path(&mutation.target)?;
            match &mutation.write {
                Write::Set(_) => created.push(&mutation.target),
                Write::Update(_) => {
                    if self.get(&mutation.target).is_none() && !created.contains(&&mutation.target) {
                        return Err(StoreError::MissingDocument(mutation.target.to_string()));
                    }
                }
            }
        }

        for mutation in batch.writes() {
            match &mutation.write {
                Write::Set(fields) => self.insert(mutation.target.clone(), fields.clone()),
                Write::Update(changes) => {
                    let doc = self
                        .collections
                        .entry(mutation.target.collection.clone())
                        .or_default()
                        .entry(mutation.target.id.clone())
                        .or_default();
                    for (field, change) in changes {
                        match change {
                            FieldChange::Set(value) => {
                                doc.insert(field.clone(), value.clone());
                            }
                            FieldChange::Delete => {
                                doc.remove(field);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_path(path: &DocumentPath) -> Result<(), StoreError> {
    let bad_segment = |s: &str| s.is_empty() || s.contains('/');
    let segments: Vec<&str> = path.collection.segments().collect();
    // colección, (doc, colección)*
    if segments.len() % 2 == 0 || segments.iter().any(|s| s.is_empty()) || bad_segment(&path.id) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}
