use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Database, DocumentStore, FieldFilter, StoreError, WriteBatch};
use crate::credentials::ServiceAccount;
use crate::file_utils::{format_bytes, write_atomically};
use crate::models::{CollectionPath, Record};

/// Store backed by one JSON snapshot per project.
///
/// Each commit validates the batch against a copy of the tree, writes the
/// new snapshot to a temp file and renames it into place, so the file on
/// disk only ever holds fully-committed batches.
#[derive(Debug)]
pub struct JsonDocumentStore {
    path: PathBuf,
    db: Database,
}

impl JsonDocumentStore {
    /// Opens `<store_dir>/<project_id>.json`, starting empty when the
    /// snapshot does not exist yet
    pub fn connect(store_dir: &Path, account: &ServiceAccount) -> Result<Self, StoreError> {
        if !store_dir.is_dir() {
            return Err(StoreError::MissingDirectory(store_dir.to_path_buf()));
        }
        let path = store_dir.join(format!("{}.json", account.project_id));
        let store = Self::open(path)?;
        info!(
            "Connected to document store. Project: {} ({} documents)",
            account.project_id,
            store.db.document_count()
        );
        Ok(store)
    }

    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let db = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let db: Database = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
            debug!("Loaded snapshot {} ({})", path.display(), format_bytes(raw.len() as u64));
            db
        } else {
            Database::default()
        };
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn persist(&self, db: &Database) -> Result<(), StoreError> {
        let raw = serde_json::to_vec_pretty(db).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        write_atomically(&self.path, &raw).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl DocumentStore for JsonDocumentStore {
    fn stream(
        &self,
        collection: &CollectionPath,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.db.stream(collection, filter))
    }

    fn list_collections(&self) -> Result<Vec<CollectionPath>, StoreError> {
        Ok(self.db.root_collections())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut next = self.db.clone();
        next.apply(&batch)?;
        self.persist(&next)?;
        self.db = next;
        Ok(())
    }
}
