use super::{Database, DocumentStore, FieldFilter, StoreError, WriteBatch};
use crate::models::{CollectionPath, DocumentPath, Fields, Record};

/// In-process store. Keeps the size of every accepted commit and can be
/// told to reject a given commit, which is how flush failures are tested.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    db: Database,
    commits: Vec<usize>,
    attempts: usize,
    reject_attempt: Option<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I>(docs: I) -> Self
    where
        I: IntoIterator<Item = (DocumentPath, Fields)>,
    {
        let mut store = Self::new();
        for (path, fields) in docs {
            store.db.insert(path, fields);
        }
        store
    }

    pub fn insert(&mut self, path: DocumentPath, fields: Fields) {
        self.db.insert(path, fields);
    }

    /// Rejects the n-th commit attempt (1-based)
    pub fn reject_commit(&mut self, attempt: usize) {
        self.reject_attempt = Some(attempt);
    }

    pub fn clear_rejection(&mut self) {
        self.reject_attempt = None;
    }

    /// Sizes of the accepted commits, in order
    pub fn commit_sizes(&self) -> &[usize] {
        &self.commits
    }

    pub fn get(&self, path: &DocumentPath) -> Option<&Fields> {
        self.db.get(path)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl DocumentStore for MemoryDocumentStore {
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
        self.attempts += 1;
        if self.reject_attempt == Some(self.attempts) {
            return Err(StoreError::Rejected(format!(
                "commit #{} refused by test store",
                self.attempts
            )));
        }
        let mut next = self.db.clone();
        next.apply(&batch)?;
        self.db = next;
        self.commits.push(batch.len());
        Ok(())
    }
}
