use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Stable document identifier. Allocated monotonically, never reused.
pub type DocId = u64;

/// Metadata tracked for every file the index has ever seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Last modification time (seconds since the Unix epoch)
    pub last_modified: u64,
    /// SHA256 hash of file contents
    pub content_hash: String,
    /// Number of indexed terms (sum of all posting frequencies)
    pub term_count: u64,
    /// Timestamp when file was last indexed
    pub indexed_at: u64,
    /// Set once the file disappears from disk
    pub tombstoned: bool,
}

impl Document {
    fn new(id: DocId, path: PathBuf, last_modified: u64, content_hash: String) -> Self {
        Self {
            id,
            path,
            last_modified,
            content_hash,
            term_count: 0,
            indexed_at: now_secs(),
            tombstoned: false,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.tombstoned
    }
}

/// Assigns identifiers to files and tracks their content state.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: BTreeMap<DocId, Document>,
    /// Live documents only
    by_path: HashMap<PathBuf, DocId>,
    next_id: DocId,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted rows.
    pub fn from_documents(documents: Vec<Document>, next_id: DocId) -> Result<Self> {
        let mut store = Self {
            next_id,
            ..Self::default()
        };

        for doc in documents {
            if doc.id >= next_id {
                return Err(Error::CorruptPersistedIndex(format!(
                    "document id {} is not below next id {}",
                    doc.id, next_id
                )));
            }
            if doc.is_live() {
                if let Some(other) = store.by_path.insert(doc.path.clone(), doc.id) {
                    return Err(Error::CorruptPersistedIndex(format!(
                        "documents {} and {} share live path {}",
                        other,
                        doc.id,
                        doc.path.display()
                    )));
                }
            }
            if store.documents.insert(doc.id, doc).is_some() {
                return Err(Error::CorruptPersistedIndex(
                    "duplicate document id".to_string(),
                ));
            }
        }

        Ok(store)
    }

    /// Record the current content of `path`.
    ///
    /// Returns the document id and whether the content differs from what was
    /// last indexed. An unchanged file is left untouched. A path whose
    /// previous document was tombstoned is treated as new.
    pub fn register_or_update(
        &mut self,
        path: &Path,
        content: &[u8],
        last_modified: u64,
    ) -> (DocId, bool) {
        let hash = hash_content(content);

        if let Some(&id) = self.by_path.get(path) {
            if let Some(doc) = self.documents.get_mut(&id) {
                if doc.content_hash == hash {
                    return (id, false);
                }
                doc.content_hash = hash;
                doc.last_modified = last_modified;
                doc.indexed_at = now_secs();
                return (id, true);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.documents
            .insert(id, Document::new(id, path.to_path_buf(), last_modified, hash));
        self.by_path.insert(path.to_path_buf(), id);
        (id, true)
    }

    /// Mark a document removed. Returns false if it was unknown or already
    /// tombstoned.
    pub fn tombstone(&mut self, id: DocId) -> bool {
        match self.documents.get_mut(&id) {
            Some(doc) if doc.is_live() => {
                doc.tombstoned = true;
                doc.term_count = 0;
                self.by_path.remove(&doc.path);
                true
            }
            _ => false,
        }
    }

    pub fn set_term_count(&mut self, id: DocId, term_count: u64) {
        if let Some(doc) = self.documents.get_mut(&id) {
            doc.term_count = term_count;
        }
    }

    /// Path of a document, tombstoned or not
    pub fn resolve(&self, id: DocId) -> Option<&Path> {
        self.documents.get(&id).map(|doc| doc.path.as_path())
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn lookup_path(&self, path: &Path) -> Option<DocId> {
        self.by_path.get(path).copied()
    }

    pub fn is_live(&self, id: DocId) -> bool {
        self.documents.get(&id).map(Document::is_live).unwrap_or(false)
    }

    /// Live documents whose path lies under `root`, in id order.
    pub fn live_under(&self, root: &Path) -> Vec<DocId> {
        self.documents
            .values()
            .filter(|doc| doc.is_live() && doc.path.starts_with(root))
            .map(|doc| doc.id)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.by_path.len()
    }

    /// All documents ever seen, including tombstones
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn next_id(&self) -> DocId {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }
}

/// SHA256 of a byte buffer as lowercase hex
pub fn hash_content(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Get file modification time as Unix timestamp
pub fn get_file_modified_time(metadata: &std::fs::Metadata) -> Result<u64> {
    let modified = metadata.modified()?;
    let duration = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to get modification time: {}", e),
            ))
        })?;
    Ok(duration.as_secs())
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
