use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::storage::documents::{DocId, Document, DocumentStore};
use crate::storage::index::{InvertedIndex, Posting, PostingList};
use crate::storage::snapshot::{IndexSnapshot, SnapshotDelta};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key: document id. Value: JSON serialized Document
const DOCUMENTS_TABLE: TableDefinition<u64, &str> = TableDefinition::new("documents");

/// Key: term. Value: JSON serialized posting list
const POSTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("postings");

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const META_NEXT_ID_KEY: &str = "next_document_id";
const META_GENERATION_KEY: &str = "generation";

fn db_err<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Database(format!("{}: {}", what, e))
}

fn corrupt<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::CorruptPersistedIndex(format!("{}: {}", what, e))
}

/// On-disk copy of the published snapshot.
pub struct StateStore {
    db: Database,
    path: PathBuf,
}

impl StateStore {
    /// Open or create the state store
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_path(&config.index_path)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = if path.exists() {
            Database::open(path).map_err(|e| {
                let msg = e.to_string().to_lowercase();
                if msg.contains("lock") || msg.contains("already open") {
                    Error::Database(
                        "Index database is locked. Another vortex process may be running. \
                         Close other instances and try again."
                            .to_string(),
                    )
                } else {
                    Error::CorruptPersistedIndex(format!("Failed to open index database: {}", e))
                }
            })?
        } else {
            Database::create(path).map_err(db_err("Failed to create index database"))?
        };

        let store = Self {
            db,
            path: path.to_path_buf(),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Opening a table in a write transaction creates it if missing.
    fn ensure_tables(&self) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(db_err("Failed to open documents table"))?;
            write_txn
                .open_table(POSTINGS_TABLE)
                .map_err(db_err("Failed to open postings table"))?;
            write_txn
                .open_table(META_TABLE)
                .map_err(db_err("Failed to open meta table"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit transaction"))?;
        Ok(())
    }

    /// Load the persisted snapshot and check its invariants.
    pub fn load(&self) -> Result<IndexSnapshot> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;

        let meta = read_txn
            .open_table(META_TABLE)
            .map_err(db_err("Failed to open meta table"))?;
        let next_id = meta
            .get(META_NEXT_ID_KEY)
            .map_err(db_err("Failed to read next document id"))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let generation = meta
            .get(META_GENERATION_KEY)
            .map_err(db_err("Failed to read generation"))?
            .map(|guard| guard.value())
            .unwrap_or(0);

        let docs_table = read_txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(db_err("Failed to open documents table"))?;
        let mut documents = Vec::new();
        for item in docs_table
            .iter()
            .map_err(db_err("Failed to iterate documents"))?
        {
            let (key, value) = item.map_err(db_err("Failed to read document row"))?;
            let doc: Document =
                serde_json::from_str(value.value()).map_err(corrupt("Malformed document row"))?;
            if doc.id != key.value() {
                return Err(Error::CorruptPersistedIndex(format!(
                    "document row {} holds id {}",
                    key.value(),
                    doc.id
                )));
            }
            documents.push(doc);
        }

        let postings_table = read_txn
            .open_table(POSTINGS_TABLE)
            .map_err(db_err("Failed to open postings table"))?;
        let mut lists = Vec::new();
        for item in postings_table
            .iter()
            .map_err(db_err("Failed to iterate postings"))?
        {
            let (key, value) = item.map_err(db_err("Failed to read postings row"))?;
            let postings: Vec<Posting> =
                serde_json::from_str(value.value()).map_err(corrupt("Malformed posting list"))?;
            lists.push((key.value().to_string(), PostingList::from_postings(postings)?));
        }

        let documents = DocumentStore::from_documents(documents, next_id)?;
        let index = InvertedIndex::from_posting_lists(lists);
        index.verify(&documents)?;

        debug!(
            documents = documents.len(),
            terms = index.term_total(),
            generation,
            "Loaded persisted index"
        );
        Ok(IndexSnapshot::new(documents, index, generation))
    }

    /// Write the rows in `delta` from `snapshot` in a single transaction.
    pub fn commit(&self, snapshot: &IndexSnapshot, delta: &SnapshotDelta) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;

        {
            let mut docs = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(db_err("Failed to open documents table"))?;
            for &id in &delta.documents {
                match snapshot.documents().get(id) {
                    Some(doc) => {
                        let json = serde_json::to_string(doc)
                            .map_err(db_err("Failed to serialize document"))?;
                        docs.insert(id, json.as_str())
                            .map_err(db_err("Failed to insert document"))?;
                    }
                    None => {
                        docs.remove(id).map_err(db_err("Failed to remove document"))?;
                    }
                }
            }

            let mut postings = write_txn
                .open_table(POSTINGS_TABLE)
                .map_err(db_err("Failed to open postings table"))?;
            for term in &delta.terms {
                match snapshot.index().lookup(term) {
                    Some(list) => {
                        let json = serde_json::to_string(list.as_slice())
                            .map_err(db_err("Failed to serialize posting list"))?;
                        postings
                            .insert(term.as_str(), json.as_str())
                            .map_err(db_err("Failed to insert posting list"))?;
                    }
                    None => {
                        postings
                            .remove(term.as_str())
                            .map_err(db_err("Failed to remove posting list"))?;
                    }
                }
            }

            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(db_err("Failed to open meta table"))?;
            meta.insert(META_NEXT_ID_KEY, snapshot.documents().next_id())
                .map_err(db_err("Failed to store next document id"))?;
            meta.insert(META_GENERATION_KEY, snapshot.generation())
                .map_err(db_err("Failed to store generation"))?;
        }

        write_txn
            .commit()
            .map_err(db_err("Failed to commit transaction"))?;

        debug!(
            documents = delta.documents.len(),
            terms = delta.terms.len(),
            generation = snapshot.generation(),
            "Committed index delta"
        );
        Ok(())
    }

    /// Drop every persisted row except the document id counter, which is
    /// returned so a rebuilt index never reuses an id.
    pub fn reset(&self) -> Result<DocId> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        write_txn
            .delete_table(DOCUMENTS_TABLE)
            .map_err(db_err("Failed to delete documents table"))?;
        write_txn
            .delete_table(POSTINGS_TABLE)
            .map_err(db_err("Failed to delete postings table"))?;
        let next_id = {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(db_err("Failed to open meta table"))?;
            let next_id = meta
                .get(META_NEXT_ID_KEY)
                .ok()
                .flatten()
                .map(|guard| guard.value())
                .unwrap_or(0);
            meta.insert(META_NEXT_ID_KEY, next_id)
                .map_err(db_err("Failed to store next document id"))?;
            meta.remove(META_GENERATION_KEY)
                .map_err(db_err("Failed to reset generation"))?;
            next_id
        };
        write_txn
            .commit()
            .map_err(db_err("Failed to commit transaction"))?;
        self.ensure_tables()?;
        Ok(next_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn staged_example() -> (IndexSnapshot, SnapshotDelta) {
        let mut staged = IndexSnapshot::default().stage();
        for (path, text) in [("/r/a.txt", "the cat sat"), ("/r/b.txt", "the cat ran")] {
            let (id, _) = staged
                .documents
                .register_or_update(Path::new(path), text.as_bytes(), 1);
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for word in text.split_whitespace() {
                *freqs.entry(word.to_string()).or_insert(0) += 1;
            }
            staged.documents.set_term_count(id, 3);
            let touched = staged.index.upsert_document_terms(id, &freqs);
            staged.touch_document(id);
            staged.touch_terms(touched);
        }
        staged.freeze()
    }

    #[test]
    fn test_state_store_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index").join("vortex.redb");
        let store = StateStore::open_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());

        let snapshot = store.load().unwrap();
        assert!(snapshot.documents().is_empty());
        assert_eq!(snapshot.generation(), 0);
    }

    #[test]
    fn test_commit_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vortex.redb");
        let (snapshot, delta) = staged_example();

        {
            let store = StateStore::open_path(&path).unwrap();
            store.commit(&snapshot, &delta).unwrap();
        }

        let store = StateStore::open_path(&path).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.generation(), 1);
        assert_eq!(loaded.documents().next_id(), 2);
        assert_eq!(loaded.documents().live_count(), 2);
        assert_eq!(loaded.index().document_frequency("cat"), 2);
        assert_eq!(
            loaded.index().lookup("sat").unwrap().as_slice(),
            snapshot.index().lookup("sat").unwrap().as_slice()
        );
    }

    #[test]
    fn test_commit_removes_emptied_terms() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::open_path(&temp_dir.path().join("vortex.redb")).unwrap();
        let (snapshot, delta) = staged_example();
        store.commit(&snapshot, &delta).unwrap();

        let mut staged = snapshot.stage();
        let id = staged.documents.lookup_path(Path::new("/r/a.txt")).unwrap();
        let touched = staged.index.remove_document(id);
        staged.documents.tombstone(id);
        staged.touch_document(id);
        staged.touch_terms(touched);
        let (next, delta) = staged.freeze();
        store.commit(&next, &delta).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.index().lookup("sat").is_none());
        assert_eq!(loaded.index().document_frequency("cat"), 1);
        assert!(!loaded.documents().is_live(id));
    }

    #[test]
    fn test_inconsistent_rows_are_reported_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::open_path(&temp_dir.path().join("vortex.redb")).unwrap();
        let (snapshot, delta) = staged_example();

        // Persist postings without their documents.
        let postings_only = SnapshotDelta {
            documents: Default::default(),
            terms: delta.terms.clone(),
        };
        store.commit(&snapshot, &postings_only).unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptPersistedIndex(_))));

        assert_eq!(store.reset().unwrap(), 2);
        let loaded = store.load().unwrap();
        assert!(loaded.documents().is_empty());
        assert_eq!(loaded.index().term_total(), 0);
        assert_eq!(loaded.documents().next_id(), 2);
        assert_eq!(loaded.generation(), 0);
    }

    #[test]
    fn test_garbage_file_is_reported_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vortex.redb");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();
        assert!(matches!(
            StateStore::open_path(&path),
            Err(Error::CorruptPersistedIndex(_))
        ));
    }
}
