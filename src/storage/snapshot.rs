use crate::storage::documents::{DocId, DocumentStore};
use crate::storage::index::InvertedIndex;
use std::collections::BTreeSet;

/// An immutable, consistent view of the document store and the inverted
/// index. Published snapshots are never mutated; indexing works on a staged
/// clone and swaps it in when the pass completes.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    documents: DocumentStore,
    index: InvertedIndex,
    generation: u64,
}

impl IndexSnapshot {
    pub fn new(documents: DocumentStore, index: InvertedIndex, generation: u64) -> Self {
        Self {
            documents,
            index,
            generation,
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Bumped every time a new version is published
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A mutable copy to build the next version in.
    pub fn stage(&self) -> StagedSnapshot {
        StagedSnapshot {
            documents: self.documents.clone(),
            index: self.index.clone(),
            generation: self.generation + 1,
            delta: SnapshotDelta::default(),
        }
    }
}

/// Documents and terms touched while staging, so persistence only writes
/// what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
    pub documents: BTreeSet<DocId>,
    pub terms: BTreeSet<String>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.terms.is_empty()
    }
}

/// The next snapshot under construction. Owned by a single indexing pass.
#[derive(Debug)]
pub struct StagedSnapshot {
    pub documents: DocumentStore,
    pub index: InvertedIndex,
    generation: u64,
    delta: SnapshotDelta,
}

impl StagedSnapshot {
    pub fn touch_document(&mut self, id: DocId) {
        self.delta.documents.insert(id);
    }

    pub fn touch_terms<I: IntoIterator<Item = String>>(&mut self, terms: I) {
        self.delta.terms.extend(terms);
    }

    pub fn freeze(self) -> (IndexSnapshot, SnapshotDelta) {
        (
            IndexSnapshot {
                documents: self.documents,
                index: self.index,
                generation: self.generation,
            },
            self.delta,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn test_stage_does_not_affect_published() {
        let published = IndexSnapshot::default();
        let mut staged = published.stage();

        let (id, _) = staged
            .documents
            .register_or_update(Path::new("/r/a.txt"), b"cat", 1);
        let freqs: HashMap<String, u32> = [("cat".to_string(), 1)].into_iter().collect();
        let touched = staged.index.upsert_document_terms(id, &freqs);
        staged.touch_document(id);
        staged.touch_terms(touched);

        assert!(published.index().lookup("cat").is_none());
        assert!(published.documents().is_empty());

        let (next, delta) = staged.freeze();
        assert_eq!(next.generation(), 1);
        assert_eq!(next.index().document_frequency("cat"), 1);
        assert!(delta.documents.contains(&id));
        assert!(delta.terms.contains("cat"));
    }
}
