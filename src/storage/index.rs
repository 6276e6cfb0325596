//! Inverted index: term → postings sorted by document id.
//!
//! Posting lists sit behind `Arc`, so cloning the whole index to stage a new
//! version only copies pointers. Mutation goes through `Arc::make_mut`, which
//! copies a list the first time a staged version touches it and leaves every
//! published version intact.

use crate::core::error::{Error, Result};
use crate::storage::documents::{DocId, DocumentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One (document, frequency) entry of a posting list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub document_id: DocId,
    pub frequency: u32,
}

/// Postings of a single term, strictly ascending by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted postings, checking ordering and frequencies.
    pub fn from_postings(postings: Vec<Posting>) -> Result<Self> {
        if postings.iter().any(|p| p.frequency == 0) {
            return Err(Error::CorruptPersistedIndex(
                "posting with zero frequency".to_string(),
            ));
        }
        if postings
            .windows(2)
            .any(|w| w[0].document_id >= w[1].document_id)
        {
            return Err(Error::CorruptPersistedIndex(
                "posting list not strictly sorted by document id".to_string(),
            ));
        }
        Ok(Self { postings })
    }

    /// Insert or replace the posting for `posting.document_id`.
    pub fn upsert(&mut self, posting: Posting) {
        match self
            .postings
            .binary_search_by_key(&posting.document_id, |p| p.document_id)
        {
            Ok(pos) => self.postings[pos] = posting,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn remove(&mut self, document_id: DocId) -> bool {
        match self
            .postings
            .binary_search_by_key(&document_id, |p| p.document_id)
        {
            Ok(pos) => {
                self.postings.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn frequency(&self, document_id: DocId) -> Option<u32> {
        self.postings
            .binary_search_by_key(&document_id, |p| p.document_id)
            .ok()
            .map(|pos| self.postings[pos].frequency)
    }

    pub fn as_slice(&self) -> &[Posting] {
        &self.postings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.postings.iter()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

impl<'a> IntoIterator for &'a PostingList {
    type Item = &'a Posting;
    type IntoIter = std::slice::Iter<'a, Posting>;

    fn into_iter(self) -> Self::IntoIter {
        self.postings.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Arc<PostingList>>,
    /// Forward map used to find a document's stale postings
    doc_terms: HashMap<DocId, Arc<[String]>>,
    term_counts: HashMap<DocId, u64>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted posting lists. The forward map and per-document
    /// term counts are derived from the lists.
    pub fn from_posting_lists<I>(lists: I) -> Self
    where
        I: IntoIterator<Item = (String, PostingList)>,
    {
        let mut index = Self::default();
        let mut forward: HashMap<DocId, Vec<String>> = HashMap::new();

        for (term, list) in lists {
            if list.is_empty() {
                continue;
            }
            for posting in &list {
                forward
                    .entry(posting.document_id)
                    .or_default()
                    .push(term.clone());
                *index.term_counts.entry(posting.document_id).or_insert(0) +=
                    u64::from(posting.frequency);
            }
            index.postings.insert(term, Arc::new(list));
        }

        index.doc_terms = forward
            .into_iter()
            .map(|(id, mut terms)| {
                terms.sort();
                (id, terms.into())
            })
            .collect();
        index
    }

    /// Replace every posting of `document_id` with `frequencies`.
    ///
    /// Returns the sorted set of terms whose lists changed, old and new.
    pub fn upsert_document_terms(
        &mut self,
        document_id: DocId,
        frequencies: &HashMap<String, u32>,
    ) -> Vec<String> {
        let mut touched = self.remove_document(document_id);

        let mut terms = Vec::with_capacity(frequencies.len());
        let mut total = 0u64;
        for (term, &frequency) in frequencies {
            if frequency == 0 || term.is_empty() {
                continue;
            }
            Arc::make_mut(self.postings.entry(term.clone()).or_default()).upsert(Posting {
                document_id,
                frequency,
            });
            terms.push(term.clone());
            total += u64::from(frequency);
        }
        terms.sort();

        touched.extend(terms.iter().cloned());
        touched.sort();
        touched.dedup();

        if !terms.is_empty() {
            self.doc_terms.insert(document_id, terms.into());
            self.term_counts.insert(document_id, total);
        }
        touched
    }

    /// Delete every posting that references `document_id`. Returns the terms
    /// whose lists changed.
    pub fn remove_document(&mut self, document_id: DocId) -> Vec<String> {
        let Some(terms) = self.doc_terms.remove(&document_id) else {
            return Vec::new();
        };
        self.term_counts.remove(&document_id);

        for term in terms.iter() {
            let now_empty = match self.postings.get_mut(term) {
                Some(list) => {
                    let list = Arc::make_mut(list);
                    list.remove(document_id);
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(term);
            }
        }
        terms.to_vec()
    }

    pub fn lookup(&self, term: &str) -> Option<Arc<PostingList>> {
        self.postings.get(term).cloned()
    }

    /// Sum of all posting frequencies for a document
    pub fn term_count_for(&self, document_id: DocId) -> u64 {
        self.term_counts.get(&document_id).copied().unwrap_or(0)
    }

    /// Number of distinct documents containing `term`
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map(|list| list.len()).unwrap_or(0)
    }

    /// Number of distinct terms
    pub fn term_total(&self) -> usize {
        self.postings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<PostingList>)> {
        self.postings.iter()
    }

    /// Check the index against the document store: every posting points at a
    /// live document, and each document's frequencies add up to its recorded
    /// term count.
    pub fn verify(&self, documents: &DocumentStore) -> Result<()> {
        for &id in self.doc_terms.keys() {
            if !documents.is_live(id) {
                return Err(Error::CorruptPersistedIndex(format!(
                    "postings reference missing or tombstoned document {}",
                    id
                )));
            }
        }
        for doc in documents.iter().filter(|doc| doc.is_live()) {
            let indexed = self.term_count_for(doc.id);
            if indexed != doc.term_count {
                return Err(Error::CorruptPersistedIndex(format!(
                    "document {} records {} terms but postings sum to {}",
                    doc.id, doc.term_count, indexed
                )));
            }
        }
        Ok(())
    }
}
