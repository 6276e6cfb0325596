use crate::core::config::QueryMode;
use crate::indexing::tokenizer::Tokenizer;
use crate::storage::documents::DocId;
use crate::storage::index::PostingList;
use crate::storage::snapshot::IndexSnapshot;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// One ranked result. Field names match what the UI consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file_id: DocId,
    pub frequency: u64,
}

/// Evaluates keyword queries against a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    tokenizer: &'a Tokenizer,
    mode: QueryMode,
}

impl<'a> QueryEngine<'a> {
    /// `tokenizer` must be the one used at index time.
    pub fn new(tokenizer: &'a Tokenizer, mode: QueryMode) -> Self {
        Self { tokenizer, mode }
    }

    /// Rank documents by the summed frequency of the query terms they
    /// contain, highest first, ties broken by ascending id.
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        raw_query: &str,
        limit: Option<usize>,
    ) -> Vec<SearchHit> {
        if raw_query.trim().is_empty() {
            return Vec::new();
        }

        let terms = self.tokenizer.unique_terms(raw_query);
        let mut lists: Vec<Arc<PostingList>> = Vec::with_capacity(terms.len());
        for term in &terms {
            match snapshot.index().lookup(term) {
                Some(list) => lists.push(list),
                None if self.mode == QueryMode::All => return Vec::new(),
                None => {}
            }
        }
        if lists.is_empty() {
            return Vec::new();
        }

        let mut hits = match self.mode {
            QueryMode::Any => union(&lists),
            QueryMode::All => intersect(&lists),
        };
        rank(&mut hits);
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        hits
    }
}

/// Sort by frequency descending, then id ascending.
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_unstable_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.file_id.cmp(&b.file_id))
    });
}

/// K-way merge of sorted posting lists, summing frequencies per document.
/// Output is ordered by document id.
pub fn union(lists: &[Arc<PostingList>]) -> Vec<SearchHit> {
    let mut heap: BinaryHeap<Reverse<(DocId, usize)>> = BinaryHeap::with_capacity(lists.len());
    let mut cursors = vec![0usize; lists.len()];
    for (i, list) in lists.iter().enumerate() {
        if let Some(first) = list.as_slice().first() {
            heap.push(Reverse((first.document_id, i)));
        }
    }

    let mut hits: Vec<SearchHit> = Vec::new();
    while let Some(Reverse((document_id, i))) = heap.pop() {
        let posting = lists[i].as_slice()[cursors[i]];
        match hits.last_mut() {
            Some(last) if last.file_id == document_id => {
                last.frequency += u64::from(posting.frequency)
            }
            _ => hits.push(SearchHit {
                file_id: document_id,
                frequency: u64::from(posting.frequency),
            }),
        }

        cursors[i] += 1;
        if let Some(next) = lists[i].as_slice().get(cursors[i]) {
            heap.push(Reverse((next.document_id, i)));
        }
    }
    hits
}

/// Documents present in every list, with frequencies summed. Lists are
/// merged shortest first so the running result only shrinks.
pub fn intersect(lists: &[Arc<PostingList>]) -> Vec<SearchHit> {
    let mut ordered: Vec<&PostingList> = lists.iter().map(|l| l.as_ref()).collect();
    ordered.sort_by_key(|list| list.len());

    let Some((first, rest)) = ordered.split_first() else {
        return Vec::new();
    };
    let mut hits: Vec<SearchHit> = first
        .iter()
        .map(|p| SearchHit {
            file_id: p.document_id,
            frequency: u64::from(p.frequency),
        })
        .collect();

    for list in rest {
        let postings = list.as_slice();
        let mut j = 0;
        hits.retain_mut(|hit| {
            while j < postings.len() && postings[j].document_id < hit.file_id {
                j += 1;
            }
            match postings.get(j) {
                Some(p) if p.document_id == hit.file_id => {
                    hit.frequency += u64::from(p.frequency);
                    true
                }
                _ => false,
            }
        });
        if hits.is_empty() {
            break;
        }
    }
    hits
}
