//! The index coordinator.
//!
//! Indexing runs one pass at a time on a staged copy of the current snapshot;
//! a finished pass is committed to disk and then published with a single
//! pointer swap. Searches load whatever snapshot is current when they start
//! and never wait on indexing.

use crate::core::config::{BusyPolicy, Config};
use crate::core::error::{Error, Result};
use crate::indexing::pipeline::{CancellationFlag, IndexOptions, IndexingPipeline, IndexingSummary};
use crate::indexing::tokenizer::Tokenizer;
use crate::search::query::{QueryEngine, SearchHit};
use crate::storage::documents::{DocId, DocumentStore};
use crate::storage::index::InvertedIndex;
use crate::storage::snapshot::IndexSnapshot;
use crate::storage::state::StateStore;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Indexing,
}

/// Result of an index request
#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub message: String,
    pub summary: IndexingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub documents: usize,
    pub tombstoned: usize,
    pub terms: usize,
}

pub struct IndexManager {
    config: Config,
    tokenizer: Tokenizer,
    current: ArcSwap<IndexSnapshot>,
    /// Held for the duration of an indexing pass
    indexing: Mutex<()>,
    cancel: CancellationFlag,
    store: Option<StateStore>,
}

impl IndexManager {
    /// Open the index described by `config`, loading any persisted state.
    pub fn open(config: Config) -> Result<Self> {
        let tokenizer = Tokenizer::new(&config.tokenizer);
        Self::with_tokenizer(config, tokenizer)
    }

    /// Like [`IndexManager::open`] with a caller-supplied tokenizer, e.g. one
    /// built around a custom normalizer.
    pub fn with_tokenizer(config: Config, tokenizer: Tokenizer) -> Result<Self> {
        config.validate()?;

        let (store, snapshot) = if config.persist {
            config.init()?;
            let store = open_or_reset(&config)?;
            let snapshot = load_or_reset(&store)?;
            (Some(store), snapshot)
        } else {
            (None, IndexSnapshot::default())
        };

        info!(
            documents = snapshot.documents().live_count(),
            terms = snapshot.index().term_total(),
            persist = config.persist,
            "Index opened"
        );

        Ok(Self {
            config,
            tokenizer,
            current: ArcSwap::from_pointee(snapshot),
            indexing: Mutex::new(()),
            cancel: CancellationFlag::new(),
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build or update the index for `directory`.
    pub fn request_index(&self, directory: &Path) -> Result<IndexResponse> {
        self.request_index_with(directory, IndexOptions::default())
    }

    pub fn request_index_with(
        &self,
        directory: &Path,
        options: IndexOptions,
    ) -> Result<IndexResponse> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _pass = match self.config.busy_policy {
            BusyPolicy::Reject => self.indexing.try_lock().ok_or(Error::Busy)?,
            BusyPolicy::Queue => self.indexing.lock(),
        };

        let base = self.current.load_full();
        let mut staged = base.stage();
        let pipeline = IndexingPipeline::new(&self.tokenizer, &self.config.indexing, &self.cancel);
        let summary = pipeline.index_directory(&mut staged, directory, options)?;

        let (next, delta) = staged.freeze();
        if !delta.is_empty() {
            if let Some(store) = &self.store {
                store.commit(&next, &delta)?;
            }
            self.current.store(Arc::new(next));
        }

        let message = format!(
            "Successfully indexed {} files ({} unchanged, {} removed, {} failed)",
            summary.documents_indexed,
            summary.documents_skipped,
            summary.documents_removed,
            summary.documents_failed
        );
        Ok(IndexResponse { message, summary })
    }

    /// Ranked results for `query`. Never fails: an empty query, unknown
    /// terms, or an index that was never built all give an empty list.
    pub fn request_search(&self, query: &str) -> Vec<SearchHit> {
        self.search_with_limit(query, None)
    }

    pub fn search_with_limit(&self, query: &str, limit: Option<usize>) -> Vec<SearchHit> {
        let snapshot = self.current.load();
        QueryEngine::new(&self.tokenizer, self.config.query_mode).search(&snapshot, query, limit)
    }

    pub fn resolve(&self, file_id: DocId) -> Option<PathBuf> {
        self.current
            .load()
            .documents()
            .resolve(file_id)
            .map(Path::to_path_buf)
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }

    pub fn state(&self) -> ManagerState {
        if self.indexing.is_locked() {
            ManagerState::Indexing
        } else {
            ManagerState::Idle
        }
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.current.load();
        let documents = snapshot.documents().live_count();
        IndexStats {
            generation: snapshot.generation(),
            documents,
            tombstoned: snapshot.documents().len() - documents,
            terms: snapshot.index().term_total(),
        }
    }

    /// Ask a running pass to stop and refuse new ones. A stopped pass
    /// publishes nothing.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn open_or_reset(config: &Config) -> Result<StateStore> {
    match StateStore::open(config) {
        Err(Error::CorruptPersistedIndex(reason)) => {
            warn!("{}; discarding it and rebuilding from scratch", reason);
            std::fs::remove_file(&config.index_path)?;
            StateStore::open(config)
        }
        other => other,
    }
}

fn load_or_reset(store: &StateStore) -> Result<IndexSnapshot> {
    match store.load() {
        Err(Error::CorruptPersistedIndex(reason)) => {
            warn!(
                "Persisted index is corrupt ({}); falling back to a full re-index",
                reason
            );
            let next_id = store.reset()?;
            let documents = DocumentStore::from_documents(Vec::new(), next_id)?;
            Ok(IndexSnapshot::new(documents, InvertedIndex::new(), 0))
        }
        other => other,
    }
}
