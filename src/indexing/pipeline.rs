use crate::core::config::IndexingConfig;
use crate::core::error::{Error, IndexingError, IndexingErrorKind, Result};
use crate::indexing::discovery::{discover_files, Discovery};
use crate::indexing::tokenizer::Tokenizer;
use crate::storage::documents::{get_file_modified_time, DocId};
use crate::storage::snapshot::StagedSnapshot;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Changed files are tokenized in parallel in batches of this size.
const TOKENIZE_BATCH: usize = 256;

/// Outcome of one `index_directory` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingSummary {
    pub documents_indexed: usize,
    /// Unchanged files, plus files that vanished mid-scan
    pub documents_skipped: usize,
    pub documents_failed: usize,
    /// Previously indexed files no longer on disk
    pub documents_removed: usize,
    pub errors: Vec<IndexingError>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Re-index every file even if its content hash is unchanged
    pub force: bool,
}

/// Cooperative cancellation shared between the coordinator and a running pass.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Walks a directory and applies its files to a staged snapshot.
pub struct IndexingPipeline<'a> {
    tokenizer: &'a Tokenizer,
    config: &'a IndexingConfig,
    cancel: &'a CancellationFlag,
}

impl<'a> IndexingPipeline<'a> {
    pub fn new(
        tokenizer: &'a Tokenizer,
        config: &'a IndexingConfig,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            tokenizer,
            config,
            cancel,
        }
    }

    /// Bring everything under `root` in `staged` up to date with the disk.
    ///
    /// Per-file failures are collected in the summary. Structural failures
    /// (missing or unreadable root, cancellation) return an error and leave
    /// `staged` in an unspecified state; the caller must discard it.
    pub fn index_directory(
        &self,
        staged: &mut StagedSnapshot,
        root: &Path,
        options: IndexOptions,
    ) -> Result<IndexingSummary> {
        let started = Instant::now();
        let root = canonical_root(root)?;
        info!("Indexing directory: {}", root.display());

        let discovery = discover_files(&root, self.config)?;
        debug!(
            files = discovery.files.len(),
            loops_skipped = discovery.loops_skipped,
            "Discovered files"
        );

        let mut summary = self.apply_discovery(staged, &root, discovery, options)?;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            indexed = summary.documents_indexed,
            skipped = summary.documents_skipped,
            failed = summary.documents_failed,
            removed = summary.documents_removed,
            elapsed_ms = summary.elapsed_ms,
            "Indexed {}",
            root.display()
        );
        Ok(summary)
    }

    /// Apply one walk of `root` to `staged`. Files may have changed or
    /// disappeared since they were discovered.
    fn apply_discovery(
        &self,
        staged: &mut StagedSnapshot,
        root: &Path,
        discovery: Discovery,
        options: IndexOptions,
    ) -> Result<IndexingSummary> {
        let mut summary = IndexingSummary::default();
        let mut seen: HashSet<DocId> = HashSet::new();

        // Known documents below an unreadable directory are kept as they are.
        for err in discovery.errors {
            for id in staged.documents.live_under(&err.path) {
                seen.insert(id);
            }
            summary.documents_failed += 1;
            summary.errors.push(err);
        }

        let mut pending: Vec<(DocId, String)> = Vec::new();
        for file in &discovery.files {
            self.cancel.check()?;

            let known = staged.documents.lookup_path(&file.path);
            let text = match read_text(&file.path) {
                Ok(Some(read)) => read,
                Ok(None) => {
                    debug!("File vanished during scan: {}", file.path.display());
                    summary.documents_skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!("Skipping {}: {}", file.path.display(), err.message);
                    if let Some(id) = known {
                        seen.insert(id);
                    }
                    summary.documents_failed += 1;
                    summary.errors.push(err);
                    continue;
                }
            };

            let (id, changed) = staged.documents.register_or_update(
                &file.path,
                text.content.as_bytes(),
                text.modified,
            );
            seen.insert(id);

            if changed || options.force {
                staged.touch_document(id);
                pending.push((id, text.content));
                if pending.len() >= TOKENIZE_BATCH {
                    self.apply_batch(staged, std::mem::take(&mut pending), &mut summary)?;
                }
            } else {
                summary.documents_skipped += 1;
            }
        }
        self.apply_batch(staged, pending, &mut summary)?;

        for id in staged.documents.live_under(root) {
            if seen.contains(&id) {
                continue;
            }
            let touched = staged.index.remove_document(id);
            staged.documents.tombstone(id);
            staged.touch_document(id);
            staged.touch_terms(touched);
            summary.documents_removed += 1;
        }
        self.cancel.check()?;
        Ok(summary)
    }

    fn apply_batch(
        &self,
        staged: &mut StagedSnapshot,
        batch: Vec<(DocId, String)>,
        summary: &mut IndexingSummary,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.cancel.check()?;

        let tokenizer = self.tokenizer;
        let tokenized: Vec<(DocId, HashMap<String, u32>)> = batch
            .into_par_iter()
            .map(|(id, text)| (id, tokenizer.term_frequencies(&text)))
            .collect();

        self.cancel.check()?;
        for (id, frequencies) in tokenized {
            let term_count: u64 = frequencies.values().map(|&f| u64::from(f)).sum();
            staged.documents.set_term_count(id, term_count);
            let touched = staged.index.upsert_document_terms(id, &frequencies);
            staged.touch_terms(touched);
            summary.documents_indexed += 1;
        }
        Ok(())
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    if root.as_os_str().is_empty() || !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

struct FileText {
    content: String,
    modified: u64,
}

/// Read a file as UTF-8. `Ok(None)` means it disappeared after discovery.
fn read_text(path: &Path) -> std::result::Result<Option<FileText>, IndexingError> {
    let read = std::fs::metadata(path).and_then(|metadata| {
        let bytes = std::fs::read(path)?;
        Ok((metadata, bytes))
    });

    let (metadata, bytes) = match read {
        Ok(read) => read,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexingError::from_io(path.to_path_buf(), &e)),
    };

    let content = String::from_utf8(bytes).map_err(|e| {
        IndexingError::new(path.to_path_buf(), IndexingErrorKind::Decode, e.to_string())
    })?;

    Ok(Some(FileText {
        content,
        modified: get_file_modified_time(&metadata).unwrap_or(0),
    }))
}
