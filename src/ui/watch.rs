use crate::core::error::{Error, Result};
use crate::indexing::discovery::is_indexable;
use crate::service::manager::{IndexManager, IndexResponse};
use notify_debouncer_full::{
    new_debouncer,
    notify::{RecursiveMode, Watcher},
    DebounceEventResult,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

/// Re-indexes a directory whenever files under it change
pub struct FileWatcher {
    root_path: PathBuf,
    manager: Arc<IndexManager>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new(root_path: &Path, manager: Arc<IndexManager>) -> Result<Self> {
        if !root_path.exists() {
            return Err(Error::PathNotFound(root_path.to_path_buf()));
        }
        Ok(Self {
            root_path: root_path.canonicalize()?,
            manager,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Index once, then keep re-indexing on changes until the manager is
    /// shut down.
    pub fn watch(&self) -> Result<()> {
        self.reindex();

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events
                        .into_iter()
                        .flat_map(|event| event.event.paths)
                        .collect();
                    let _ = tx.send(paths);
                }
                Err(errors) => {
                    for err in errors {
                        warn!("Watch error: {}", err);
                    }
                }
            }
        })
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create file watcher: {}", e),
            ))
        })?;

        debouncer
            .watcher()
            .watch(&self.root_path, RecursiveMode::Recursive)
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to watch directory: {}", e),
                ))
            })?;

        info!("Watching directory: {}", self.root_path.display());

        loop {
            match rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(paths) => {
                    self.handle_paths(&paths);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.manager.is_shut_down() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(())
    }

    /// React to one debounced batch of changed paths.
    pub fn handle_paths(&self, paths: &[PathBuf]) -> Option<IndexResponse> {
        let extensions = &self.manager.config().indexing.extensions;
        if !paths
            .iter()
            .any(|path| is_relevant(path, &self.root_path, extensions))
        {
            debug!("Ignoring {} unrelated change(s)", paths.len());
            return None;
        }
        self.reindex()
    }

    fn reindex(&self) -> Option<IndexResponse> {
        match self.manager.request_index(&self.root_path) {
            Ok(response) => {
                info!("{}", response.message);
                Some(response)
            }
            Err(Error::Busy) => {
                debug!("Index pass already running; dropping change batch");
                None
            }
            Err(e) => {
                warn!("Re-index of {} failed: {}", self.root_path.display(), e);
                None
            }
        }
    }
}

/// A change matters if it is under the root and is either an indexable file
/// or something without an extension (usually a directory).
pub fn is_relevant(path: &Path, root: &Path, extensions: &[String]) -> bool {
    path.starts_with(root) && (path.extension().is_none() || is_indexable(path, extensions))
}
