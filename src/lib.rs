// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
}

// Data storage
pub mod storage {
    pub mod documents;
    pub mod index;
    pub mod snapshot;
    pub mod state;
}

// Indexing pipeline
pub mod indexing {
    pub mod discovery;
    pub mod pipeline;
    pub mod tokenizer;
}

// Query evaluation
pub mod search {
    pub mod query;
}

// Snapshot ownership and request handling
pub mod service {
    pub mod manager;
}

// User interfaces
pub mod ui {
    pub mod cli;
    pub mod watch;
}

pub use core::{config, error};
pub use ui::cli;

// Re-export commonly used types
pub use core::config::{BusyPolicy, Config, IndexingConfig, QueryMode, TokenizerConfig};
pub use core::error::{Error, IndexingError, IndexingErrorKind, Result};
pub use indexing::discovery::discover_files;
pub use indexing::pipeline::{CancellationFlag, IndexOptions, IndexingSummary};
pub use indexing::tokenizer::{LowercaseNormalizer, Normalizer, Token, Tokenizer};
pub use search::query::SearchHit;
pub use service::manager::{IndexManager, IndexResponse, IndexStats, ManagerState};
pub use storage::documents::{DocId, Document};
pub use storage::snapshot::IndexSnapshot;
pub use storage::state::StateStore;
pub use ui::cli::Cli;
pub use ui::watch::FileWatcher;
