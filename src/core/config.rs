use super::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// How the terms of a multi-term query are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// A document matches if it contains any query term; frequencies are summed.
    #[default]
    Any,
    /// A document matches only if it contains every query term.
    All,
}

/// What happens when an index request arrives while another pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail fast with `Error::Busy`.
    #[default]
    Reject,
    /// Wait for the running pass to finish, then run.
    Queue,
}

/// Normalization settings shared by indexing and querying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Tokens shorter than this many characters are dropped.
    pub min_token_length: usize,
    /// Terms that are never indexed. Compared after case folding.
    pub stopwords: BTreeSet<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            stopwords: BTreeSet::new(),
        }
    }
}

/// Directory traversal settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingConfig {
    /// File extensions (lowercase, without the dot) that are indexed.
    /// Empty means every regular file.
    pub extensions: Vec<String>,
    /// Honour `.gitignore` / `.ignore` files under the root
    pub respect_gitignore: bool,
    pub follow_symlinks: bool,
    /// Walk dot-files and dot-directories (e.g. `.notes/`)
    pub include_hidden: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["txt".to_string()],
            respect_gitignore: true,
            follow_symlinks: true,
            include_hidden: true,
        }
    }
}

/// Configuration for vortex
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for vortex data
    pub base_dir: PathBuf,
    /// Path to the persisted index database
    pub index_path: PathBuf,
    /// Whether the index is persisted at all
    pub persist: bool,
    pub tokenizer: TokenizerConfig,
    pub indexing: IndexingConfig,
    pub query_mode: QueryMode,
    pub busy_policy: BusyPolicy,
}

impl Config {
    /// Get the default configuration directory
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
            .map(|home| home.join(".vortex"))
    }

    /// Create a new configuration
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.unwrap_or_else(|| {
            Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".vortex"))
        });

        Ok(Self {
            index_path: base_dir.join("index").join("vortex.redb"),
            base_dir,
            persist: true,
            tokenizer: TokenizerConfig::default(),
            indexing: IndexingConfig::default(),
            query_mode: QueryMode::default(),
            busy_policy: BusyPolicy::default(),
        })
    }

    /// A configuration that keeps the index in memory only.
    pub fn in_memory() -> Self {
        let base_dir = PathBuf::from(".vortex");
        Self {
            index_path: base_dir.join("index").join("vortex.redb"),
            base_dir,
            persist: false,
            tokenizer: TokenizerConfig::default(),
            indexing: IndexingConfig::default(),
            query_mode: QueryMode::default(),
            busy_policy: BusyPolicy::default(),
        }
    }

    /// Initialize the configuration directories
    pub fn init(&self) -> Result<()> {
        if !self.persist {
            return Ok(());
        }
        std::fs::create_dir_all(&self.base_dir)?;
        if let Some(parent) = self.index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Check if the configuration is already initialized
    pub fn is_initialized(&self) -> bool {
        self.base_dir.exists()
            && self
                .index_path
                .parent()
                .map(|p| p.exists())
                .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokenizer.min_token_length == 0 {
            return Err(Error::Config(
                "min_token_length must be at least 1".to_string(),
            ));
        }
        if self
            .indexing
            .extensions
            .iter()
            .any(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(Error::Config(
                "extensions must be non-empty and given without a leading dot".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_paths() {
        let config = Config::new(Some(PathBuf::from("/tmp/vx"))).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/tmp/vx"));
        assert_eq!(config.index_path, PathBuf::from("/tmp/vx/index/vortex.redb"));
        assert!(config.persist);
        assert_eq!(config.query_mode, QueryMode::Any);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_config_init() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(Some(temp_dir.path().join("vx"))).unwrap();
        assert!(!config.is_initialized());
        config.init().unwrap();
        assert!(config.is_initialized());
    }

    #[test]
    fn test_in_memory_init_touches_nothing() {
        let config = Config::in_memory();
        assert!(!config.persist);
        config.init().unwrap();
    }

    #[test]
    fn test_validate() {
        let mut config = Config::in_memory();
        assert!(config.validate().is_ok());

        config.tokenizer.min_token_length = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.tokenizer.min_token_length = 2;
        config.indexing.extensions = vec![".txt".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
