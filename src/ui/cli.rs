use clap::{Parser, Subcommand};

/// vortex - keyword search over a directory of text files
#[derive(Parser, Debug)]
#[command(name = "vortex")]
#[command(about = "A small, local-first keyword search engine over a directory tree", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Custom base directory (default: ~/.vortex)
    #[arg(long, global = true)]
    pub base_dir: Option<String>,

    /// Keep the index in memory only
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Drop tokens shorter than this many characters
    #[arg(long, global = true, default_value_t = 1)]
    pub min_token_length: usize,

    /// Comma-separated list of words to leave out of the index
    #[arg(long, global = true, value_delimiter = ',')]
    pub stopwords: Vec<String>,

    /// File extensions to index (comma-separated, without the dot)
    #[arg(long, global = true, value_delimiter = ',', default_value = "txt")]
    pub extensions: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or update the index for a directory
    Index {
        /// Path to the directory
        path: String,
        /// Force re-indexing of all files
        #[arg(short, long)]
        force: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the index
    Search {
        /// Search query
        query: String,
        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,
        /// Require every query term to match
        #[arg(long)]
        all: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch a directory for changes and automatically update the index
    Watch {
        /// Path to the directory
        path: String,
    },
    /// Show index statistics
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from(["vortex", "search", "hello world", "--limit", "5", "--all"])
            .unwrap();
        match cli.command {
            Commands::Search {
                query, limit, all, ..
            } => {
                assert_eq!(query, "hello world");
                assert_eq!(limit, Some(5));
                assert!(all);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "vortex",
            "index",
            "/docs",
            "--force",
            "--stopwords",
            "the,a",
            "--extensions",
            "txt,md",
            "--no-persist",
        ])
        .unwrap();
        assert!(cli.no_persist);
        assert_eq!(cli.stopwords, vec!["the", "a"]);
        assert_eq!(cli.extensions, vec!["txt", "md"]);
        assert!(matches!(cli.command, Commands::Index { force: true, .. }));
    }
}
