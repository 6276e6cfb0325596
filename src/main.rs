use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vortex::cli::{Cli, Commands};
use vortex::config::{Config, QueryMode};
use vortex::error::{Error, Result};
use vortex::indexing::pipeline::IndexOptions;
use vortex::{FileWatcher, IndexManager};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vortex=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = build_config(&cli)?;

    match &cli.command {
        Commands::Index { path, force, json } => {
            handle_index(config, path.as_str(), *force, *json)
        }
        Commands::Search {
            query,
            limit,
            all,
            json,
        } => {
            if *all {
                config.query_mode = QueryMode::All;
            }
            handle_search(config, query.as_str(), *limit, *json)
        }
        Commands::Watch { path } => handle_watch(config, path.as_str()),
        Commands::Stats => handle_stats(config),
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.no_persist {
        Config::in_memory()
    } else {
        Config::new(cli.base_dir.as_deref().map(PathBuf::from))?
    };
    config.tokenizer.min_token_length = cli.min_token_length;
    config.tokenizer.stopwords = cli.stopwords.iter().cloned().collect();
    config.indexing.extensions = cli
        .extensions
        .iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty() && ext != "*")
        .collect();
    Ok(config)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Failed to serialize output: {}", e)))
}

fn handle_index(config: Config, path: &str, force: bool, json: bool) -> Result<()> {
    let manager = IndexManager::open(config)?;
    let response = manager.request_index_with(&PathBuf::from(path), IndexOptions { force })?;

    if json {
        println!("{}", to_json(&response)?);
        return Ok(());
    }

    println!("{}", response.message);
    println!("  Took: {} ms", response.summary.elapsed_ms);
    for err in &response.summary.errors {
        println!("  ✗ {}: {}", err.path.display(), err.message);
    }
    Ok(())
}

fn handle_search(config: Config, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let manager = IndexManager::open(config)?;
    let results = manager.search_with_limit(query, limit);

    if json {
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:", results.len());
    for (i, hit) in results.iter().enumerate() {
        let path = manager
            .resolve(hit.file_id)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        println!(
            "{:>3}. [{}] {} (frequency: {})",
            i + 1,
            hit.file_id,
            path,
            hit.frequency
        );
    }
    Ok(())
}

fn handle_watch(config: Config, path: &str) -> Result<()> {
    let manager = Arc::new(IndexManager::open(config)?);
    let watcher = FileWatcher::new(&PathBuf::from(path), manager)?;
    println!("Watching {} (Ctrl+C to stop)", watcher.root().display());
    watcher.watch()
}

fn handle_stats(config: Config) -> Result<()> {
    let manager = IndexManager::open(config)?;
    println!("{}", to_json(&manager.stats())?);
    Ok(())
}
