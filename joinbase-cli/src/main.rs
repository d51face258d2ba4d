use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use joinbase_core::{
    open_repository, CollectionName, MemoryStore, SearchClause, SearchRepository, StoreConfig,
};
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "joinbase")]
#[command(about = "JoinBase CLI - load JSON entity files and search them with joins")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a collection and print matching documents as JSON lines
    Search {
        /// Collection to search
        #[arg(long)]
        collection: String,
        /// Equality constraints: field=value[&field=value...]
        #[arg(long, default_value = "")]
        query: String,
        /// Declare a join: left.field=right.field (repeatable)
        #[arg(long = "join", value_parser = parse_join)]
        joins: Vec<JoinSpec>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List the field names found in a collection
    Fields {
        /// Collection to inspect
        #[arg(long)]
        collection: String,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Load a JSON array file into a collection: collection=path (repeatable)
    #[arg(long = "load", value_parser = parse_load)]
    loads: Vec<LoadSpec>,
    /// Store name
    #[arg(long, default_value = joinbase_core::config::DEFAULT_STORE_NAME)]
    store: String,
    /// Store engine
    #[arg(long, default_value = joinbase_core::config::MEMORY_ENGINE)]
    engine: String,
    /// Records per bulk insert
    #[arg(long, default_value_t = joinbase_core::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// error, warn, info, debug or trace
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl SourceArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig {
            engine: self.engine.clone(),
            store_name: self.store.clone(),
            batch_size: self.batch_size,
            log_level: self.log_level.clone(),
            ..StoreConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LoadSpec {
    collection: CollectionName,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
struct JoinSpec {
    left: CollectionName,
    left_field: String,
    right: CollectionName,
    right_field: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            collection,
            query,
            joins,
            source,
        } => search(&collection, &query, &joins, &source),
        Commands::Fields { collection, source } => list_fields(&collection, &source),
    }
}

/// Parse `collection=path`
fn parse_load(arg: &str) -> std::result::Result<LoadSpec, String> {
    let (collection, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected collection=path, got '{}'", arg))?;
    let collection = CollectionName::new(collection.trim());
    if !collection.is_valid() {
        return Err(format!("invalid collection name '{}'", collection));
    }
    if path.trim().is_empty() {
        return Err(format!("missing file path for '{}'", collection));
    }
    Ok(LoadSpec {
        collection,
        path: PathBuf::from(path.trim()),
    })
}

/// Parse `left.field=right.field`; the field part may itself be a dotted path
fn parse_join(arg: &str) -> std::result::Result<JoinSpec, String> {
    let (left, right) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected left.field=right.field, got '{}'", arg))?;

    let side = |part: &str| -> std::result::Result<(CollectionName, String), String> {
        let (collection, field) = part
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("expected collection.field, got '{}'", part.trim()))?;
        let collection = CollectionName::new(collection);
        if !collection.is_valid() || field.is_empty() {
            return Err(format!("expected collection.field, got '{}'", part.trim()));
        }
        Ok((collection, field.to_string()))
    };

    let (left, left_field) = side(left)?;
    let (right, right_field) = side(right)?;
    Ok(JoinSpec {
        left,
        left_field,
        right,
        right_field,
    })
}

/// Start a store and load every `--load` source into it
fn open(source: &SourceArgs) -> Result<SearchRepository<MemoryStore>> {
    let config = source.config();
    let mut repo = open_repository(&config).context("Failed to open store")?;
    repo.start(&config.store_name)
        .with_context(|| format!("Failed to start store '{}'", config.store_name))?;
    Ok(repo)
}

fn load_sources(repo: &SearchRepository<MemoryStore>, loads: &[LoadSpec]) -> Result<()> {
    for spec in loads {
        let summary = repo
            .load_into(&spec.collection, &spec.path)
            .with_context(|| {
                format!(
                    "Failed to load {} into '{}'",
                    spec.path.display(),
                    spec.collection
                )
            })?;
        eprintln!(
            "Loaded {} documents into '{}' ({} batches)",
            summary.records, summary.collection, summary.batches
        );
    }
    Ok(())
}

fn search(collection: &str, query: &str, joins: &[JoinSpec], source: &SourceArgs) -> Result<()> {
    let mut repo = open(source)?;
    let outcome = run_search(&repo, collection, query, joins, &source.loads);
    repo.stop();
    outcome
}

fn run_search(
    repo: &SearchRepository<MemoryStore>,
    collection: &str,
    query: &str,
    joins: &[JoinSpec],
    loads: &[LoadSpec],
) -> Result<()> {
    for join in joins {
        repo.leftjoin_names(
            join.left.clone(),
            &join.left_field,
            join.right.clone(),
            &join.right_field,
        );
    }
    load_sources(repo, loads)?;

    let clauses = SearchClause::parse(query)
        .with_context(|| format!("Invalid query: {}", query))?;
    let collection = CollectionName::new(collection);
    let cursor = repo
        .search_in(&collection, &clauses)
        .with_context(|| format!("Search on '{}' failed", collection))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut total = 0;
    for doc in cursor {
        let doc = doc.with_context(|| format!("Failed to read results from '{}'", collection))?;
        writeln!(out, "{}", doc).context("Failed to write result")?;
        total += 1;
    }

    eprintln!("Total: {} result(s) in '{}'", total, collection);
    Ok(())
}

fn list_fields(collection: &str, source: &SourceArgs) -> Result<()> {
    let mut repo = open(source)?;
    let outcome = collect_fields(&repo, collection, &source.loads);
    repo.stop();

    for field in outcome? {
        println!("{}", field);
    }
    Ok(())
}

/// Sorted union of top-level field names across the collection
fn collect_fields(
    repo: &SearchRepository<MemoryStore>,
    collection: &str,
    loads: &[LoadSpec],
) -> Result<BTreeSet<String>> {
    load_sources(repo, loads)?;

    let collection = CollectionName::new(collection);
    let cursor = repo
        .search_in(&collection, &SearchClause::new())
        .with_context(|| format!("Failed to scan '{}'", collection))?;

    let mut fields = BTreeSet::new();
    for doc in cursor {
        let doc = doc.with_context(|| format!("Failed to read '{}'", collection))?;
        if let Some(object) = doc.as_object() {
            fields.extend(object.keys().cloned());
        }
    }
    Ok(fields)
}
