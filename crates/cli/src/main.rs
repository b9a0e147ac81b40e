mod config;
mod error;
mod logging;

use std::ops::Bound;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use codec::{EntityId, Record, Timestamp};
use eventstore::{EventStore, ImportReport};
use ingest::{DocumentFormat, Importer};
use serde_json::{Map, json};

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "tidemark.toml";

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "A durable, schema-versioned time-series record store", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import documents with a configured import profile
    Import {
        /// Name of an [imports.<name>] table
        #[arg(short, long)]
        profile: String,
        /// Documents, or directories scanned for the profile's format
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the records of an entity as JSON lines, oldest first
    Read {
        #[arg(short, long)]
        entity: String,
        /// Earliest instant, inclusive (RFC 3339)
        #[arg(long)]
        from: Option<String>,
        /// Latest instant, inclusive (RFC 3339)
        #[arg(long)]
        to: Option<String>,
    },
    /// Delete one record, or every record of an entity
    Delete {
        #[arg(short, long)]
        entity: String,
        /// Instant of the single record to delete (RFC 3339)
        #[arg(long)]
        at: Option<String>,
    },
    /// Show live record and tombstone counts
    Stats,
    /// Purge tombstones
    Compact,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    logging::init(&config.logging)?;

    let store = EventStore::open(&config.store, config.registry()?)?;

    match cli.command {
        Commands::Import { profile, paths } => cmd_import(&store, &config, &profile, &paths),
        Commands::Read { entity, from, to } => {
            cmd_read(&store, &entity, from.as_deref(), to.as_deref())
        }
        Commands::Delete { entity, at } => cmd_delete(&store, &entity, at.as_deref()),
        Commands::Stats => cmd_stats(&store),
        Commands::Compact => cmd_compact(&store),
    }
}

fn cmd_import(store: &EventStore, config: &Config, profile: &str, paths: &[PathBuf]) -> Result<()> {
    let import = config
        .imports
        .get(profile)
        .ok_or_else(|| Error::UnknownProfile {
            name: profile.to_string(),
            known: config.imports.keys().cloned().collect(),
        })?;
    let importer = Importer::new(import.clone())?;
    let documents = collect_documents(paths, import.format)?;

    let mut failed = 0;
    for path in &documents {
        let outcome = std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|text| Ok(store.import_document(&importer, &text)?));
        match outcome {
            Ok(report) => print_report(path, &report),
            Err(e) => {
                failed += 1;
                tracing::error!(path = %path.display(), error = %e, "Import failed");
                eprintln!("{}: {e}", path.display());
            }
        }
    }

    if failed > 0 {
        return Err(Error::ImportIncomplete {
            failed,
            total: documents.len(),
        });
    }
    Ok(())
}

/// Expand directories into their documents of `format`, sorted by path.
fn collect_documents(paths: &[PathBuf], format: DocumentFormat) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for path in paths {
        if !path.is_dir() {
            documents.push(path.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() && has_extension(&entry_path, format.extension()) {
                found.push(entry_path);
            }
        }
        if found.is_empty() {
            return Err(Error::NoDocuments {
                path: path.clone(),
                extension: format.extension(),
            });
        }
        found.sort();
        documents.extend(found);
    }
    Ok(documents)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn print_report(path: &Path, report: &ImportReport) {
    println!(
        "{}: {} accepted, {} rejected, {} failed (batch {})",
        path.display(),
        report.accepted_count,
        report.rejected.len(),
        report.failed.len(),
        report.batch_id
    );
    for note in &report.diagnostics {
        println!("  note: {note}");
    }
    for rejection in &report.rejected {
        println!(
            "  entry {} rejected [{}]: {}",
            rejection.index,
            rejection.reason.code(),
            rejection.reason
        );
    }
    for failure in &report.failed {
        println!(
            "  {} at {} not written: {}",
            failure.entity_id, failure.timestamp, failure.error
        );
    }
}

fn cmd_read(store: &EventStore, entity: &str, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let start = match from {
        Some(s) => Bound::Included(parse_timestamp(s)?),
        None => Bound::Unbounded,
    };
    let end = match to {
        Some(s) => Bound::Included(parse_timestamp(s)?),
        None => Bound::Unbounded,
    };

    let mut records = store.read(&EntityId::new(entity), (start, end))?;
    for record in records.by_ref() {
        println!("{}", record_json(&record?)?);
    }
    if records.skipped() > 0 {
        eprintln!("{} unreadable entries skipped", records.skipped());
    }
    Ok(())
}

fn record_json(record: &Record) -> serde_json::Result<serde_json::Value> {
    let mut fields = Map::new();
    for field in &record.payload {
        fields.insert(field.name.clone(), serde_json::to_value(&field.value)?);
    }
    Ok(json!({
        "kind": record.kind,
        "entity": record.entity_id,
        "timestamp": record.timestamp,
        "version": record.schema_version,
        "fields": fields,
    }))
}

fn cmd_delete(store: &EventStore, entity: &str, at: Option<&str>) -> Result<()> {
    let entity = EntityId::new(entity);
    match at {
        Some(s) => {
            let timestamp = parse_timestamp(s)?;
            store.delete(&entity, &timestamp)?;
            println!("Deleted {entity} at {timestamp}");
        }
        None => {
            let removed = store.delete_entity(&entity)?;
            println!("Deleted {removed} records of {entity}");
        }
    }
    Ok(())
}

fn cmd_stats(store: &EventStore) -> Result<()> {
    let stats = store.stats()?;
    println!("Store:      {}", store.path().display());
    println!("Records:    {}", stats.live);
    println!("Tombstones: {}", stats.tombstones);
    let mut kinds: Vec<_> = store.registry().kinds().collect();
    kinds.sort_unstable();
    for kind in kinds {
        if let Some(schema) = store.registry().latest(kind) {
            println!("Schema:     {kind} v{}", schema.version);
        }
    }
    Ok(())
}

fn cmd_compact(store: &EventStore) -> Result<()> {
    let purged = store.compact()?;
    println!("Purged {purged} tombstones");
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<Timestamp> {
    Timestamp::parse_rfc3339(value).map_err(|_| Error::InvalidTimestamp {
        value: value.to_string(),
    })
}
