use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use expandodb::query::{Predicate, matching_owners};
use expandodb::{InMemoryOverlayStore, Lookup, OverlayConfig, OverlayEntry, OverlayStore};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "expando-inspect")]
#[command(about = "Read-only inspection of an ExpandoDB overlay snapshot")]
struct Cli {
    /// Snapshot file written by an overlay store
    #[arg(long)]
    snapshot: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List stored entries
    Entries {
        #[arg(long)]
        owner_type: Option<String>,
        #[arg(long)]
        owner_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Every value stored for one key
    Distinct {
        #[arg(long)]
        owner_type: String,
        #[arg(long)]
        key: String,
    },
    /// Owner ids matching every `key[__lookup]=value` condition
    Find {
        #[arg(long)]
        owner_type: String,
        #[arg(long = "where", required = true)]
        conditions: Vec<String>,
        #[arg(long, default_value_t = Lookup::Exact)]
        lookup: Lookup,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = open_snapshot(&cli.snapshot)?;

    match cli.command {
        Command::Entries {
            owner_type,
            owner_id,
            json,
        } => list_entries(&store, owner_type.as_deref(), owner_id.as_deref(), json),
        Command::Distinct { owner_type, key } => {
            let values = store
                .distinct_values(&owner_type, &key)
                .with_context(|| format!("failed to read values of {}.{}", owner_type, key))?;
            for value in values {
                println!("{}", value);
            }
            Ok(())
        }
        Command::Find {
            owner_type,
            conditions,
            lookup,
        } => find_owners(&store, &owner_type, &conditions, lookup),
    }
}

fn open_snapshot(path: &Path) -> Result<InMemoryOverlayStore> {
    if !path.exists() {
        return Err(anyhow!("snapshot not found: {}", path.display()));
    }
    let config = OverlayConfig::new().snapshot_path(path);
    InMemoryOverlayStore::open(&config)
        .with_context(|| format!("failed to open snapshot {}", path.display()))
}

fn list_entries(
    store: &InMemoryOverlayStore,
    owner_type: Option<&str>,
    owner_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let entries: Vec<OverlayEntry> = store
        .entries(owner_type)?
        .into_iter()
        .filter(|entry| owner_id.is_none_or(|id| entry.owner_id == id))
        .collect();

    if json {
        let text = serde_json::to_string_pretty(&entries).context("failed to encode entries")?;
        println!("{}", text);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}#{} {} = {:?} ({})",
            entry.owner_type,
            entry.owner_id,
            entry.key,
            entry.value,
            entry.created_at.to_rfc3339()
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

fn find_owners(
    store: &InMemoryOverlayStore,
    owner_type: &str,
    conditions: &[String],
    default_lookup: Lookup,
) -> Result<()> {
    let predicates = conditions
        .iter()
        .map(|condition| parse_condition(condition, default_lookup))
        .collect::<Result<Vec<_>>>()?;

    let owners = matching_owners(store, owner_type, &predicates)?.unwrap_or_default();
    for owner in &owners {
        println!("{}", owner);
    }
    Ok(())
}

fn parse_condition(condition: &str, default_lookup: Lookup) -> Result<Predicate> {
    let (name, value) = condition
        .split_once('=')
        .ok_or_else(|| anyhow!("condition must look like key[__lookup]=value: {}", condition))?;
    Predicate::parse(name.trim(), value, default_lookup)
        .with_context(|| format!("invalid condition: {}", condition))
}
