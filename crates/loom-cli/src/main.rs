//! Loom CLI
//!
//! - Mapping row exports into the statement store (`map`)
//! - Rebuilding entities from statements (`get`, `export`)
//! - Listing stored subjects (`subjects`)
//! - Validating a mapping configuration (`check`)
//! - Deleting statements by source (`flush`)

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use loom_mapper::{Extractor, LoomConfig};
use loom_model::{Objectifier, Triplifier};
use loom_store::{EntityManager, MemoryStore, SourceInfo};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SOURCES_FILE: &str = "sources.json";

#[derive(Parser)]
#[command(name = "loom")]
#[command(author, version, about = "Loom: map relational rows into a statement graph")]
struct Cli {
    /// Mapping configuration file.
    #[arg(long, global = true, default_value = "loom.json")]
    config: PathBuf,

    /// Statement file (overrides `statements_path` from the config).
    #[arg(long, global = true)]
    statements: Option<PathBuf>,

    /// More logging (-v info, -vv debug). `LOOM_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a JSON-lines row file through a named mapping into the store.
    Map {
        /// Mapping name from the config. Without it every configured mapping
        /// runs, reading `<rows>/<mapping>.jsonl`.
        #[arg(long)]
        mapping: Option<String>,

        /// Rows, one flat JSON object per line keyed by `table.column`; a
        /// directory of such files when no mapping is named.
        #[arg(long)]
        rows: PathBuf,

        /// Write statements here instead of the store file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Rebuild one subject as JSON.
    Get {
        subject: String,

        /// Schema to rebuild with (defaults to the subject's recorded type).
        #[arg(long)]
        schema: Option<String>,

        /// Nesting depth (defaults to the config's `depth`).
        #[arg(long)]
        depth: Option<i32>,
    },

    /// List stored subjects.
    Subjects {
        #[arg(long)]
        schema: Option<String>,

        #[arg(long)]
        source: Option<String>,
    },

    /// Rebuild every matching subject into a JSON-lines file.
    Export {
        #[arg(long)]
        schema: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        depth: Option<i32>,

        #[arg(long)]
        out: PathBuf,
    },

    /// Compile every configured schema and show its alias.
    Check,

    /// Delete the statements of one source, or every statement.
    Flush {
        /// Source slug to delete.
        #[arg(short, long, required_unless_present = "all", conflicts_with = "all")]
        source: Option<String>,

        /// Delete every statement and source.
        #[arg(short, long)]
        all: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("LOOM_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let workspace = Workspace::open(&cli.config, cli.statements.as_deref())?;
    match cli.command {
        Commands::Map { mapping, rows, out } => {
            cmd_map(&workspace, mapping.as_deref(), &rows, out.as_deref())
        }
        Commands::Get {
            subject,
            schema,
            depth,
        } => cmd_get(&workspace, &subject, schema.as_deref(), depth),
        Commands::Subjects { schema, source } => {
            cmd_subjects(&workspace, schema.as_deref(), source.as_deref())
        }
        Commands::Export {
            schema,
            source,
            depth,
            out,
        } => cmd_export(&workspace, schema.as_deref(), source.as_deref(), depth, &out),
        Commands::Check => cmd_check(&workspace),
        Commands::Flush { source, all: _ } => cmd_flush(&workspace, source.as_deref()),
    }
}

// ============================================================================
// Workspace
// ============================================================================

/// Config, registry and the opened statement store.
struct Workspace {
    config: LoomConfig,
    statements: PathBuf,
    manager: EntityManager,
}

impl Workspace {
    fn open(config_path: &Path, statements: Option<&Path>) -> Result<Self> {
        let config = LoomConfig::from_path(config_path)?;
        let registry = config
            .registry()
            .with_context(|| format!("failed to load schemas for {}", config_path.display()))?;
        let statements = statements
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.statements_path.clone());

        let store = MemoryStore::open(&statements)?;
        store.read_sources(&sources_path(&statements))?;
        tracing::info!(
            path = %statements.display(),
            types = store.len_types(),
            properties = store.len_properties(),
            "opened statement store"
        );

        let manager = EntityManager::new(Arc::new(registry), Arc::new(store))
            .with_triplifier(Triplifier::new(config.subject_policy))
            .with_objectifier(
                Objectifier::new()
                    .merge_policy(config.merge_policy.clone())
                    .coerce_scalars(true),
            );
        Ok(Self {
            config,
            statements,
            manager,
        })
    }

    fn depth(&self, depth: Option<i32>) -> i32 {
        depth.unwrap_or(self.config.depth)
    }

    fn source_info(&self) -> SourceInfo {
        let mut info = SourceInfo::new(self.config.source_slug());
        if let Some(spec) = &self.config.source {
            info.title = spec.title.clone();
            info.url = spec.url.clone();
        }
        info
    }
}

fn sources_path(statements: &Path) -> PathBuf {
    statements.with_file_name(SOURCES_FILE)
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_map(ws: &Workspace, mapping: Option<&str>, rows: &Path, out: Option<&Path>) -> Result<()> {
    let runs: Vec<(String, PathBuf)> = match mapping {
        Some(name) => vec![(name.to_string(), rows.to_path_buf())],
        None => ws
            .config
            .mappings
            .keys()
            .map(|name| (name.clone(), rows.join(format!("{name}.jsonl"))))
            .collect(),
    };
    if runs.is_empty() {
        bail!("no mappings configured");
    }

    let store = ws.manager.store();
    let source = store.upsert_source(ws.source_info());
    for (name, rows_path) in &runs {
        map_rows(ws, &source.slug, name, rows_path)?;
    }

    let target = out.unwrap_or(ws.statements.as_path());
    let total = store.write_jsonl(target)?;
    store.write_sources(&sources_path(target))?;
    println!(
        "{} {} statements to {}",
        "Wrote".green().bold(),
        total,
        target.display()
    );
    Ok(())
}

fn map_rows(ws: &Workspace, source: &str, mapping: &str, rows_path: &Path) -> Result<()> {
    println!(
        "{} {} with mapping {}",
        "Mapping".green().bold(),
        rows_path.display(),
        mapping.cyan()
    );

    let extractor = Extractor::from_config(&ws.config, ws.manager.registry(), mapping)?;
    let rows = read_rows(rows_path)?;
    let mut writer = ws.manager.store().writer(source);
    let stats = extractor
        .records(rows, &mut writer)
        .with_context(|| format!("mapping {mapping} failed on {}", rows_path.display()))?;

    println!(
        "  {} records={} skipped={} new statements={} (source {})",
        "→".cyan(),
        stats.records,
        stats.skipped,
        writer.written(),
        source
    );
    Ok(())
}

fn cmd_flush(ws: &Workspace, source: Option<&str>) -> Result<()> {
    let store = ws.manager.store();
    let removed = match source {
        Some(slug) => {
            if !store.has_source(slug) {
                bail!("no such source: {slug}");
            }
            store.delete_source(slug)
        }
        None => store.clear(),
    };
    store.write_jsonl(&ws.statements)?;
    store.write_sources(&sources_path(&ws.statements))?;
    println!(
        "{} {} statements ({})",
        "Flushed".green().bold(),
        removed,
        source.unwrap_or("all sources")
    );
    Ok(())
}

fn cmd_get(ws: &Workspace, subject: &str, schema: Option<&str>, depth: Option<i32>) -> Result<()> {
    match ws.manager.document(subject, schema, ws.depth(depth))? {
        Some(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        None => bail!("unknown subject {subject} (no recorded type; pass --schema)"),
    }
}

fn cmd_subjects(ws: &Workspace, schema: Option<&str>, source: Option<&str>) -> Result<()> {
    for subject in ws.manager.subjects(schema, source)? {
        println!("{subject}");
    }
    Ok(())
}

fn cmd_export(
    ws: &Workspace,
    schema: Option<&str>,
    source: Option<&str>,
    depth: Option<i32>,
    out: &Path,
) -> Result<()> {
    let subjects = ws.manager.subjects(schema, source)?;
    println!(
        "{} {} subjects to {}",
        "Exporting".green().bold(),
        subjects.len(),
        out.display()
    );

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file =
        File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let mut exported = 0usize;
    for subject in &subjects {
        let Some(document) = ws.manager.document(subject, schema, ws.depth(depth))? else {
            continue;
        };
        serde_json::to_writer(&mut writer, &document)?;
        writer.write_all(b"\n")?;
        exported += 1;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!("  {} {} documents", "→".cyan(), exported);
    Ok(())
}

fn cmd_check(ws: &Workspace) -> Result<()> {
    let registry = ws.manager.registry();
    println!("{} {}", "Checking".green().bold(), ws.config.base_uri);

    for (name, uri) in &ws.config.schemas {
        let schema = registry
            .compile(uri)
            .with_context(|| format!("schema {name} ({uri}) does not compile"))?;
        println!("  {} {} = {} ({} nodes)", "✓".green(), name, schema.uri(), schema.len());
    }
    for name in ws.config.mappings.keys() {
        let uri = ws.config.mapping_schema_uri(name)?;
        let schema = registry
            .compile(&uri)
            .with_context(|| format!("mapping {name}: schema {uri} does not compile"))?;
        let alias = ws.config.schema_alias(&uri)?;
        println!(
            "  {} mapping {} → {} ({} nodes)",
            "✓".green(),
            name.cyan(),
            alias,
            schema.len()
        );
    }
    Ok(())
}

// ============================================================================
// Input
// ============================================================================

fn read_rows(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Map<String, Value> = serde_json::from_str(&line).with_context(|| {
            format!("line {} of {} is not a JSON object", index + 1, path.display())
        })?;
        rows.push(row);
    }
    Ok(rows)
}
