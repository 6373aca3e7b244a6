//! CLI implementation for codegraph

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::extract::Extractor;
use crate::graph::Assembler;
use crate::query::{QueryEngine, QueryOp, QueryRequest, QueryResponse};
use crate::store::Store;

#[derive(Parser)]
#[command(name = "codegraph")]
#[command(about = "Structural code intelligence for Go: call graphs, implementations, impact")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show debug info
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the graph index
    Index {
        /// Rebuild from scratch, ignoring the stored content hashes
        #[arg(long)]
        force: bool,
        /// Index files ignored by .gitignore
        #[arg(long)]
        no_ignore: bool,
    },
    /// Run a graph query
    ///
    /// Operations: callers, callees, dependencies, dependents, type_usages,
    /// implementations, path, impact
    Query {
        /// Query operation
        operation: String,
        /// Target id (`pkg.Name`) or bare name when unambiguous
        target: String,
        /// Destination for `path`
        #[arg(long)]
        to: Option<String>,
        /// Traversal depth (default 3, max 6)
        #[arg(short, long)]
        depth: Option<u32>,
        /// Overall result cap
        #[arg(long)]
        max_results: Option<usize>,
        /// Per-depth-level cap
        #[arg(long)]
        max_per_level: Option<usize>,
        /// Attach source snippets to results
        #[arg(short = 'C', long)]
        context: bool,
        /// Context padding in lines (default 3, max 20)
        #[arg(long)]
        context_lines: Option<u32>,
        /// Only results whose file matches this SQL LIKE pattern
        #[arg(long)]
        scope: Option<String>,
        /// Drop results whose file matches (repeatable, SQL LIKE pattern)
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the graph as a portable JSON snapshot
    Export {
        /// Output path
        #[arg(long, default_value = "codegraph.json")]
        out: PathBuf,
    },
    /// Show index statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr to keep stdout clean for structured output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let root = match &cli.project {
        Some(p) => dunce::canonicalize(p)
            .with_context(|| format!("Invalid project root: {}", p.display()))?,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&root);
    let quiet = cli.quiet || config.quiet_or_default();

    let cancel = CancelFlag::new();
    setup_signal_handler(cancel.clone());

    match cli.command {
        Commands::Index { force, no_ignore } => {
            cmd_index(&root, &config, cancel, force, no_ignore, quiet)
        }
        Commands::Query {
            operation,
            target,
            to,
            depth,
            max_results,
            max_per_level,
            context,
            context_lines,
            scope,
            exclude_patterns,
            json,
        } => {
            let op: QueryOp = operation.parse()?;
            let mut req = QueryRequest::new(op, target);
            req.to = to;
            req.depth = depth.or(config.depth);
            req.max_results = max_results.or(config.max_results);
            req.max_per_level = max_per_level.or(config.max_per_level);
            req.include_context = context;
            req.context_lines = context_lines.or(config.context_lines);
            req.scope = scope;
            req.exclude_patterns = exclude_patterns;
            for pattern in &config.exclude {
                if !req.exclude_patterns.contains(pattern) {
                    req.exclude_patterns.push(pattern.clone());
                }
            }
            cmd_query(&root, cancel, &req, json)
        }
        Commands::Export { out } => cmd_export(&root, &out),
        Commands::Stats { json } => cmd_stats(&root, json),
    }
}

fn setup_signal_handler(cancel: CancelFlag) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            // Second Ctrl+C: force exit
            std::process::exit(130);
        }
        cancel.cancel();
        eprintln!("\nInterrupted. Finishing current step...");
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to set Ctrl+C handler");
    }
}

fn db_path(root: &Path) -> PathBuf {
    root.join(crate::INDEX_DIR).join(crate::GRAPH_DB)
}

fn open_store(root: &Path) -> Result<Store> {
    let path = db_path(root);
    if !path.exists() {
        bail!(
            "No index found at {}. Run 'codegraph index' first.",
            path.display()
        );
    }
    Ok(Store::open(&path)?)
}

// ===== index =====

fn cmd_index(
    root: &Path,
    config: &Config,
    cancel: CancelFlag,
    force: bool,
    no_ignore: bool,
    quiet: bool,
) -> Result<()> {
    let started = std::time::Instant::now();

    let files = crate::enumerate_files(root, &["go"], no_ignore)?;
    let files = apply_excludes(files, &config.exclude);
    if files.is_empty() {
        bail!("No Go files found under {}", root.display());
    }

    std::fs::create_dir_all(root.join(crate::INDEX_DIR))?;
    let store = Store::open(&db_path(root))?;
    let assembler = Assembler::new(
        Extractor::new().context("Failed to initialize parser")?,
        cancel,
    );

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("valid progress template"),
        );
        pb.set_message(format!("Indexing {} files...", files.len()));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    };

    let graph = if force {
        assembler.build_full(root, &files)?
    } else {
        let stored = store.file_hashes()?;
        if stored.is_empty() {
            assembler.build_full(root, &files)?
        } else {
            let (changed, deleted) = diff_files(root, &files, &stored);
            if changed.is_empty() && deleted.is_empty() {
                pb.finish_and_clear();
                if !quiet {
                    println!("{} index already up to date ({} files)", "✓".green(), files.len());
                }
                return Ok(());
            }
            tracing::info!(
                changed = changed.len(),
                deleted = deleted.len(),
                "Incremental rebuild"
            );
            let previous = store.load_graph()?;
            assembler.build_incremental(root, previous, &changed, &deleted, &files)?
        }
    };

    store.save_graph(&graph)?;
    pb.finish_and_clear();

    if !quiet {
        println!(
            "{} indexed {} files: {} nodes, {} edges in {}ms",
            "✓".green(),
            graph.files.len(),
            graph.node_count(),
            graph.edge_count(),
            started.elapsed().as_millis()
        );
    }
    Ok(())
}

/// Drop enumerated files matching any configured exclude pattern.
fn apply_excludes(files: Vec<PathBuf>, patterns: &[String]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return files;
    }
    let regexes: Vec<_> = patterns
        .iter()
        .map(|p| crate::query::like_to_regex(p))
        .collect();
    files
        .into_iter()
        .filter(|f| {
            let rel = f.to_string_lossy().replace('\\', "/");
            !regexes.iter().any(|re| re.is_match(&rel))
        })
        .collect()
}

/// Compare on-disk content hashes against the stored snapshot.
fn diff_files(
    root: &Path,
    files: &[PathBuf],
    stored: &HashMap<String, String>,
) -> (Vec<String>, Vec<String>) {
    let mut changed = Vec::new();
    let mut on_disk = HashSet::new();
    for f in files {
        let rel = f.to_string_lossy().replace('\\', "/");
        on_disk.insert(rel.clone());
        match std::fs::read_to_string(root.join(f)) {
            Ok(content) => {
                let hash = crate::hash_source(&content.replace("\r\n", "\n"));
                if stored.get(&rel) != Some(&hash) {
                    changed.push(rel);
                }
            }
            // Unreadable now: let extraction report it
            Err(_) => changed.push(rel),
        }
    }
    let mut deleted: Vec<String> = stored
        .keys()
        .filter(|k| !on_disk.contains(*k))
        .cloned()
        .collect();
    changed.sort();
    deleted.sort();
    (changed, deleted)
}

// ===== query =====

fn cmd_query(root: &Path, cancel: CancelFlag, req: &QueryRequest, json: bool) -> Result<()> {
    let store = open_store(root)?;
    let engine = QueryEngine::new(&store, cancel);
    let response = engine.query(req)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!(
        "{} '{}' — {} of {} results in {}ms",
        response.operation.bold(),
        response.target,
        response.total_returned,
        response.total_found,
        response.metadata.took_ms
    );

    if let Some(summary) = &response.summary {
        println!(
            "  {} {} implementations, {} direct callers, {} transitive callers",
            "impact:".yellow(),
            summary.implementations,
            summary.direct_callers,
            summary.transitive_callers
        );
    }

    for result in &response.results {
        let location = if result.file.is_empty() {
            result.module_path.clone()
        } else {
            format!("{}:{}-{}", result.file, result.start_line, result.end_line)
        };
        let mut tags = format!("depth {}", result.depth);
        if let Some(impact_type) = &result.impact_type {
            tags = format!("{tags}, {impact_type}");
        }
        if let Some(severity) = &result.severity {
            tags = format!("{tags}, {severity}");
        }
        if let Some(matched) = &result.matched_type {
            tags = format!("{tags}, matches {matched}");
        }
        println!(
            "  {}  {}  {}  ({})",
            result.id.bold(),
            result.kind.dimmed(),
            location,
            tags.dimmed()
        );
        if let Some(context) = &result.context {
            for line in context.lines() {
                println!("      {}", line.dimmed());
            }
        }
    }

    if response.truncated {
        let at = response
            .truncated_at_depth
            .map(|d| format!(" (first truncated depth: {d})"))
            .unwrap_or_default();
        println!("  {}{}", "results truncated".yellow(), at);
    }
    if let Some(suggestion) = &response.suggestion {
        println!("  {} {}", "hint:".cyan(), suggestion);
    }
}

// ===== export / stats =====

fn cmd_export(root: &Path, out: &Path) -> Result<()> {
    let store = open_store(root)?;
    let graph = store.load_graph()?;
    crate::snapshot::save(&graph, out)?;
    println!(
        "{} exported {} nodes, {} edges to {}",
        "✓".green(),
        graph.node_count(),
        graph.edge_count(),
        out.display()
    );
    Ok(())
}

fn cmd_stats(root: &Path, json: bool) -> Result<()> {
    let store = open_store(root)?;
    let stats = store.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("{}", "index statistics".bold());
    println!("  files:         {}", stats.files);
    println!("  packages:      {}", stats.packages);
    println!("  functions:     {}", stats.functions);
    println!("  types:         {}", stats.types);
    println!("  calls:         {}", stats.calls);
    println!("  relationships: {}", stats.relationships);
    println!("  imports:       {}", stats.imports);
    println!("  type usages:   {}", stats.usages);
    println!("  schema:        v{}", stats.schema_version);
    if let Some(at) = &stats.generated_at {
        println!("  generated:     {at}");
    }
    Ok(())
}
