//! # codegraph - Structural Code Intelligence
//!
//! Answers structural questions about a Go codebase — "who calls X?",
//! "what implements interface I?", "what breaks if F changes?" — over a
//! persisted graph of typed entities and relations.
//!
//! ## Pipeline
//!
//! Source files are parsed with tree-sitter and distilled per file into
//! entities (packages, types, functions) and relations (calls, imports,
//! embeddings, type usages). The assembler deduplicates nodes, the matcher
//! flattens interface embeddings and infers `implements` edges by
//! structural signature matching, and the result is persisted to SQLite.
//! Queries run as recursive CTEs under read-only snapshots, with optional
//! line-numbered source context.
//!
//! ## Quick Start
//!
//! ```no_run
//! use codegraph::{Assembler, CancelFlag, Extractor, QueryEngine, QueryOp, QueryRequest, Store};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let root = Path::new(".");
//! let files = codegraph::enumerate_files(root, &["go"], false)?;
//!
//! let assembler = Assembler::new(Extractor::new()?, CancelFlag::new());
//! let graph = assembler.build_full(root, &files)?;
//!
//! let store = Store::open(Path::new(".codegraph/graph.db"))?;
//! store.save_graph(&graph)?;
//!
//! let engine = QueryEngine::new(&store, CancelFlag::new());
//! let response = engine.query(&QueryRequest::new(QueryOp::Callers, "server.Handle"))?;
//! println!("{} callers", response.total_returned);
//! # Ok(())
//! # }
//! ```

// Public library API modules
pub mod cancel;
pub mod config;
pub mod extract;
pub mod graph;
pub mod language;
pub mod matcher;
pub mod query;
pub mod snapshot;
pub mod store;

pub mod cli;

pub use cancel::{CancelFlag, Cancelled};
pub use extract::{CodeStructure, ExtractError, Extractor, MethodSignature, TypeReference};
pub use graph::{Assembler, BuildError, CodeGraph, RelationshipKind, TypeRelationship};
pub use query::{
    ImpactSummary, QueryEngine, QueryError, QueryOp, QueryRequest, QueryResponse, QueryResult,
};
pub use snapshot::SnapshotError;
pub use store::{IndexStats, Store, StoreError};

use std::path::{Path, PathBuf};

/// Name of the per-project index directory (created by `codegraph index`).
pub const INDEX_DIR: &str = ".codegraph";

/// File name of the SQLite graph database inside [`INDEX_DIR`].
pub const GRAPH_DB: &str = "graph.db";

/// Whether a relative file path names a test file.
///
/// Test files skip type extraction (mock types would collide with real
/// ids) and lose in duplicate-id resolution against regular files.
pub fn is_test_file(file: &str) -> bool {
    language::Language::Go.def().is_test_file(file)
}

/// Content hash used for change detection.
///
/// Hashes the CRLF-normalized source, matching what the extractor stores,
/// so the same bytes hash identically on every platform.
pub fn hash_source(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().to_string()
}

/// Relativize a path against a root and normalize separators for display.
///
/// Strips `root` prefix if present, converts backslashes to forward slashes.
pub fn rel_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Maximum file size to index (1MB)
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Enumerate files to index in a project directory.
///
/// Respects .gitignore, skips hidden files and large files (>1MB), and
/// skips `vendor/` and `testdata/` trees. Returns sorted relative paths
/// from the project root.
pub fn enumerate_files(
    root: &Path,
    extensions: &[&str],
    no_ignore: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    use anyhow::Context;
    use ignore::WalkBuilder;

    let root = dunce::canonicalize(root).context("Failed to canonicalize root")?;

    let walker = WalkBuilder::new(&root)
        .git_ignore(!no_ignore)
        .git_global(!no_ignore)
        .git_exclude(!no_ignore)
        .ignore(!no_ignore)
        .hidden(!no_ignore)
        .follow_links(false)
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| {
            e.map_err(|err| {
                tracing::debug!(error = %err, "Failed to read directory entry during walk");
            })
            .ok()
        })
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|e| {
            e.metadata()
                .map(|m| m.len() <= MAX_FILE_SIZE)
                .unwrap_or(false)
        })
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.contains(&ext))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let path = match dunce::canonicalize(e.path()) {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!(
                        path = %e.path().display(),
                        error = %err,
                        "Failed to canonicalize path, skipping"
                    );
                    return None;
                }
            };
            if path.starts_with(&root) {
                Some(path.strip_prefix(&root).unwrap_or(&path).to_path_buf())
            } else {
                tracing::warn!("Skipping path outside project: {}", e.path().display());
                None
            }
        })
        .filter(|p| {
            !p.components()
                .any(|c| c.as_os_str() == "vendor" || c.as_os_str() == "testdata")
        })
        .collect();

    files.sort();
    tracing::info!(file_count = files.len(), "File enumeration complete");

    Ok(files)
}
