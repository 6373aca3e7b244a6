//! Store helper types and row conversion

use thiserror::Error;

use crate::cancel::Cancelled;

/// Schema version for database migrations
///
/// Increment this when changing the database schema. Store::open() checks
/// this against the stored version and migrates or fails.
///
/// History:
/// - v1: initial schema (files, packages, functions, calls, types,
///   relationships, parameters, imports)
/// - v2: type_usages table + indexes for uses_type edge persistence
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Version string written into snapshot metadata
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Index created by newer codegraph version (schema v{0}). Please upgrade codegraph.")]
    SchemaNewerThanTool(i32),
    #[error("No migration path from schema v{0} to v{1}. Run 'codegraph index --force' to rebuild.")]
    MigrationNotSupported(i32, i32),
    #[error("Stored row is malformed: {0}")]
    Corrupt(String),
    #[error("No stored content for file: {0}")]
    MissingContent(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Clamp an i64 line/position column to u32 range, saturating at the
/// bounds. Byte positions are legitimately zero, so the floor is 0 rather
/// than 1.
pub(crate) fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// A graph node as returned by query operations
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: String,
    /// "function", "struct", "interface", "alias", or "package"
    pub kind: String,
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_pos: u32,
    pub end_pos: u32,
    pub module_path: String,
}

impl NodeRow {
    /// Package pseudo-node (dependencies/dependents results)
    pub fn package(id: &str) -> Self {
        NodeRow {
            id: id.to_string(),
            kind: "package".to_string(),
            name: id.rsplit('/').next().unwrap_or(id).to_string(),
            file: String::new(),
            start_line: 0,
            end_line: 0,
            start_pos: 0,
            end_pos: 0,
            module_path: id.to_string(),
        }
    }
}

/// A node paired with its traversal depth
#[derive(Debug, Clone)]
pub struct TraversalRow {
    pub node: NodeRow,
    /// Hop count from the query target; direct neighbors are 1
    pub depth: u32,
    /// Operation-specific detail (matched parameter type for type_usages)
    pub detail: Option<String>,
}

/// Index statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexStats {
    pub files: u64,
    pub packages: u64,
    pub functions: u64,
    pub types: u64,
    pub calls: u64,
    pub relationships: u64,
    pub imports: u64,
    pub usages: u64,
    pub schema_version: i32,
    pub generated_at: Option<String>,
}
