//! SQLite persistence for the code graph (sqlx async with sync wrappers)
//!
//! Provides sync methods that internally use a tokio runtime to execute
//! async sqlx operations, so callers stay synchronous while the engine gets
//! connection pooling and WAL-mode concurrent reads.
//!
//! ## Module Structure
//!
//! - `helpers` - error and row types
//! - `migrations` - schema version upgrades
//! - `write` - transactional graph snapshot write and reload
//! - `queries` - query-engine SQL (recursive CTEs, read-only transactions)
//! - `context` - line-numbered source snippets by byte range

mod context;
mod migrations;
mod queries;
mod write;

pub(crate) mod helpers;

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use lru::LruCache;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::runtime::Runtime;

pub use helpers::{IndexStats, NodeRow, StoreError, TraversalRow, CURRENT_SCHEMA_VERSION};
pub use queries::ImpactRows;

/// Cached context windows: (file, fetch_start, fetch_len) → bytes
type WindowCache = LruCache<(String, u32, u32), Vec<u8>>;

/// Number of cached context windows. Windows are a few KB each, so this
/// bounds the cache at roughly a megabyte.
const CONTEXT_CACHE_CAPACITY: usize = 256;

/// Thread-safe SQLite store for the persisted code graph
///
/// Uses sqlx connection pooling and WAL mode so read-only queries run
/// concurrently with snapshot writes. All methods are synchronous but
/// internally execute on an async runtime.
///
/// # Example
///
/// ```no_run
/// use codegraph::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new(".codegraph/graph.db"))?;
/// let stats = store.stats()?;
/// println!("{} functions indexed", stats.functions);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) rt: Runtime,
    /// Context-window cache, cleared on snapshot replacement
    pub(crate) window_cache: Mutex<WindowCache>,
}

impl Store {
    /// Open (or create) a store, creating the schema and running any
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let rt = Runtime::new().map_err(|e| StoreError::Runtime(e.to_string()))?;

        // Forward slashes for URL compatibility (Windows backslashes don't work)
        let path_str = path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = rt.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(4) // index, query, watch-style CLI parallelism
                .idle_timeout(std::time::Duration::from_secs(300))
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        // WAL mode: concurrent reads, single writer
                        sqlx::query("PRAGMA journal_mode = WAL")
                            .execute(&mut *conn)
                            .await?;
                        // 5000ms busy timeout before SQLITE_BUSY
                        sqlx::query("PRAGMA busy_timeout = 5000")
                            .execute(&mut *conn)
                            .await?;
                        // NORMAL sync: fsync on WAL checkpoint only
                        sqlx::query("PRAGMA synchronous = NORMAL")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA cache_size = -16384")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA temp_store = MEMORY")
                            .execute(&mut *conn)
                            .await?;
                        Ok(())
                    })
                })
                .connect(&db_url)
                .await
        })?;

        let store = Self {
            pool,
            rt,
            window_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CONTEXT_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            for stmt in SCHEMA_STATEMENTS {
                sqlx::query(stmt).execute(&mut *tx).await?;
            }
            // Record the schema version on first creation
            sqlx::query(
                "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            )
            .bind(CURRENT_SCHEMA_VERSION.to_string())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            let stored = self.schema_version_async().await?;
            if stored > CURRENT_SCHEMA_VERSION {
                return Err(StoreError::SchemaNewerThanTool(stored));
            }
            if stored < CURRENT_SCHEMA_VERSION {
                migrations::migrate(&self.pool, stored, CURRENT_SCHEMA_VERSION).await?;
            }
            Ok(())
        })
    }

    async fn schema_version_async(&self) -> Result<i32, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM metadata WHERE key = 'schema_version'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row
            .and_then(|(v,)| v.parse().ok())
            .unwrap_or(CURRENT_SCHEMA_VERSION))
    }

    /// Current stored schema version
    pub fn schema_version(&self) -> Result<i32, StoreError> {
        self.rt.block_on(self.schema_version_async())
    }

    /// Index statistics (entity counts per table)
    pub fn stats(&self) -> Result<IndexStats, StoreError> {
        self.rt.block_on(async {
            let count = |table: &str| {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                async move {
                    let (n,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
                    Ok::<u64, StoreError>(n as u64)
                }
            };
            let generated_at: Option<(String,)> =
                sqlx::query_as("SELECT value FROM metadata WHERE key = 'generated_at'")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(IndexStats {
                files: count("files").await?,
                packages: count("packages").await?,
                functions: count("functions").await?,
                types: count("types").await?,
                calls: count("function_calls").await?,
                relationships: count("type_relationships").await?,
                imports: count("imports").await?,
                usages: count("type_usages").await?,
                schema_version: self.schema_version_async().await?,
                generated_at: generated_at.map(|(v,)| v),
            })
        })
    }

    /// Close the pool explicitly. Also happens on drop.
    pub fn close(&self) {
        self.rt.block_on(self.pool.close());
    }
}

/// Schema DDL, idempotent. See `helpers::CURRENT_SCHEMA_VERSION` for history.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS files (
        file_path TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        module_path TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT 'go'
    )",
    "CREATE TABLE IF NOT EXISTS packages (
        package_id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS functions (
        function_id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        start_pos INTEGER NOT NULL,
        end_pos INTEGER NOT NULL,
        name TEXT NOT NULL,
        module_path TEXT NOT NULL,
        is_exported INTEGER NOT NULL DEFAULT 0,
        is_method INTEGER NOT NULL DEFAULT 0,
        receiver_type_id TEXT,
        receiver_type_name TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_functions_name ON functions(name)",
    "CREATE TABLE IF NOT EXISTS function_parameters (
        function_id TEXT NOT NULL,
        param_name TEXT,
        param_type TEXT NOT NULL,
        param_index INTEGER NOT NULL,
        is_return INTEGER NOT NULL DEFAULT 0,
        is_variadic INTEGER NOT NULL DEFAULT 0,
        type_ref TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_params_function ON function_parameters(function_id)",
    "CREATE INDEX IF NOT EXISTS idx_params_type ON function_parameters(param_type)",
    "CREATE TABLE IF NOT EXISTS function_calls (
        caller_function_id TEXT NOT NULL,
        callee_function_id TEXT,
        callee_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        line INTEGER NOT NULL,
        call_column INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_calls_caller ON function_calls(caller_function_id)",
    "CREATE INDEX IF NOT EXISTS idx_calls_callee ON function_calls(callee_function_id)",
    "CREATE INDEX IF NOT EXISTS idx_calls_callee_name ON function_calls(callee_name)",
    "CREATE TABLE IF NOT EXISTS types (
        type_id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        start_pos INTEGER NOT NULL,
        end_pos INTEGER NOT NULL,
        name TEXT NOT NULL,
        module_path TEXT NOT NULL,
        kind TEXT NOT NULL,
        is_exported INTEGER NOT NULL DEFAULT 0,
        field_count INTEGER NOT NULL DEFAULT 0,
        method_count INTEGER NOT NULL DEFAULT 0,
        embedded TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE INDEX IF NOT EXISTS idx_types_file ON types(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_types_name ON types(name)",
    "CREATE TABLE IF NOT EXISTS type_fields (
        type_id TEXT NOT NULL,
        field_name TEXT NOT NULL,
        declared_type TEXT NOT NULL,
        position INTEGER NOT NULL,
        is_method INTEGER NOT NULL DEFAULT 0,
        param_count INTEGER,
        return_count INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_type_fields_type ON type_fields(type_id)",
    "CREATE TABLE IF NOT EXISTS type_methods (
        type_id TEXT NOT NULL,
        method_name TEXT NOT NULL,
        position INTEGER NOT NULL,
        resolved INTEGER NOT NULL DEFAULT 0,
        params TEXT NOT NULL,
        returns TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_type_methods_type ON type_methods(type_id)",
    "CREATE TABLE IF NOT EXISTS type_relationships (
        from_type_id TEXT NOT NULL,
        to_type_id TEXT NOT NULL,
        relationship_type TEXT NOT NULL,
        file_path TEXT NOT NULL DEFAULT '',
        line INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (from_type_id, to_type_id, relationship_type)
    )",
    "CREATE INDEX IF NOT EXISTS idx_type_rel_to ON type_relationships(to_type_id)",
    "CREATE TABLE IF NOT EXISTS type_usages (
        from_id TEXT NOT NULL,
        to_type_id TEXT NOT NULL,
        context TEXT NOT NULL,
        file_path TEXT NOT NULL,
        line INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_usages_from ON type_usages(from_id)",
    "CREATE INDEX IF NOT EXISTS idx_usages_to ON type_usages(to_type_id)",
    "CREATE TABLE IF NOT EXISTS imports (
        file_path TEXT NOT NULL,
        import_path TEXT NOT NULL,
        import_line INTEGER NOT NULL,
        alias TEXT,
        is_standard_lib INTEGER NOT NULL DEFAULT 0,
        is_external INTEGER NOT NULL DEFAULT 0,
        is_relative INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (file_path, import_path, import_line)
    )",
    "CREATE INDEX IF NOT EXISTS idx_imports_path ON imports(import_path)",
];

impl Drop for Store {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            self.rt.block_on(self.pool.close());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("graph.db")).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        let stats = store.stats().unwrap();
        assert_eq!(stats.functions, 0);
        assert_eq!(stats.files, 0);
    }

    #[test]
    fn test_reopen_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = Store::open(&path).unwrap();
            store.close();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .rt
                .block_on(async {
                    sqlx::query("UPDATE metadata SET value = '99' WHERE key = 'schema_version'")
                        .execute(&store.pool)
                        .await
                })
                .unwrap();
            store.close();
        }
        match Store::open(&path) {
            Err(StoreError::SchemaNewerThanTool(v)) => assert_eq!(v, 99),
            Err(other) => panic!("Expected SchemaNewerThanTool, got: {other:?}"),
            Ok(_) => panic!("Expected SchemaNewerThanTool, got Ok"),
        }
    }
}
