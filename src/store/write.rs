//! Graph snapshot write and reload
//!
//! `save_graph` replaces the entire persisted graph in one transaction, so
//! readers either see the previous snapshot or the new one, never a mix.
//! `load_graph` reconstructs the full [`CodeGraph`] for incremental builds.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Row, Sqlite};

use super::helpers::{clamp_u32, StoreError, SNAPSHOT_VERSION};
use super::Store;
use crate::extract::{
    CallEntity, FunctionEntity, ImportEntity, MethodSignature, PackageEntity, ParameterEntity,
    TypeEntity, TypeField, TypeReference, TypeUsage, UsageContext,
};
use crate::graph::{CodeGraph, FileRecord, TypeRelationship};

/// Rows per batched INSERT; keeps bind counts well under SQLite's limit
const INSERT_CHUNK: usize = 400;

impl Store {
    /// Replace the persisted graph with a new snapshot.
    ///
    /// Single transaction: concurrent readers complete against the previous
    /// snapshot; new readers see the new one. The context-window cache is
    /// invalidated on success.
    pub fn save_graph(&self, graph: &CodeGraph) -> Result<(), StoreError> {
        let _span = tracing::info_span!(
            "save_graph",
            nodes = graph.node_count(),
            edges = graph.edge_count()
        )
        .entered();

        let result = self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;

            for table in [
                "files",
                "packages",
                "functions",
                "function_parameters",
                "function_calls",
                "types",
                "type_fields",
                "type_methods",
                "type_relationships",
                "type_usages",
                "imports",
            ] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *tx)
                    .await?;
            }

            let files: Vec<&FileRecord> = graph.files.values().collect();
            for chunk in files.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO files (file_path, content, content_hash, module_path, language) ",
                );
                qb.push_values(chunk, |mut b, f| {
                    b.push_bind(&f.path)
                        .push_bind(&f.content)
                        .push_bind(&f.content_hash)
                        .push_bind(&f.module_path)
                        .push_bind(&f.language);
                });
                qb.build().execute(&mut *tx).await?;
            }

            let packages: Vec<&PackageEntity> = graph.packages.values().collect();
            for chunk in packages.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> =
                    QueryBuilder::new("INSERT INTO packages (package_id, name) ");
                qb.push_values(chunk, |mut b, p| {
                    b.push_bind(&p.id).push_bind(&p.name);
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.functions.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO functions (function_id, file_path, start_line, end_line, \
                     start_pos, end_pos, name, module_path, is_exported, is_method, \
                     receiver_type_id, receiver_type_name) ",
                );
                qb.push_values(chunk, |mut b, f| {
                    b.push_bind(&f.id)
                        .push_bind(&f.file)
                        .push_bind(f.start_line as i64)
                        .push_bind(f.end_line as i64)
                        .push_bind(f.start_byte as i64)
                        .push_bind(f.end_byte as i64)
                        .push_bind(&f.name)
                        .push_bind(&f.module_path)
                        .push_bind(f.is_exported)
                        .push_bind(f.is_method)
                        .push_bind(&f.receiver_type_id)
                        .push_bind(&f.receiver_type_name);
                });
                qb.build().execute(&mut *tx).await?;
            }

            let params: Vec<(&str, &ParameterEntity)> = graph
                .functions
                .iter()
                .flat_map(|f| f.parameters.iter().map(move |p| (f.id.as_str(), p)))
                .collect();
            for chunk in params.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO function_parameters (function_id, param_name, param_type, \
                     param_index, is_return, is_variadic, type_ref) ",
                );
                qb.push_values(chunk, |mut b, (fid, p)| {
                    b.push_bind(*fid)
                        .push_bind(&p.name)
                        .push_bind(&p.declared_type)
                        .push_bind(p.position as i64)
                        .push_bind(p.is_return)
                        .push_bind(p.is_variadic)
                        .push_bind(encode_json(&p.type_ref));
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.calls.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO function_calls (caller_function_id, callee_function_id, \
                     callee_name, file_path, line, call_column) ",
                );
                qb.push_values(chunk, |mut b, c| {
                    b.push_bind(&c.caller_id)
                        .push_bind(&c.callee_id)
                        .push_bind(&c.callee_name)
                        .push_bind(&c.file)
                        .push_bind(c.line as i64)
                        .push_bind(c.column.map(|v| v as i64));
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.types.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO types (type_id, file_path, start_line, end_line, start_pos, \
                     end_pos, name, module_path, kind, is_exported, field_count, method_count, \
                     embedded) ",
                );
                qb.push_values(chunk, |mut b, t| {
                    b.push_bind(&t.id)
                        .push_bind(&t.file)
                        .push_bind(t.start_line as i64)
                        .push_bind(t.end_line as i64)
                        .push_bind(t.start_byte as i64)
                        .push_bind(t.end_byte as i64)
                        .push_bind(&t.name)
                        .push_bind(&t.module_path)
                        .push_bind(t.kind.as_str())
                        .push_bind(t.is_exported)
                        .push_bind(t.field_count() as i64)
                        .push_bind(t.method_count() as i64)
                        .push_bind(encode_json(&t.embedded_types));
                });
                qb.build().execute(&mut *tx).await?;
            }

            let fields: Vec<(&str, &TypeField)> = graph
                .types
                .iter()
                .flat_map(|t| t.fields.iter().map(move |f| (t.id.as_str(), f)))
                .collect();
            for chunk in fields.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO type_fields (type_id, field_name, declared_type, position, \
                     is_method, param_count, return_count) ",
                );
                qb.push_values(chunk, |mut b, (tid, f)| {
                    b.push_bind(*tid)
                        .push_bind(&f.name)
                        .push_bind(&f.declared_type)
                        .push_bind(f.position as i64)
                        .push_bind(f.is_method)
                        .push_bind(f.param_count.map(|v| v as i64))
                        .push_bind(f.return_count.map(|v| v as i64));
                });
                qb.build().execute(&mut *tx).await?;
            }

            // Declared methods (resolved = 0) and flattened interface sets
            // (resolved = 1)
            let mut methods: Vec<(&str, bool, usize, &MethodSignature)> = Vec::new();
            for t in &graph.types {
                for (i, m) in t.methods.iter().enumerate() {
                    methods.push((t.id.as_str(), false, i, m));
                }
                for (i, m) in t.resolved_methods.iter().enumerate() {
                    methods.push((t.id.as_str(), true, i, m));
                }
            }
            for chunk in methods.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO type_methods (type_id, method_name, position, resolved, \
                     params, returns) ",
                );
                qb.push_values(chunk, |mut b, (tid, resolved, pos, m)| {
                    b.push_bind(*tid)
                        .push_bind(&m.name)
                        .push_bind(*pos as i64)
                        .push_bind(*resolved)
                        .push_bind(encode_json(&m.params))
                        .push_bind(encode_json(&m.returns));
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.relationships.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT OR IGNORE INTO type_relationships (from_type_id, to_type_id, \
                     relationship_type, file_path, line) ",
                );
                qb.push_values(chunk, |mut b, r| {
                    b.push_bind(&r.from_type_id)
                        .push_bind(&r.to_type_id)
                        .push_bind(r.kind.as_str())
                        .push_bind(&r.file)
                        .push_bind(r.line as i64);
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.usages.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO type_usages (from_id, to_type_id, context, file_path, line) ",
                );
                qb.push_values(chunk, |mut b, u| {
                    b.push_bind(&u.from_id)
                        .push_bind(&u.to_type)
                        .push_bind(u.context.as_str())
                        .push_bind(&u.file)
                        .push_bind(u.line as i64);
                });
                qb.build().execute(&mut *tx).await?;
            }

            for chunk in graph.imports.chunks(INSERT_CHUNK) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT OR IGNORE INTO imports (file_path, import_path, import_line, alias, \
                     is_standard_lib, is_external, is_relative) ",
                );
                qb.push_values(chunk, |mut b, i| {
                    b.push_bind(&i.file)
                        .push_bind(&i.import_path)
                        .push_bind(i.line as i64)
                        .push_bind(&i.alias)
                        .push_bind(i.is_standard_lib)
                        .push_bind(i.is_external)
                        .push_bind(i.is_relative);
                });
                qb.build().execute(&mut *tx).await?;
            }

            for (key, value) in [
                ("snapshot_version", SNAPSHOT_VERSION.to_string()),
                ("generated_at", chrono::Utc::now().to_rfc3339()),
                ("node_count", graph.node_count().to_string()),
                ("edge_count", graph.edge_count().to_string()),
            ] {
                sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)")
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        });

        if result.is_ok() {
            // Stored contents changed; cached windows are stale
            if let Ok(mut cache) = self.window_cache.lock() {
                cache.clear();
            }
            tracing::info!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "Graph snapshot saved"
            );
        }
        result
    }

    /// Reconstruct the full graph (used as `previous` for incremental builds).
    pub fn load_graph(&self) -> Result<CodeGraph, StoreError> {
        self.rt.block_on(async {
            let mut graph = CodeGraph::default();

            let rows = sqlx::query(
                "SELECT file_path, content, content_hash, module_path, language FROM files",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let path: String = row.get(0);
                graph.files.insert(
                    path.clone(),
                    FileRecord {
                        path,
                        content: row.get(1),
                        content_hash: row.get(2),
                        module_path: row.get(3),
                        language: row.get(4),
                    },
                );
            }

            let rows = sqlx::query("SELECT package_id, name FROM packages")
                .fetch_all(&self.pool)
                .await?;
            for row in rows {
                let id: String = row.get(0);
                graph.packages.insert(
                    id.clone(),
                    PackageEntity {
                        id,
                        name: row.get(1),
                    },
                );
            }

            // Per-type child rows, grouped then attached
            let mut fields: HashMap<String, Vec<TypeField>> = HashMap::new();
            let rows = sqlx::query(
                "SELECT type_id, field_name, declared_type, position, is_method, param_count, \
                 return_count FROM type_fields ORDER BY type_id, position",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                fields.entry(row.get(0)).or_default().push(TypeField {
                    name: row.get(1),
                    declared_type: row.get(2),
                    position: clamp_u32(row.get(3)),
                    is_method: row.get(4),
                    param_count: row.get::<Option<i64>, _>(5).map(clamp_u32),
                    return_count: row.get::<Option<i64>, _>(6).map(clamp_u32),
                });
            }

            let mut declared: HashMap<String, Vec<MethodSignature>> = HashMap::new();
            let mut resolved: HashMap<String, Vec<MethodSignature>> = HashMap::new();
            let rows = sqlx::query(
                "SELECT type_id, method_name, resolved, params, returns FROM type_methods \
                 ORDER BY type_id, resolved, position",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let sig = MethodSignature {
                    name: row.get(1),
                    params: decode_json(row.get::<String, _>(3).as_str())?,
                    returns: decode_json(row.get::<String, _>(4).as_str())?,
                };
                let target = if row.get::<bool, _>(2) {
                    &mut resolved
                } else {
                    &mut declared
                };
                target.entry(row.get(0)).or_default().push(sig);
            }

            let rows = sqlx::query(
                "SELECT type_id, file_path, start_line, end_line, start_pos, end_pos, name, \
                 module_path, kind, is_exported, embedded FROM types ORDER BY type_id",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let id: String = row.get(0);
                let kind: String = row.get(8);
                graph.types.push(TypeEntity {
                    kind: kind
                        .parse()
                        .map_err(|e: String| StoreError::Corrupt(e))?,
                    file: row.get(1),
                    start_line: clamp_u32(row.get(2)),
                    end_line: clamp_u32(row.get(3)),
                    start_byte: clamp_u32(row.get(4)),
                    end_byte: clamp_u32(row.get(5)),
                    name: row.get(6),
                    module_path: row.get(7),
                    is_exported: row.get(9),
                    embedded_types: decode_json(row.get::<String, _>(10).as_str())?,
                    fields: fields.remove(&id).unwrap_or_default(),
                    methods: declared.remove(&id).unwrap_or_default(),
                    resolved_methods: resolved.remove(&id).unwrap_or_default(),
                    id,
                });
            }

            let mut params: HashMap<String, Vec<ParameterEntity>> = HashMap::new();
            let rows = sqlx::query(
                "SELECT function_id, param_name, param_type, param_index, is_return, \
                 is_variadic, type_ref FROM function_parameters \
                 ORDER BY function_id, is_return, param_index",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let type_ref: TypeReference = decode_json(row.get::<String, _>(6).as_str())?;
                params.entry(row.get(0)).or_default().push(ParameterEntity {
                    name: row.get(1),
                    declared_type: row.get(2),
                    position: clamp_u32(row.get(3)),
                    is_return: row.get(4),
                    is_variadic: row.get(5),
                    type_ref,
                });
            }

            let rows = sqlx::query(
                "SELECT function_id, file_path, start_line, end_line, start_pos, end_pos, name, \
                 module_path, is_exported, is_method, receiver_type_id, receiver_type_name \
                 FROM functions ORDER BY function_id",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let id: String = row.get(0);
                graph.functions.push(FunctionEntity {
                    file: row.get(1),
                    start_line: clamp_u32(row.get(2)),
                    end_line: clamp_u32(row.get(3)),
                    start_byte: clamp_u32(row.get(4)),
                    end_byte: clamp_u32(row.get(5)),
                    name: row.get(6),
                    module_path: row.get(7),
                    is_exported: row.get(8),
                    is_method: row.get(9),
                    receiver_type_id: row.get(10),
                    receiver_type_name: row.get(11),
                    parameters: params.remove(&id).unwrap_or_default(),
                    id,
                });
            }

            let rows = sqlx::query(
                "SELECT caller_function_id, callee_function_id, callee_name, file_path, line, \
                 call_column FROM function_calls",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                graph.calls.push(CallEntity {
                    caller_id: row.get(0),
                    callee_id: row.get(1),
                    callee_name: row.get(2),
                    file: row.get(3),
                    line: clamp_u32(row.get(4)),
                    column: row.get::<Option<i64>, _>(5).map(clamp_u32),
                });
            }

            let rows = sqlx::query(
                "SELECT from_type_id, to_type_id, relationship_type, file_path, line \
                 FROM type_relationships",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let kind: String = row.get(2);
                graph.relationships.push(TypeRelationship {
                    from_type_id: row.get(0),
                    to_type_id: row.get(1),
                    kind: kind
                        .parse()
                        .map_err(|e: String| StoreError::Corrupt(e))?,
                    file: row.get(3),
                    line: clamp_u32(row.get(4)),
                });
            }

            let rows = sqlx::query(
                "SELECT from_id, to_type_id, context, file_path, line FROM type_usages",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let context: String = row.get(2);
                graph.usages.push(TypeUsage {
                    from_id: row.get(0),
                    to_type: row.get(1),
                    context: parse_context(&context)?,
                    file: row.get(3),
                    line: clamp_u32(row.get(4)),
                });
            }

            let rows = sqlx::query(
                "SELECT file_path, import_path, import_line, alias, is_standard_lib, \
                 is_external, is_relative FROM imports",
            )
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let file: String = row.get(0);
                let import_path: String = row.get(1);
                graph.imports.push(ImportEntity {
                    id: format!("{file}:{import_path}"),
                    file,
                    import_path,
                    line: clamp_u32(row.get(2)),
                    alias: row.get(3),
                    is_standard_lib: row.get(4),
                    is_external: row.get(5),
                    is_relative: row.get(6),
                });
            }

            Ok(graph)
        })
    }

    /// Stored content hashes keyed by file path, for change detection.
    pub fn file_hashes(&self) -> Result<HashMap<String, String>, StoreError> {
        self.rt.block_on(async {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT file_path, content_hash FROM files")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().collect())
        })
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("bad JSON column: {e}")))
}

fn parse_context(raw: &str) -> Result<UsageContext, StoreError> {
    match raw {
        "parameter" => Ok(UsageContext::Parameter),
        "return" => Ok(UsageContext::Return),
        "field" => Ok(UsageContext::Field),
        "signature" => Ok(UsageContext::Signature),
        other => Err(StoreError::Corrupt(format!("unknown usage context: {other}"))),
    }
}
