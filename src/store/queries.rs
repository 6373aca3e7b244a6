//! Query-engine SQL: recursive CTE traversals over the persisted graph
//!
//! Every public method wraps its statements in one read-only transaction
//! (BEGIN … ROLLBACK) so a query sees a consistent snapshot under
//! concurrent writes. Rollback runs on every exit path: explicitly on
//! success, implicitly on drop for errors.
//!
//! Recursive traversals carry a monotone depth counter bounded by the
//! requested depth, which guarantees termination over cyclic call graphs.

use sqlx::{QueryBuilder, Row, Sqlite};

use super::helpers::{clamp_u32, NodeRow, StoreError, TraversalRow};
use super::Store;

/// Function metadata columns shared by all traversal projections
const FUNCTION_COLS: &str = "f.function_id, f.file_path, f.start_line, f.end_line, \
                             f.start_pos, f.end_pos, f.name, f.module_path";

/// The three impact phases, fetched under one read transaction
#[derive(Debug, Default)]
pub struct ImpactRows {
    pub implementations: Vec<NodeRow>,
    pub direct: Vec<TraversalRow>,
    pub transitive: Vec<TraversalRow>,
}

fn function_node(row: &sqlx::sqlite::SqliteRow) -> NodeRow {
    NodeRow {
        id: row.get(0),
        kind: "function".to_string(),
        file: row.get(1),
        start_line: clamp_u32(row.get(2)),
        end_line: clamp_u32(row.get(3)),
        start_pos: clamp_u32(row.get(4)),
        end_pos: clamp_u32(row.get(5)),
        name: row.get(6),
        module_path: row.get(7),
    }
}

fn type_node(row: &sqlx::sqlite::SqliteRow) -> NodeRow {
    NodeRow {
        id: row.get(0),
        file: row.get(1),
        start_line: clamp_u32(row.get(2)),
        end_line: clamp_u32(row.get(3)),
        start_pos: clamp_u32(row.get(4)),
        end_pos: clamp_u32(row.get(5)),
        name: row.get(6),
        module_path: row.get(7),
        kind: row.get(8),
    }
}

impl Store {
    /// Resolve a query target to a function id: exact id wins, else a
    /// unique name match, else the target as given (name matching at query
    /// time absorbs the rest).
    pub fn resolve_function_target(&self, target: &str) -> Result<String, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let exact: Option<(String,)> =
                sqlx::query_as("SELECT function_id FROM functions WHERE function_id = ?1")
                    .bind(target)
                    .fetch_optional(&mut *tx)
                    .await?;
            let resolved = match exact {
                Some((id,)) => id,
                None => {
                    let by_name: Vec<(String,)> = sqlx::query_as(
                        "SELECT function_id FROM functions WHERE name = ?1 LIMIT 2",
                    )
                    .bind(target)
                    .fetch_all(&mut *tx)
                    .await?;
                    match by_name.as_slice() {
                        [(id,)] => id.clone(),
                        _ => target.to_string(),
                    }
                }
            };
            tx.rollback().await?;
            Ok(resolved)
        })
    }

    /// Resolve a query target to a type node: exact id, else unique name.
    pub fn resolve_type_target(&self, target: &str) -> Result<Option<NodeRow>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let node = resolve_type_in_tx(&mut tx, target).await?;
            tx.rollback().await?;
            Ok(node)
        })
    }

    /// All functions transitively calling `target`, with minimum depths.
    ///
    /// The base case matches `callee_function_id` or `callee_name` so
    /// unresolved calls are absorbed; recursion follows resolved edges only.
    pub fn traverse_callers(
        &self,
        target: &str,
        max_depth: u32,
    ) -> Result<Vec<TraversalRow>, StoreError> {
        let sql = format!(
            "WITH RECURSIVE walk(fid, depth) AS ( \
                 SELECT fc.caller_function_id, 1 \
                   FROM function_calls fc \
                  WHERE fc.callee_function_id = ?1 OR fc.callee_name = ?2 \
                 UNION \
                 SELECT fc.caller_function_id, walk.depth + 1 \
                   FROM function_calls fc \
                   JOIN walk ON fc.callee_function_id = walk.fid \
                  WHERE walk.depth < ?3 \
             ) \
             SELECT {FUNCTION_COLS}, MIN(walk.depth) AS depth \
               FROM walk \
               JOIN functions f ON f.function_id = walk.fid \
              GROUP BY f.function_id \
              ORDER BY depth ASC, f.function_id ASC"
        );
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows = sqlx::query(&sql)
                .bind(target)
                .bind(target)
                .bind(max_depth as i64)
                .fetch_all(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok(rows
                .iter()
                .map(|row| TraversalRow {
                    node: function_node(row),
                    depth: clamp_u32(row.get(8)),
                    detail: None,
                })
                .collect())
        })
    }

    /// All functions transitively called by `target`, with minimum depths.
    pub fn traverse_callees(
        &self,
        target: &str,
        max_depth: u32,
    ) -> Result<Vec<TraversalRow>, StoreError> {
        let sql = format!(
            "WITH RECURSIVE walk(fid, depth) AS ( \
                 SELECT fc.callee_function_id, 1 \
                   FROM function_calls fc \
                  WHERE fc.caller_function_id = ?1 AND fc.callee_function_id IS NOT NULL \
                 UNION \
                 SELECT fc.callee_function_id, walk.depth + 1 \
                   FROM function_calls fc \
                   JOIN walk ON fc.caller_function_id = walk.fid \
                  WHERE walk.depth < ?2 AND fc.callee_function_id IS NOT NULL \
             ) \
             SELECT {FUNCTION_COLS}, MIN(walk.depth) AS depth \
               FROM walk \
               JOIN functions f ON f.function_id = walk.fid \
              GROUP BY f.function_id \
              ORDER BY depth ASC, f.function_id ASC"
        );
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows = sqlx::query(&sql)
                .bind(target)
                .bind(max_depth as i64)
                .fetch_all(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok(rows
                .iter()
                .map(|row| TraversalRow {
                    node: function_node(row),
                    depth: clamp_u32(row.get(8)),
                    detail: None,
                })
                .collect())
        })
    }

    /// Packages imported by the target package's files.
    pub fn package_dependencies(&self, target: &str) -> Result<Vec<TraversalRow>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT i.import_path \
                   FROM imports i \
                   JOIN files fl ON fl.file_path = i.file_path \
                  WHERE fl.module_path = ?1 \
                  ORDER BY i.import_path",
            )
            .bind(target)
            .fetch_all(&mut *tx)
            .await?;
            tx.rollback().await?;
            Ok(rows
                .into_iter()
                .map(|(path,)| TraversalRow {
                    node: NodeRow::package(&path),
                    depth: 1,
                    detail: None,
                })
                .collect())
        })
    }

    /// Packages whose files import the target path.
    ///
    /// Matches the import path exactly or as a final path segment chain, so
    /// `server` finds importers of `github.com/acme/app/server`.
    pub fn package_dependents(&self, target: &str) -> Result<Vec<TraversalRow>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT fl.module_path \
                   FROM imports i \
                   JOIN files fl ON fl.file_path = i.file_path \
                  WHERE i.import_path = ?1 OR i.import_path LIKE '%/' || ?2 \
                  ORDER BY fl.module_path",
            )
            .bind(target)
            .bind(target)
            .fetch_all(&mut *tx)
            .await?;
            tx.rollback().await?;
            Ok(rows
                .into_iter()
                .map(|(module,)| TraversalRow {
                    node: NodeRow::package(&module),
                    depth: 1,
                    detail: None,
                })
                .collect())
        })
    }

    /// Functions whose parameter or return types match the pattern.
    ///
    /// Patterns containing `%` or `_` use SQL LIKE semantics; anything else
    /// matches exactly. The matched declared type is returned as detail.
    pub fn type_usages(&self, pattern: &str) -> Result<Vec<TraversalRow>, StoreError> {
        let is_pattern = pattern.contains('%') || pattern.contains('_');
        let operator = if is_pattern { "LIKE" } else { "=" };
        let sql = format!(
            "SELECT DISTINCT {FUNCTION_COLS}, fp.param_type \
               FROM function_parameters fp \
               JOIN functions f ON f.function_id = fp.function_id \
              WHERE fp.param_type {operator} ?1 \
              ORDER BY f.function_id ASC, fp.param_type ASC"
        );
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows = sqlx::query(&sql)
                .bind(pattern)
                .fetch_all(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok(rows
                .iter()
                .map(|row| TraversalRow {
                    node: function_node(row),
                    depth: 1,
                    detail: Some(row.get(8)),
                })
                .collect())
        })
    }

    /// Types implementing the target interface, via precomputed relations.
    pub fn implementations(&self, interface_id: &str) -> Result<Vec<TraversalRow>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows = implementations_in_tx(&mut tx, interface_id).await?;
            tx.rollback().await?;
            Ok(rows
                .into_iter()
                .map(|node| TraversalRow {
                    node,
                    depth: 1,
                    detail: None,
                })
                .collect())
        })
    }

    /// Resolved call edges reachable from `target` within `max_depth` hops.
    ///
    /// Feeds the in-memory BFS for shortest-path queries.
    pub fn reachable_call_edges(
        &self,
        target: &str,
        max_depth: u32,
    ) -> Result<Vec<(String, String)>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<(String, String)> = sqlx::query_as(
                "WITH RECURSIVE reach(fid, depth) AS ( \
                     SELECT ?1, 0 \
                     UNION \
                     SELECT fc.callee_function_id, reach.depth + 1 \
                       FROM function_calls fc \
                       JOIN reach ON fc.caller_function_id = reach.fid \
                      WHERE reach.depth < ?2 AND fc.callee_function_id IS NOT NULL \
                 ) \
                 SELECT DISTINCT fc.caller_function_id, fc.callee_function_id \
                   FROM function_calls fc \
                   JOIN reach ON fc.caller_function_id = reach.fid \
                  WHERE fc.callee_function_id IS NOT NULL AND reach.depth < ?3",
            )
            .bind(target)
            .bind(max_depth as i64)
            .bind(max_depth as i64)
            .fetch_all(&mut *tx)
            .await?;
            tx.rollback().await?;
            Ok(rows)
        })
    }

    /// Node metadata for a set of function ids (shortest-path hydration).
    pub fn function_nodes_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<NodeRow>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {FUNCTION_COLS} FROM functions f WHERE f.function_id IN ("
            ));
            {
                let mut sep = qb.separated(", ");
                for id in ids {
                    sep.push_bind(id);
                }
            }
            qb.push(")");
            let rows = qb.build().fetch_all(&mut *tx).await?;
            tx.rollback().await?;
            Ok(rows.iter().map(function_node).collect())
        })
    }

    /// Three-phase impact aggregation under a single read transaction.
    ///
    /// Phase 1: implementations of the target (types only). Phase 2: direct
    /// callers — for a function target, callers at depth 1; for a type
    /// target, functions calling any of its methods in selector form
    /// (`x.Method(...)`), the type id, or its bare name as a selector.
    /// Phase 3: transitive callers of the direct set up to `max_depth`.
    pub fn impact_rows(&self, target: &str, max_depth: u32) -> Result<ImpactRows, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let mut out = ImpactRows::default();

            let type_target = resolve_type_in_tx(&mut tx, target).await?;

            match &type_target {
                Some(type_node_row) => {
                    out.implementations = implementations_in_tx(&mut tx, &type_node_row.id).await?;

                    let methods: Vec<(String,)> = sqlx::query_as(
                        "SELECT DISTINCT method_name FROM type_methods \
                          WHERE type_id = ?1 AND resolved = \
                                (CASE WHEN EXISTS (SELECT 1 FROM type_methods \
                                 WHERE type_id = ?2 AND resolved = 1) THEN 1 ELSE 0 END) \
                          ORDER BY method_name",
                    )
                    .bind(&type_node_row.id)
                    .bind(&type_node_row.id)
                    .fetch_all(&mut *tx)
                    .await?;

                    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                        "SELECT DISTINCT {FUNCTION_COLS} \
                           FROM function_calls fc \
                           JOIN functions f ON f.function_id = fc.caller_function_id \
                          WHERE fc.callee_name = "
                    ));
                    qb.push_bind(&type_node_row.id);
                    qb.push(" OR fc.callee_name LIKE '%.' || ");
                    qb.push_bind(&type_node_row.name);
                    for (m,) in &methods {
                        qb.push(" OR fc.callee_name LIKE '%.' || ");
                        qb.push_bind(m);
                    }
                    qb.push(" ORDER BY f.function_id ASC");
                    let rows = qb.build().fetch_all(&mut *tx).await?;
                    out.direct = rows
                        .iter()
                        .map(|row| TraversalRow {
                            node: function_node(row),
                            depth: 1,
                            detail: None,
                        })
                        .collect();
                }
                None => {
                    let sql = format!(
                        "SELECT DISTINCT {FUNCTION_COLS} \
                           FROM function_calls fc \
                           JOIN functions f ON f.function_id = fc.caller_function_id \
                          WHERE fc.callee_function_id = ?1 OR fc.callee_name = ?2 \
                          ORDER BY f.function_id ASC"
                    );
                    let rows = sqlx::query(&sql)
                        .bind(target)
                        .bind(target)
                        .fetch_all(&mut *tx)
                        .await?;
                    out.direct = rows
                        .iter()
                        .map(|row| TraversalRow {
                            node: function_node(row),
                            depth: 1,
                            detail: None,
                        })
                        .collect();
                }
            }

            // Phase 3: callers of the direct set at depths 2..max_depth,
            // excluding the target and anything already direct
            if max_depth > 1 && !out.direct.is_empty() {
                let seeds: Vec<&str> = out.direct.iter().map(|r| r.node.id.as_str()).collect();
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "WITH RECURSIVE walk(fid, depth) AS ( \
                         SELECT fc.caller_function_id, 2 \
                           FROM function_calls fc \
                          WHERE fc.callee_function_id IN (",
                );
                {
                    let mut sep = qb.separated(", ");
                    for id in &seeds {
                        sep.push_bind(*id);
                    }
                }
                qb.push(
                    ") UNION \
                     SELECT fc.caller_function_id, walk.depth + 1 \
                       FROM function_calls fc \
                       JOIN walk ON fc.callee_function_id = walk.fid \
                      WHERE walk.depth < ",
                );
                qb.push_bind(max_depth as i64);
                qb.push(format!(
                    ") SELECT {FUNCTION_COLS}, MIN(walk.depth) AS depth \
                        FROM walk \
                        JOIN functions f ON f.function_id = walk.fid \
                       GROUP BY f.function_id \
                       ORDER BY depth ASC, f.function_id ASC"
                ));
                let rows = qb.build().fetch_all(&mut *tx).await?;

                let direct_ids: std::collections::HashSet<&str> = seeds.iter().copied().collect();
                out.transitive = rows
                    .iter()
                    .map(|row| TraversalRow {
                        node: function_node(row),
                        depth: clamp_u32(row.get(8)),
                        detail: None,
                    })
                    .filter(|r| r.node.id != target && !direct_ids.contains(r.node.id.as_str()))
                    .filter(|r| {
                        type_target
                            .as_ref()
                            .is_none_or(|t| r.node.id != t.id)
                    })
                    .collect();
            }

            tx.rollback().await?;
            Ok(out)
        })
    }
}

async fn resolve_type_in_tx(
    tx: &mut sqlx::SqliteConnection,
    target: &str,
) -> Result<Option<NodeRow>, StoreError> {
    const TYPE_COLS: &str = "t.type_id, t.file_path, t.start_line, t.end_line, t.start_pos, \
                             t.end_pos, t.name, t.module_path, t.kind";
    let sql = format!("SELECT {TYPE_COLS} FROM types t WHERE t.type_id = ?1");
    if let Some(row) = sqlx::query(&sql).bind(target).fetch_optional(&mut *tx).await? {
        return Ok(Some(type_node(&row)));
    }
    let sql = format!("SELECT {TYPE_COLS} FROM types t WHERE t.name = ?1 LIMIT 2");
    let rows = sqlx::query(&sql).bind(target).fetch_all(&mut *tx).await?;
    match rows.as_slice() {
        [row] => Ok(Some(type_node(row))),
        _ => Ok(None),
    }
}

async fn implementations_in_tx(
    tx: &mut sqlx::SqliteConnection,
    interface_id: &str,
) -> Result<Vec<NodeRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT t.type_id, t.file_path, t.start_line, t.end_line, t.start_pos, t.end_pos, \
                t.name, t.module_path, t.kind \
           FROM type_relationships tr \
           JOIN types t ON t.type_id = tr.from_type_id \
          WHERE tr.to_type_id = ?1 AND tr.relationship_type = 'implements' \
          ORDER BY t.type_id ASC",
    )
    .bind(interface_id)
    .fetch_all(&mut *tx)
    .await?;
    Ok(rows.iter().map(type_node).collect())
}
