//! Query engine: the single `query(request) → response` operation
//!
//! Validates the request shape, resolves the target, dispatches to the
//! store's recursive SQL, assembles results (dedup, caps, filters,
//! context), and stamps response metadata. Each storage operation runs
//! under its own read-only transaction; cancellation is observed at
//! transaction boundaries.
//!
//! Split into submodules:
//! - `types` — request/response contract
//! - `results` — result assembly pipeline
//! - `path` — in-memory BFS for shortest paths
//! - `impact` — three-phase impact aggregation

mod impact;
mod path;
mod results;
pub mod types;

pub use types::{
    ImpactSummary, QueryError, QueryOp, QueryRequest, QueryResponse, QueryResult,
    ResponseMetadata, DEFAULT_CONTEXT_LINES, DEFAULT_DEPTH, DEFAULT_MAX_PER_LEVEL,
    DEFAULT_MAX_RESULTS, MAX_CONTEXT_LINES, MAX_DEPTH,
};

use std::collections::HashMap;
use std::time::Instant;

use crate::cancel::CancelFlag;
use crate::store::{NodeRow, Store, TraversalRow};

use results::{build_results, context_for, Assembled, Tagged};

pub(crate) use results::like_to_regex;

/// Stateless view over a persisted graph
///
/// Holds no state beyond the store handle; multiple engines (and multiple
/// concurrent queries through one engine) are safe because every operation
/// takes its own read-only snapshot.
pub struct QueryEngine<'a> {
    store: &'a Store,
    cancel: CancelFlag,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a Store, cancel: CancelFlag) -> Self {
        Self { store, cancel }
    }

    /// Execute one query.
    pub fn query(&self, req: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let started = Instant::now();
        req.validate()?;
        self.cancel.check()?;
        let _span = tracing::info_span!(
            "query",
            operation = %req.operation,
            target = %req.target
        )
        .entered();

        let response = match req.operation {
            QueryOp::Callers => {
                let target = self.store.resolve_function_target(&req.target)?;
                let rows = self.store.traverse_callers(&target, req.depth())?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::Callees => {
                let target = self.store.resolve_function_target(&req.target)?;
                let rows = self.store.traverse_callees(&target, req.depth())?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::Dependencies => {
                let rows = self.store.package_dependencies(&req.target)?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::Dependents => {
                let rows = self.store.package_dependents(&req.target)?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::TypeUsages => {
                let rows = self.store.type_usages(&req.target)?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::Implementations => {
                let target = self
                    .store
                    .resolve_type_target(&req.target)?
                    .map(|t| t.id)
                    .unwrap_or_else(|| req.target.clone());
                let rows = self.store.implementations(&target)?;
                self.respond(req, self.assemble(rows, req)?, None, None, started)
            }
            QueryOp::Path => self.query_path(req, started)?,
            QueryOp::Impact => {
                let (tagged, summary) = impact::run_impact(self.store, req)?;
                let assembled = build_results(tagged, req, self.store)?;
                self.respond(req, assembled, None, Some(summary), started)
            }
        };
        self.cancel.check()?;
        Ok(response)
    }

    fn assemble(&self, rows: Vec<TraversalRow>, req: &QueryRequest) -> Result<Assembled, QueryError> {
        build_results(rows.into_iter().map(Tagged::plain).collect(), req, self.store)
    }

    /// Shortest call path: load the depth-bounded reachable edge set, BFS in
    /// memory, hydrate the discovered id sequence. Scope and excludes are
    /// not honored here.
    fn query_path(&self, req: &QueryRequest, started: Instant) -> Result<QueryResponse, QueryError> {
        let to_raw = req.to.as_deref().unwrap_or_default();
        let from = self.store.resolve_function_target(&req.target)?;
        let to = self.store.resolve_function_target(to_raw)?;

        let edges = self.store.reachable_call_edges(&from, req.depth())?;
        let Some(ids) = path::shortest_path(&edges, &from, &to, req.depth()) else {
            let suggestion = format!(
                "No call path from '{from}' to '{to}' within {} hops. Try a larger depth (max {MAX_DEPTH}).",
                req.depth()
            );
            return Ok(self.respond(
                req,
                Assembled {
                    results: Vec::new(),
                    total_found: 0,
                    truncated: false,
                    truncated_at_depth: None,
                },
                Some(suggestion),
                None,
                started,
            ));
        };

        let by_id: HashMap<String, NodeRow> = self
            .store
            .function_nodes_by_ids(&ids)?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        // Results ordered by position along the path; depth is the position
        let mut result_rows = Vec::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            let Some(node) = by_id.get(id) else {
                tracing::warn!(id, "Path node missing from functions table");
                continue;
            };
            let context = context_for(self.store, req, node);
            result_rows.push(QueryResult {
                id: node.id.clone(),
                kind: node.kind.clone(),
                name: node.name.clone(),
                file: node.file.clone(),
                module_path: node.module_path.clone(),
                start_line: node.start_line,
                end_line: node.end_line,
                depth: position as u32,
                matched_type: None,
                impact_type: None,
                severity: None,
                context,
            });
        }

        let total_found = result_rows.len();
        let truncated = result_rows.len() > req.max_results();
        if truncated {
            result_rows.truncate(req.max_results());
        }

        Ok(self.respond(
            req,
            Assembled {
                results: result_rows,
                total_found,
                truncated,
                truncated_at_depth: None,
            },
            None,
            None,
            started,
        ))
    }

    fn respond(
        &self,
        req: &QueryRequest,
        assembled: Assembled,
        suggestion: Option<String>,
        summary: Option<ImpactSummary>,
        started: Instant,
    ) -> QueryResponse {
        QueryResponse {
            operation: req.operation.to_string(),
            target: req.target.clone(),
            total_found: assembled.total_found,
            total_returned: assembled.results.len(),
            results: assembled.results,
            truncated: assembled.truncated,
            truncated_at_depth: assembled.truncated_at_depth,
            suggestion,
            summary,
            metadata: ResponseMetadata {
                took_ms: started.elapsed().as_millis() as u64,
                source: "graph",
            },
        }
    }
}
