//! Query request and response types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::Cancelled;
use crate::store::StoreError;

/// Default traversal depth
pub const DEFAULT_DEPTH: u32 = 3;
/// Maximum traversal depth — larger depths risk unbounded CTE growth
pub const MAX_DEPTH: u32 = 6;
/// Default result cap
pub const DEFAULT_MAX_RESULTS: usize = 100;
/// Default per-depth-level result cap
pub const DEFAULT_MAX_PER_LEVEL: usize = 50;
/// Default context padding in lines
pub const DEFAULT_CONTEXT_LINES: u32 = 3;
/// Maximum context padding in lines
pub const MAX_CONTEXT_LINES: u32 = 20;

/// Errors returned for malformed or failed queries
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unsupported operation: '{0}'. Valid operations: callers, callees, dependencies, dependents, type_usages, implementations, path, impact")]
    UnsupportedOperation(String),
    #[error("'path' requires a 'to' target")]
    MissingPathTarget,
    #[error("depth {got} exceeds maximum {max}")]
    DepthTooLarge { got: u32, max: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// The eight query operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
    Callers,
    Callees,
    Dependencies,
    Dependents,
    TypeUsages,
    Implementations,
    Path,
    Impact,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Callers => "callers",
            QueryOp::Callees => "callees",
            QueryOp::Dependencies => "dependencies",
            QueryOp::Dependents => "dependents",
            QueryOp::TypeUsages => "type_usages",
            QueryOp::Implementations => "implementations",
            QueryOp::Path => "path",
            QueryOp::Impact => "impact",
        }
    }
}

impl std::fmt::Display for QueryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryOp {
    type Err = QueryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "callers" => Ok(QueryOp::Callers),
            "callees" => Ok(QueryOp::Callees),
            "dependencies" => Ok(QueryOp::Dependencies),
            "dependents" => Ok(QueryOp::Dependents),
            "type_usages" | "type-usages" => Ok(QueryOp::TypeUsages),
            "implementations" => Ok(QueryOp::Implementations),
            "path" => Ok(QueryOp::Path),
            "impact" => Ok(QueryOp::Impact),
            other => Err(QueryError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// A query request.
///
/// `scope` and `exclude_patterns` use SQL LIKE semantics (`%` any run,
/// `_` one character) and match against result file paths; both are
/// ignored by `path`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub operation: QueryOp,
    pub target: String,
    /// Destination for `path`
    #[serde(default)]
    pub to: Option<String>,
    /// Traversal depth (default 3, max 6)
    #[serde(default)]
    pub depth: Option<u32>,
    /// Overall result cap (default 100)
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Per-depth-level cap (default 50)
    #[serde(default)]
    pub max_per_level: Option<usize>,
    #[serde(default)]
    pub include_context: bool,
    /// Context padding in lines (default 3, clamped to 20)
    #[serde(default)]
    pub context_lines: Option<u32>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl QueryRequest {
    pub fn new(operation: QueryOp, target: impl Into<String>) -> Self {
        QueryRequest {
            operation,
            target: target.into(),
            to: None,
            depth: None,
            max_results: None,
            max_per_level: None,
            include_context: false,
            context_lines: None,
            scope: None,
            exclude_patterns: Vec::new(),
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth.unwrap_or(DEFAULT_DEPTH)
    }

    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn max_per_level(&self) -> usize {
        self.max_per_level.unwrap_or(DEFAULT_MAX_PER_LEVEL)
    }

    pub fn context_lines(&self) -> u32 {
        self.context_lines
            .unwrap_or(DEFAULT_CONTEXT_LINES)
            .min(MAX_CONTEXT_LINES)
    }

    /// Shape validation; runs before any storage is touched.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.depth() > MAX_DEPTH {
            return Err(QueryError::DepthTooLarge {
                got: self.depth(),
                max: MAX_DEPTH,
            });
        }
        if self.operation == QueryOp::Path && self.to.is_none() {
            return Err(QueryError::MissingPathTarget);
        }
        Ok(())
    }
}

/// One node in a query response
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub id: String,
    /// "function", "struct", "interface", "alias", or "package"
    pub kind: String,
    pub name: String,
    pub file: String,
    pub module_path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Hop count from the target (path: position along the path)
    pub depth: u32,
    /// Matched declared type (type_usages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_type: Option<String>,
    /// "implementation", "direct_caller", or "transitive" (impact only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_type: Option<String>,
    /// "must_update" or "review_needed" (impact only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Line-numbered source snippet, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Impact phase tallies; unaffected by result truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImpactSummary {
    pub implementations: usize,
    pub direct_callers: usize,
    pub transitive_callers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub took_ms: u64,
    pub source: &'static str,
}

/// A query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub operation: String,
    pub target: String,
    pub results: Vec<QueryResult>,
    pub total_found: usize,
    pub total_returned: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_at_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImpactSummary>,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = QueryRequest::new(QueryOp::Callers, "pkg.Foo");
        assert_eq!(req.depth(), 3);
        assert_eq!(req.max_results(), 100);
        assert_eq!(req.max_per_level(), 50);
        assert_eq!(req.context_lines(), 3);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_depth_over_max_rejected() {
        let mut req = QueryRequest::new(QueryOp::Callers, "pkg.Foo");
        req.depth = Some(7);
        match req.validate() {
            Err(QueryError::DepthTooLarge { got, max }) => {
                assert_eq!(got, 7);
                assert_eq!(max, 6);
            }
            other => panic!("Expected DepthTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_path_requires_to() {
        let req = QueryRequest::new(QueryOp::Path, "pkg.Main");
        assert!(matches!(req.validate(), Err(QueryError::MissingPathTarget)));

        let mut with_to = QueryRequest::new(QueryOp::Path, "pkg.Main");
        with_to.to = Some("pkg.Repo".to_string());
        assert!(with_to.validate().is_ok());
    }

    #[test]
    fn test_context_lines_clamped() {
        let mut req = QueryRequest::new(QueryOp::Callers, "pkg.Foo");
        req.context_lines = Some(100);
        assert_eq!(req.context_lines(), MAX_CONTEXT_LINES);
    }

    #[test]
    fn test_operation_round_trip() {
        for op in [
            QueryOp::Callers,
            QueryOp::Callees,
            QueryOp::Dependencies,
            QueryOp::Dependents,
            QueryOp::TypeUsages,
            QueryOp::Implementations,
            QueryOp::Path,
            QueryOp::Impact,
        ] {
            let parsed: QueryOp = op.as_str().parse().unwrap();
            assert_eq!(op, parsed);
        }
        assert!(matches!(
            "references".parse::<QueryOp>(),
            Err(QueryError::UnsupportedOperation(_))
        ));
    }
}
