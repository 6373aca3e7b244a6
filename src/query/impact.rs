//! Three-phase impact aggregation
//!
//! Phase 1: implementations of the target interface (severity
//! `must_update`). Phase 2: direct callers (`must_update`). Phase 3:
//! transitive callers up to the requested depth (`review_needed`), excluding
//! the target and the direct set. The summary tallies each phase before any
//! result truncation.

use crate::store::{Store, TraversalRow};

use super::results::Tagged;
use super::types::{ImpactSummary, QueryError, QueryRequest};

pub(crate) fn run_impact(
    store: &Store,
    req: &QueryRequest,
) -> Result<(Vec<Tagged>, ImpactSummary), QueryError> {
    // A type target wins; otherwise fall back to function resolution
    let target = match store.resolve_type_target(&req.target)? {
        Some(t) => t.id,
        None => store.resolve_function_target(&req.target)?,
    };

    let rows = store.impact_rows(&target, req.depth())?;
    let summary = ImpactSummary {
        implementations: rows.implementations.len(),
        direct_callers: rows.direct.len(),
        transitive_callers: rows.transitive.len(),
    };

    let mut tagged = Vec::with_capacity(
        rows.implementations.len() + rows.direct.len() + rows.transitive.len(),
    );
    for node in rows.implementations {
        tagged.push(Tagged {
            row: TraversalRow {
                node,
                depth: 1,
                detail: None,
            },
            impact_type: Some("implementation"),
            severity: Some("must_update"),
        });
    }
    for row in rows.direct {
        tagged.push(Tagged {
            row,
            impact_type: Some("direct_caller"),
            severity: Some("must_update"),
        });
    }
    for row in rows.transitive {
        tagged.push(Tagged {
            row,
            impact_type: Some("transitive"),
            severity: Some("review_needed"),
        });
    }

    Ok((tagged, summary))
}
