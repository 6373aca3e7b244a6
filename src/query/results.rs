//! Result assembly: dedup, truncation, filtering, context attachment
//!
//! Raw traversal rows pass through a fixed pipeline: dedup by id keeping
//! first-seen depth, per-level caps, the overall result cap, scope/exclude
//! filtering (SQL LIKE semantics against file paths), and finally optional
//! context snippets.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::store::{NodeRow, Store, TraversalRow};

use super::types::{QueryError, QueryRequest, QueryResult};

/// A traversal row with optional impact tags
pub(crate) struct Tagged {
    pub row: TraversalRow,
    pub impact_type: Option<&'static str>,
    pub severity: Option<&'static str>,
}

impl Tagged {
    pub fn plain(row: TraversalRow) -> Self {
        Tagged {
            row,
            impact_type: None,
            severity: None,
        }
    }
}

/// Assembled results plus truncation accounting
pub(crate) struct Assembled {
    pub results: Vec<QueryResult>,
    pub total_found: usize,
    pub truncated: bool,
    pub truncated_at_depth: Option<u32>,
}

pub(crate) fn build_results(
    rows: Vec<Tagged>,
    req: &QueryRequest,
    store: &Store,
) -> Result<Assembled, QueryError> {
    // Dedup by id, first-seen depth wins (rows arrive ordered by depth)
    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped: Vec<Tagged> = Vec::with_capacity(rows.len());
    for r in rows {
        if seen.insert(r.row.node.id.clone()) {
            deduped.push(r);
        }
    }
    let total_found = deduped.len();

    // Per-level cap
    let mut truncated = false;
    let mut truncated_at_depth: Option<u32> = None;
    let mut per_level: HashMap<u32, usize> = HashMap::new();
    let mut capped: Vec<Tagged> = Vec::with_capacity(deduped.len());
    for r in deduped {
        let count = per_level.entry(r.row.depth).or_insert(0);
        if *count >= req.max_per_level() {
            truncated = true;
            truncated_at_depth.get_or_insert(r.row.depth);
            continue;
        }
        *count += 1;
        capped.push(r);
    }

    // Overall cap
    if capped.len() > req.max_results() {
        capped.truncate(req.max_results());
        truncated = true;
    }

    // Scope / exclude filtering against file paths (packages match on id)
    let scope = req.scope.as_deref().map(like_to_regex);
    let excludes: Vec<Regex> = req
        .exclude_patterns
        .iter()
        .map(|p| like_to_regex(p))
        .collect();
    let filtered: Vec<Tagged> = capped
        .into_iter()
        .filter(|r| {
            let subject = if r.row.node.file.is_empty() {
                r.row.node.id.as_str()
            } else {
                r.row.node.file.as_str()
            };
            if let Some(re) = &scope {
                if !re.is_match(subject) {
                    return false;
                }
            }
            !excludes.iter().any(|re| re.is_match(subject))
        })
        .collect();

    // Context attachment is best-effort: a missing file drops the snippet,
    // never the result
    let mut results = Vec::with_capacity(filtered.len());
    for r in filtered {
        let node = r.row.node;
        let context = context_for(store, req, &node);
        results.push(QueryResult {
            id: node.id,
            kind: node.kind,
            name: node.name,
            file: node.file,
            module_path: node.module_path,
            start_line: node.start_line,
            end_line: node.end_line,
            depth: r.row.depth,
            matched_type: r.row.detail,
            impact_type: r.impact_type.map(str::to_string),
            severity: r.severity.map(str::to_string),
            context,
        });
    }

    Ok(Assembled {
        results,
        total_found,
        truncated,
        truncated_at_depth,
    })
}

/// Best-effort context snippet: a missing file drops the snippet, never
/// the result.
pub(crate) fn context_for(store: &Store, req: &QueryRequest, node: &NodeRow) -> Option<String> {
    if !req.include_context || node.file.is_empty() {
        return None;
    }
    match store.extract_context(
        &node.file,
        node.start_line,
        node.end_line,
        node.start_pos,
        node.end_pos,
        req.context_lines(),
    ) {
        Ok(snippet) => Some(snippet),
        Err(e) => {
            tracing::debug!(id = %node.id, error = %e, "Context extraction failed");
            None
        }
    }
}

/// Translate a SQL LIKE pattern (`%` any run, `_` one char) into an
/// anchored regex. Falls back to a literal match on compile failure.
pub(crate) fn like_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| {
        Regex::new(&format!("^{}$", regex::escape(pattern))).expect("escaped pattern compiles")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_to_regex_semantics() {
        assert!(like_to_regex("%.go").is_match("server/handler.go"));
        assert!(!like_to_regex("%.go").is_match("server/handler.rs"));
        assert!(like_to_regex("server/%").is_match("server/handler.go"));
        assert!(!like_to_regex("server/%").is_match("client/handler.go"));
        assert!(like_to_regex("%_test.go").is_match("pkg/a_test.go"));
        assert!(like_to_regex("a_c.go").is_match("abc.go"));
        assert!(!like_to_regex("a_c.go").is_match("abbc.go"));
        // Dots are literal, not regex wildcards
        assert!(!like_to_regex("a.go").is_match("axgo"));
    }

    #[test]
    fn test_like_full_string_anchored() {
        assert!(!like_to_regex("handler").is_match("server/handler.go"));
        assert!(like_to_regex("%handler%").is_match("server/handler.go"));
    }
}
