//! Graph assembly: full and incremental builds
//!
//! Drives extraction over the eligible file set, merges per-file structures
//! into one deduplicated graph, runs the interface matcher, resolves call
//! edges against the final node set, prunes dangling edges, and emits the
//! canonical [`CodeGraph`].
//!
//! The final graph is independent of extraction order: structures merge in
//! sorted file order and every entity list is canonically sorted before the
//! graph is returned.

pub mod types;

pub use types::{CodeGraph, FileRecord, RelationshipKind, TypeRelationship};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::cancel::{CancelFlag, Cancelled};
use crate::extract::{CodeStructure, ExtractError, Extractor, FunctionEntity, TypeEntity, TypeKind};
use crate::matcher;

/// Errors that abort a build
#[derive(Error, Debug)]
pub enum BuildError {
    /// Read failure on a source file (parse failures are logged and skipped)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Graph assembler
///
/// Owns the canonical graph construction. Extraction runs per file in
/// parallel; the cancellation flag is observed between files.
pub struct Assembler {
    extractor: Extractor,
    cancel: CancelFlag,
}

impl Assembler {
    pub fn new(extractor: Extractor, cancel: CancelFlag) -> Self {
        Self { extractor, cancel }
    }

    /// Build a graph from every eligible file.
    pub fn build_full(&self, root: &Path, files: &[PathBuf]) -> Result<CodeGraph, BuildError> {
        let _span = tracing::info_span!("build_full", files = files.len()).entered();
        let structures = self.extract_all(root, files)?;
        self.build_from_structures(structures)
    }

    /// Full build over pre-extracted structures (the core of
    /// [`build_full`], exposed for hosts that extract elsewhere).
    pub fn build_from_structures(
        &self,
        structures: Vec<CodeStructure>,
    ) -> Result<CodeGraph, BuildError> {
        self.cancel.check()?;
        let mut graph = merge_into(CodeGraph::default(), structures);
        finalize(&mut graph, None);
        Ok(graph)
    }

    /// Incremental rebuild.
    ///
    /// Retains previous nodes and edges from unchanged files, extracts anew
    /// from `changed`, re-runs the matcher for changed types, and prunes.
    /// An empty `previous` degrades to a full build over `all_files`.
    pub fn build_incremental(
        &self,
        root: &Path,
        previous: CodeGraph,
        changed: &[String],
        deleted: &[String],
        all_files: &[PathBuf],
    ) -> Result<CodeGraph, BuildError> {
        if previous.is_empty() {
            return self.build_full(root, all_files);
        }
        let _span = tracing::info_span!(
            "build_incremental",
            changed = changed.len(),
            deleted = deleted.len()
        )
        .entered();

        let gone: HashSet<&str> = changed
            .iter()
            .chain(deleted.iter())
            .map(|s| s.as_str())
            .collect();

        // Types that vanish with their files still count as changed so the
        // matcher clears their stale implements edges
        let mut changed_type_ids: HashSet<String> = previous
            .types
            .iter()
            .filter(|t| gone.contains(t.file.as_str()))
            .map(|t| t.id.clone())
            .collect();

        let retained = retain_unchanged(previous, &gone);

        let changed_paths: Vec<PathBuf> = changed.iter().map(PathBuf::from).collect();
        let structures = self.extract_all(root, &changed_paths)?;
        for s in &structures {
            for t in &s.types {
                changed_type_ids.insert(t.id.clone());
            }
        }

        self.cancel.check()?;
        let mut graph = merge_into(retained, structures);
        finalize(&mut graph, Some(&changed_type_ids));
        Ok(graph)
    }

    /// Extract all files in parallel; parse failures are logged and
    /// skipped, read failures abort, cancellation is observed per file.
    fn extract_all(
        &self,
        root: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<CodeStructure>, BuildError> {
        let results: Vec<Result<Option<CodeStructure>, BuildError>> = files
            .par_iter()
            .map(|file| {
                self.cancel.check()?;
                match self.extractor.extract_file(root, file) {
                    Ok(s) => Ok(Some(s)),
                    Err(ExtractError::Io(e)) => Err(BuildError::Io(e)),
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "Skipping file");
                        Ok(None)
                    }
                }
            })
            .collect();

        let mut structures = Vec::with_capacity(results.len());
        for r in results {
            if let Some(s) = r? {
                structures.push(s);
            }
        }
        // Canonical merge order makes the deduplicated graph independent of
        // extraction order
        structures.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(structures)
    }
}

/// Drop all entities and edges originating from removed or re-extracted files.
fn retain_unchanged(mut g: CodeGraph, gone: &HashSet<&str>) -> CodeGraph {
    g.files.retain(|path, _| !gone.contains(path.as_str()));
    g.types.retain(|t| !gone.contains(t.file.as_str()));
    g.functions.retain(|f| !gone.contains(f.file.as_str()));
    g.imports.retain(|i| !gone.contains(i.file.as_str()));
    g.calls.retain(|c| !gone.contains(c.file.as_str()));
    g.usages.retain(|u| !gone.contains(u.file.as_str()));
    g.relationships.retain(|r| !gone.contains(r.file.as_str()));
    g
}

/// Merge freshly extracted structures into a (possibly retained) graph,
/// applying the duplicate-id rule.
fn merge_into(mut graph: CodeGraph, structures: Vec<CodeStructure>) -> CodeGraph {
    let mut type_index: HashMap<String, usize> = graph
        .types
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();
    let mut func_index: HashMap<String, usize> = graph
        .functions
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id.clone(), i))
        .collect();

    for s in structures {
        graph.files.insert(
            s.file.clone(),
            FileRecord {
                path: s.file.clone(),
                content: s.source,
                content_hash: s.content_hash,
                module_path: s.module_path.clone(),
                language: s.language.to_string(),
            },
        );
        graph.packages.insert(s.package.id.clone(), s.package);

        for t in s.types {
            match type_index.get(&t.id) {
                Some(&i) => {
                    if replace_duplicate(&t.id, &graph.types[i].file, &t.file) {
                        graph.types[i] = t;
                    }
                }
                None => {
                    type_index.insert(t.id.clone(), graph.types.len());
                    graph.types.push(t);
                }
            }
        }
        for f in s.functions {
            match func_index.get(&f.id) {
                Some(&i) => {
                    if replace_duplicate(&f.id, &graph.functions[i].file, &f.file) {
                        graph.functions[i] = f;
                    }
                }
                None => {
                    func_index.insert(f.id.clone(), graph.functions.len());
                    graph.functions.push(f);
                }
            }
        }
        graph.imports.extend(s.imports);
        graph.calls.extend(s.calls);
        graph.usages.extend(s.usages);
    }

    graph
}

/// Duplicate-id rule: prefer the non-test-file occurrence; when both sides
/// agree on test-ness, keep the first seen and warn.
fn replace_duplicate(id: &str, existing_file: &str, new_file: &str) -> bool {
    let existing_test = crate::is_test_file(existing_file);
    let new_test = crate::is_test_file(new_file);
    if existing_test != new_test {
        return existing_test;
    }
    tracing::warn!(
        id,
        first = existing_file,
        second = new_file,
        "Duplicate id; keeping first occurrence"
    );
    false
}

/// Shared tail of full and incremental assembly: back-link methods, run the
/// matcher, resolve call targets, prune dangling edges, and canonicalize
/// ordering. `changed_type_ids` selects the matcher's incremental mode.
fn finalize(graph: &mut CodeGraph, changed_type_ids: Option<&HashSet<String>>) {
    back_link_methods(&mut graph.types, &graph.functions);
    matcher::resolve_embeddings(&mut graph.types);

    // Embeds edges regenerate from the current type set; implements edges
    // come from the matcher (full inference, or incremental re-inference
    // seeded with the retained edge set)
    let previous = std::mem::take(&mut graph.relationships);
    let mut relationships: Vec<TypeRelationship> = graph
        .types
        .iter()
        .flat_map(|t| {
            t.embedded_types.iter().map(|to| TypeRelationship {
                from_type_id: t.id.clone(),
                to_type_id: to.clone(),
                kind: RelationshipKind::Embeds,
                file: t.file.clone(),
                line: t.start_line,
            })
        })
        .collect();
    match changed_type_ids {
        Some(changed) => {
            let retained_implements: Vec<TypeRelationship> = previous
                .into_iter()
                .filter(|r| r.kind == RelationshipKind::Implements)
                .collect();
            relationships.extend(matcher::infer_incremental(
                &graph.types,
                changed,
                retained_implements,
            ));
        }
        None => relationships.extend(matcher::infer_implementations(&graph.types)),
    }
    graph.relationships = relationships;

    resolve_calls(graph);
    prune_dangling(graph);
    canonical_sort(graph);
}

/// Rebuild struct/alias method lists from the deduplicated function set.
///
/// The extractor back-links within one file; this pass covers methods
/// declared in a different file than their receiver and clears methods
/// whose declarations left the graph.
fn back_link_methods(types: &mut [TypeEntity], functions: &[FunctionEntity]) {
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (i, t) in types.iter_mut().enumerate() {
        if t.kind != TypeKind::Interface {
            t.methods.clear();
        }
        by_id.insert(t.id.clone(), i);
    }

    let mut links: Vec<(&str, &FunctionEntity)> = functions
        .iter()
        .filter_map(|f| f.receiver_type_id.as_deref().map(|rid| (rid, f)))
        .collect();
    links.sort_by(|a, b| a.1.id.cmp(&b.1.id));

    for (rid, f) in links {
        if let Some(&i) = by_id.get(rid) {
            if types[i].kind == TypeKind::Interface {
                continue;
            }
            let sig = f.signature();
            if !types[i].methods.contains(&sig) {
                types[i].methods.push(sig);
            }
        }
    }
}

/// Match `callee_name` against the final function-id set.
///
/// Bare-identifier calls carry `{package}.{name}` callee names, which is
/// exactly the free-function id scheme; anything else stays unresolved and
/// is absorbed by name matching at query time.
fn resolve_calls(graph: &mut CodeGraph) {
    let ids: HashSet<&str> = graph.functions.iter().map(|f| f.id.as_str()).collect();
    for call in &mut graph.calls {
        call.callee_id = if ids.contains(call.callee_name.as_str()) {
            Some(call.callee_name.clone())
        } else {
            None
        };
    }
}

/// Drop edges with absent endpoints. `implements` targets may live outside
/// the snapshot and are exempt from the `to` check.
fn prune_dangling(graph: &mut CodeGraph) {
    let type_ids: HashSet<String> = graph.types.iter().map(|t| t.id.clone()).collect();
    let func_ids: HashSet<String> = graph.functions.iter().map(|f| f.id.clone()).collect();

    graph.calls.retain(|c| func_ids.contains(&c.caller_id));
    graph.relationships.retain(|r| {
        if !type_ids.contains(&r.from_type_id) {
            return false;
        }
        match r.kind {
            RelationshipKind::Implements => true,
            RelationshipKind::Embeds => type_ids.contains(&r.to_type_id),
        }
    });
    graph.usages.retain(|u| {
        (func_ids.contains(&u.from_id) || type_ids.contains(&u.from_id))
            && type_ids.contains(&u.to_type)
    });
    graph
        .imports
        .retain(|i| graph.files.contains_key(&i.file));
    // A package survives while any of its files does
    let live_modules: HashSet<&str> = graph
        .files
        .values()
        .map(|f| f.module_path.as_str())
        .collect();
    graph.packages.retain(|id, _| live_modules.contains(id.as_str()));
}

/// Deterministic entity ordering, independent of build path.
fn canonical_sort(graph: &mut CodeGraph) {
    graph.types.sort_by(|a, b| a.id.cmp(&b.id));
    graph.functions.sort_by(|a, b| a.id.cmp(&b.id));
    graph
        .imports
        .sort_by(|a, b| (&a.file, a.line, &a.import_path).cmp(&(&b.file, b.line, &b.import_path)));
    graph.calls.sort_by(|a, b| {
        (&a.caller_id, &a.file, a.line, a.column, &a.callee_name).cmp(&(
            &b.caller_id,
            &b.file,
            b.line,
            b.column,
            &b.callee_name,
        ))
    });
    graph.relationships.sort_by(|a, b| {
        (&a.from_type_id, &a.to_type_id, a.kind.as_str()).cmp(&(
            &b.from_type_id,
            &b.to_type_id,
            b.kind.as_str(),
        ))
    });
    graph.usages.sort_by(|a, b| {
        (&a.from_id, &a.to_type, a.context.as_str(), a.line).cmp(&(
            &b.from_id,
            &b.to_type,
            b.context.as_str(),
            b.line,
        ))
    });
}
