//! Interface matching: embedding flattening and structural implementation
//! inference
//!
//! Runs after deduplication. First every interface's embedded interfaces are
//! inlined into a resolved method set (depth-first, cycle-guarded), then
//! `implements` edges are inferred for every (struct, interface) pair by
//! signature matching.
//!
//! Matching is purely syntactic. Type-alias compatibility, generic
//! constraints, and vendored package duplicates produce false positives or
//! negatives; these are accepted trade-offs of working without full type
//! resolution.

use std::collections::{HashMap, HashSet};

use crate::extract::{MethodSignature, TypeEntity, TypeKind};
use crate::graph::types::{RelationshipKind, TypeRelationship};

/// Flatten embedded interfaces into each interface's resolved method set.
///
/// The resolved set is the interface's own methods followed by each embedded
/// interface's resolved methods in declaration order, keeping the first
/// occurrence on duplicate names. Missing embedded interfaces are logged and
/// contribute nothing; embedded non-interfaces are ignored; cycles terminate
/// via a per-traversal visited set.
pub fn resolve_embeddings(types: &mut [TypeEntity]) {
    let by_id: HashMap<String, usize> = types
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    let mut resolved: Vec<(usize, Vec<MethodSignature>)> = Vec::new();
    for (i, t) in types.iter().enumerate() {
        if t.kind != TypeKind::Interface {
            continue;
        }
        let mut visited = HashSet::new();
        let methods = flatten(&t.id, types, &by_id, &mut visited);
        resolved.push((i, methods));
    }

    for (i, methods) in resolved {
        types[i].resolved_methods = methods;
    }
}

fn flatten(
    id: &str,
    types: &[TypeEntity],
    by_id: &HashMap<String, usize>,
    visited: &mut HashSet<String>,
) -> Vec<MethodSignature> {
    if !visited.insert(id.to_string()) {
        // Already on this traversal path; a repeated id contributes once
        return Vec::new();
    }

    let Some(&idx) = by_id.get(id) else {
        tracing::warn!(interface = id, "Embedded interface not found, treating as empty");
        return Vec::new();
    };
    let entity = &types[idx];
    if entity.kind != TypeKind::Interface {
        // Embedded non-interface (struct or alias): ignored
        return Vec::new();
    }

    let mut out: Vec<MethodSignature> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for m in &entity.methods {
        if seen.insert(m.name.clone()) {
            out.push(m.clone());
        }
    }
    for embedded in &entity.embedded_types {
        for m in flatten(embedded, types, by_id, visited) {
            if seen.insert(m.name.clone()) {
                out.push(m);
            }
        }
    }
    out
}

/// Infer `implements` edges for every (struct, interface) pair.
///
/// A struct implements an interface iff every method in the interface's
/// resolved set has a signature-equal method on the struct. The empty
/// interface is implemented by every struct. Call after
/// [`resolve_embeddings`].
pub fn infer_implementations(types: &[TypeEntity]) -> Vec<TypeRelationship> {
    let interfaces: Vec<&TypeEntity> = types
        .iter()
        .filter(|t| t.kind == TypeKind::Interface)
        .collect();
    let structs: Vec<&TypeEntity> = types
        .iter()
        .filter(|t| t.kind == TypeKind::Struct)
        .collect();

    let mut edges = Vec::new();
    for s in &structs {
        let methods = method_index(s);
        for i in &interfaces {
            if implements(&methods, i) {
                edges.push(implements_edge(s, i));
            }
        }
    }

    tracing::debug!(
        structs = structs.len(),
        interfaces = interfaces.len(),
        edges = edges.len(),
        "Implementation inference complete"
    );
    edges
}

/// Incremental re-inference for the given changed type ids.
///
/// Drops existing `implements` edges with either endpoint in `changed_ids`,
/// then re-infers every pair involving a changed interface or changed
/// struct. Ids of deleted types belong in `changed_ids` too — that is what
/// clears their stale edges.
pub fn infer_incremental(
    types: &[TypeEntity],
    changed_ids: &HashSet<String>,
    existing: Vec<TypeRelationship>,
) -> Vec<TypeRelationship> {
    let mut edges: Vec<TypeRelationship> = existing
        .into_iter()
        .filter(|r| {
            r.kind != RelationshipKind::Implements
                || (!changed_ids.contains(&r.from_type_id)
                    && !changed_ids.contains(&r.to_type_id))
        })
        .collect();

    let interfaces: Vec<&TypeEntity> = types
        .iter()
        .filter(|t| t.kind == TypeKind::Interface)
        .collect();
    let structs: Vec<&TypeEntity> = types
        .iter()
        .filter(|t| t.kind == TypeKind::Struct)
        .collect();

    let mut seen: HashSet<(String, String)> = HashSet::new();
    // Changed structs against all interfaces
    for s in structs.iter().filter(|s| changed_ids.contains(&s.id)) {
        let methods = method_index(s);
        for i in &interfaces {
            if implements(&methods, i) && seen.insert((s.id.clone(), i.id.clone())) {
                edges.push(implements_edge(s, i));
            }
        }
    }
    // Changed interfaces against all structs
    for i in interfaces.iter().filter(|i| changed_ids.contains(&i.id)) {
        for s in &structs {
            if changed_ids.contains(&s.id) {
                continue; // Already covered above
            }
            let methods = method_index(s);
            if implements(&methods, i) && seen.insert((s.id.clone(), i.id.clone())) {
                edges.push(implements_edge(s, i));
            }
        }
    }

    edges
}

/// Struct methods keyed by name for O(1) signature lookup
fn method_index<'a>(s: &'a TypeEntity) -> HashMap<&'a str, &'a MethodSignature> {
    s.methods.iter().map(|m| (m.name.as_str(), m)).collect()
}

fn implements(struct_methods: &HashMap<&str, &MethodSignature>, iface: &TypeEntity) -> bool {
    iface.resolved_methods.iter().all(|required| {
        struct_methods
            .get(required.name.as_str())
            .is_some_and(|found| *found == required)
    })
}

fn implements_edge(s: &TypeEntity, i: &TypeEntity) -> TypeRelationship {
    TypeRelationship {
        from_type_id: s.id.clone(),
        to_type_id: i.id.clone(),
        kind: RelationshipKind::Implements,
        file: s.file.clone(),
        line: s.start_line,
    }
}
