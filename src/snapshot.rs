//! Portable JSON snapshot of the graph
//!
//! Flat document with `_metadata`, `nodes`, `edges`, and `files` sections.
//! Writes go to a sibling `.tmp/` directory and are renamed into place, so
//! a crashed write leaves the previous snapshot intact; the rename is
//! atomic on the target filesystem.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{CallEntity, FunctionEntity, ImportEntity, PackageEntity, TypeEntity, TypeUsage};
use crate::graph::{CodeGraph, FileRecord, RelationshipKind, TypeRelationship};

/// Snapshot document version
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot version: '{0}' (expected '{SNAPSHOT_VERSION}')")]
    UnsupportedVersion(String),
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    version: String,
    generated_at: String,
    node_count: usize,
    edge_count: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
enum SnapshotNode {
    Package(PackageEntity),
    Type(TypeEntity),
    Function(FunctionEntity),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "edge_type", rename_all = "snake_case")]
enum SnapshotEdge {
    Calls(CallEntity),
    Imports(ImportEntity),
    Embeds(TypeRelationship),
    Implements(TypeRelationship),
    UsesType(TypeUsage),
}

#[derive(Serialize, Deserialize)]
struct Document {
    #[serde(rename = "_metadata")]
    metadata: Metadata,
    nodes: Vec<SnapshotNode>,
    edges: Vec<SnapshotEdge>,
    #[serde(default)]
    files: Vec<FileRecord>,
}

/// Write the graph as a flat JSON document, atomically.
pub fn save(graph: &CodeGraph, path: &Path) -> Result<(), SnapshotError> {
    let doc = to_document(graph);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_dir = parent.join(".tmp");
    std::fs::create_dir_all(&tmp_dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.json".to_string());
    let tmp_path = tmp_dir.join(&file_name);

    let write_result = (|| -> Result<(), SnapshotError> {
        let mut file = std::fs::File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut file, &doc)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path)?;
    tracing::info!(
        path = %path.display(),
        nodes = doc.metadata.node_count,
        edges = doc.metadata.edge_count,
        "Snapshot written"
    );
    Ok(())
}

/// Load a snapshot document back into a graph.
pub fn load(path: &Path) -> Result<CodeGraph, SnapshotError> {
    let raw = std::fs::read_to_string(path)?;
    let doc: Document = serde_json::from_str(&raw)?;
    if doc.metadata.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(doc.metadata.version));
    }

    let mut graph = CodeGraph::default();
    for node in doc.nodes {
        match node {
            SnapshotNode::Package(p) => {
                graph.packages.insert(p.id.clone(), p);
            }
            SnapshotNode::Type(t) => graph.types.push(t),
            SnapshotNode::Function(f) => graph.functions.push(f),
        }
    }
    for edge in doc.edges {
        match edge {
            SnapshotEdge::Calls(c) => graph.calls.push(c),
            SnapshotEdge::Imports(i) => graph.imports.push(i),
            SnapshotEdge::Embeds(r) | SnapshotEdge::Implements(r) => graph.relationships.push(r),
            SnapshotEdge::UsesType(u) => graph.usages.push(u),
        }
    }
    graph.files = doc
        .files
        .into_iter()
        .map(|f| (f.path.clone(), f))
        .collect::<BTreeMap<_, _>>();

    Ok(graph)
}

fn to_document(graph: &CodeGraph) -> Document {
    let mut nodes: Vec<SnapshotNode> = Vec::with_capacity(graph.node_count());
    nodes.extend(
        graph
            .packages
            .values()
            .cloned()
            .map(SnapshotNode::Package),
    );
    nodes.extend(graph.types.iter().cloned().map(SnapshotNode::Type));
    nodes.extend(graph.functions.iter().cloned().map(SnapshotNode::Function));

    let mut edges: Vec<SnapshotEdge> = Vec::with_capacity(graph.edge_count());
    edges.extend(graph.calls.iter().cloned().map(SnapshotEdge::Calls));
    edges.extend(graph.imports.iter().cloned().map(SnapshotEdge::Imports));
    edges.extend(graph.relationships.iter().cloned().map(|r| match r.kind {
        RelationshipKind::Embeds => SnapshotEdge::Embeds(r),
        RelationshipKind::Implements => SnapshotEdge::Implements(r),
    }));
    edges.extend(graph.usages.iter().cloned().map(SnapshotEdge::UsesType));

    Document {
        metadata: Metadata {
            version: SNAPSHOT_VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            node_count: nodes.len(),
            edge_count: edges.len(),
        },
        nodes,
        edges,
        files: graph.files.values().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use crate::extract::Extractor;
    use crate::graph::Assembler;

    fn sample_graph() -> CodeGraph {
        let extractor = Extractor::new().unwrap();
        let structures = vec![
            extractor
                .extract_source(
                    "pkg/iface.go",
                    "package pkg\n\ntype Closer interface {\n\tClose() error\n}\n",
                )
                .unwrap(),
            extractor
                .extract_source(
                    "pkg/impl.go",
                    "package pkg\n\ntype File struct{}\n\nfunc (f *File) Close() error { return nil }\n\nfunc Open() *File {\n\treturn &File{}\n}\n",
                )
                .unwrap(),
        ];
        Assembler::new(Extractor::new().unwrap(), CancelFlag::new())
            .build_from_structures(structures)
            .unwrap()
    }

    #[test]
    fn test_round_trip_preserves_node_and_edge_sets() {
        let graph = sample_graph();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");

        save(&graph, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(graph.packages, loaded.packages);
        assert_eq!(graph.types, loaded.types);
        assert_eq!(graph.functions, loaded.functions);
        assert_eq!(graph.calls, loaded.calls);
        assert_eq!(graph.imports, loaded.imports);
        assert_eq!(graph.relationships, loaded.relationships);
        assert_eq!(graph.usages, loaded.usages);
        assert_eq!(graph.files, loaded.files);
    }

    #[test]
    fn test_metadata_counts() {
        let graph = sample_graph();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        save(&graph, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["_metadata"]["version"], "1.0");
        assert_eq!(
            doc["_metadata"]["node_count"].as_u64().unwrap() as usize,
            graph.node_count()
        );
        assert_eq!(
            doc["_metadata"]["edge_count"].as_u64().unwrap() as usize,
            graph.edge_count()
        );
        assert!(doc["_metadata"]["generated_at"].as_str().is_some());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"_metadata":{"version":"2.0","generated_at":"now","node_count":0,"edge_count":0},"nodes":[],"edges":[]}"#,
        )
        .unwrap();
        assert!(matches!(
            load(&path),
            Err(SnapshotError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn test_crashed_write_leaves_prior_file() {
        let graph = sample_graph();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        save(&graph, &path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        // Writes stage into .tmp/ — garbage there never corrupts the target
        let tmp = dir.path().join(".tmp").join("graph.json");
        std::fs::write(&tmp, "partial garbage").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        save(&graph, &path).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded.functions, graph.functions);
    }
}
