//! Graph model: the deduplicated node/edge sets produced by one build
//!
//! The assembler owns a [`CodeGraph`]; the persistence layer writes it to
//! SQLite, the snapshot module serializes it to a flat JSON document, and
//! queries only ever see immutable views through the store.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::extract::{
    CallEntity, FunctionEntity, ImportEntity, PackageEntity, TypeEntity, TypeUsage,
};

/// Kind of a type-to-type relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Structural implementation, inferred by signature matching
    Implements,
    /// Embedded type (struct or interface embedding)
    Embeds,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Implements => "implements",
            RelationshipKind::Embeds => "embeds",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implements" => Ok(RelationshipKind::Implements),
            "embeds" => Ok(RelationshipKind::Embeds),
            other => Err(format!("Unknown relationship kind: '{other}'")),
        }
    }
}

/// A directed type-to-type edge; identity is the full triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRelationship {
    pub from_type_id: String,
    /// May reference a type outside the snapshot for `implements`
    pub to_type_id: String,
    pub kind: RelationshipKind,
    /// Location: the declaration of the `from` type
    pub file: String,
    pub line: u32,
}

impl TypeRelationship {
    /// Primary-key view for deduplication
    pub fn key(&self) -> (&str, &str, RelationshipKind) {
        (&self.from_type_id, &self.to_type_id, self.kind)
    }
}

/// Stored source file: authoritative text for context extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: String,
    /// BLAKE3 of `content`, for change detection
    pub content_hash: String,
    pub module_path: String,
    pub language: String,
}

/// The canonical graph for one snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeGraph {
    pub files: BTreeMap<String, FileRecord>,
    pub packages: BTreeMap<String, PackageEntity>,
    pub types: Vec<TypeEntity>,
    pub functions: Vec<FunctionEntity>,
    pub imports: Vec<ImportEntity>,
    pub calls: Vec<CallEntity>,
    pub relationships: Vec<TypeRelationship>,
    pub usages: Vec<TypeUsage>,
}

impl CodeGraph {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.types.is_empty()
            && self.functions.is_empty()
            && self.packages.is_empty()
    }

    /// Packages + types + functions
    pub fn node_count(&self) -> usize {
        self.packages.len() + self.types.len() + self.functions.len()
    }

    /// Calls + imports + relationships + usages
    pub fn edge_count(&self) -> usize {
        self.calls.len() + self.imports.len() + self.relationships.len() + self.usages.len()
    }

    pub fn function_ids(&self) -> HashSet<&str> {
        self.functions.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn type_ids(&self) -> HashSet<&str> {
        self.types.iter().map(|t| t.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_round_trip() {
        for kind in [RelationshipKind::Implements, RelationshipKind::Embeds] {
            let s = kind.to_string();
            let parsed: RelationshipKind = s.parse().unwrap();
            assert_eq!(kind, parsed, "Round-trip failed for {s}");
        }
        assert!("inherits".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn test_empty_graph_counts() {
        let g = CodeGraph::default();
        assert!(g.is_empty());
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.edge_count(), 0);
    }
}
