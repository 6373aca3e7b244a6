//! Data types for the entity extractor
//!
//! One [`CodeStructure`] per source file: the deterministic, schema-aligned
//! set of entities and relations the assembler merges into the graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;

/// Errors that can occur during entity extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    /// File extension not recognized as a supported language
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// Tree-sitter failed to parse the file contents
    #[error("Failed to parse: {0}")]
    ParseFailed(String),
    /// File read error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed type expression.
///
/// Equality requires all five components to match; no normalization across
/// aliases or vendored duplicates is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeReference {
    /// Base type name (e.g., "Config"), or a sentinel for anonymous types
    /// ("interface", "func") and detail-less containers ("map", "chan")
    pub name: String,
    /// Package qualifier as written (e.g., "io" in `io.Reader`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_alias: Option<String>,
    #[serde(default)]
    pub is_pointer: bool,
    /// Set for slices, arrays, and variadic parameters alike
    #[serde(default)]
    pub is_slice: bool,
    #[serde(default)]
    pub is_map: bool,
}

impl TypeReference {
    pub fn named(name: impl Into<String>) -> Self {
        TypeReference {
            name: name.into(),
            package_alias: None,
            is_pointer: false,
            is_slice: false,
            is_map: false,
        }
    }

    /// `alias.Name` when qualified, bare `Name` otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.package_alias {
            Some(alias) => format!("{}.{}", alias, self.name),
            None => self.name.clone(),
        }
    }
}

/// A method signature: name plus ordered parameter and return types.
///
/// Two signatures are equal iff names match, arities match, and positional
/// [`TypeReference`]s are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypeReference>,
    pub returns: Vec<TypeReference>,
}

/// Kind of a type declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Interface,
    Struct,
    /// Nominal typedefs: `type Id int`, `type Alias = Other`
    Alias,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Alias => "alias",
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TypeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interface" => Ok(TypeKind::Interface),
            "struct" => Ok(TypeKind::Struct),
            "alias" => Ok(TypeKind::Alias),
            other => Err(format!("Unknown type kind: '{other}'")),
        }
    }
}

/// A field (or interface method slot) belonging to a type.
///
/// Empty `name` marks an embedded field. Interface methods carry
/// `is_method = true` with param/return arities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeField {
    pub name: String,
    /// Declared type as written in source (e.g., `*Config`, `[]byte`)
    pub declared_type: String,
    /// Declaration-order position within the owner type
    pub position: u32,
    #[serde(default)]
    pub is_method: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_count: Option<u32>,
}

/// A type declaration (interface, struct, or alias)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEntity {
    /// Stable id: `{package}.{Name}`
    pub id: String,
    pub name: String,
    pub kind: TypeKind,
    /// Relative file path
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub module_path: String,
    pub is_exported: bool,
    pub fields: Vec<TypeField>,
    /// Declared methods. For structs, populated by the assembler back-link
    /// pass from method declarations; for interfaces, the own methods.
    #[serde(default)]
    pub methods: Vec<MethodSignature>,
    /// Interfaces only: flattened method set after embedding resolution
    #[serde(default)]
    pub resolved_methods: Vec<MethodSignature>,
    /// Qualified ids of embedded types, in declaration order
    #[serde(default)]
    pub embedded_types: Vec<String>,
}

impl TypeEntity {
    /// Number of non-method fields
    pub fn field_count(&self) -> u32 {
        self.fields.iter().filter(|f| !f.is_method).count() as u32
    }

    /// Declared method count (interfaces report the resolved set once flattened)
    pub fn method_count(&self) -> u32 {
        if self.kind == TypeKind::Interface && !self.resolved_methods.is_empty() {
            self.resolved_methods.len() as u32
        } else {
            self.methods.len() as u32
        }
    }
}

/// A function parameter or return value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared type as written in source
    pub declared_type: String,
    pub type_ref: TypeReference,
    /// Position within its group (parameters and returns number independently)
    pub position: u32,
    #[serde(default)]
    pub is_return: bool,
    #[serde(default)]
    pub is_variadic: bool,
}

/// A function or method declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntity {
    /// Stable id: `{package}.{name}`, methods `{package}.{Receiver}.{name}`
    pub id: String,
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub module_path: String,
    pub is_exported: bool,
    #[serde(default)]
    pub is_method: bool,
    /// `{package}.{Receiver}`; absent for free functions and for methods
    /// declared in test files (the declaration target is not extracted there)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_type_name: Option<String>,
    /// Parameters followed by returns (see [`ParameterEntity::is_return`])
    pub parameters: Vec<ParameterEntity>,
}

impl FunctionEntity {
    pub fn param_count(&self) -> u32 {
        self.parameters.iter().filter(|p| !p.is_return).count() as u32
    }

    pub fn return_count(&self) -> u32 {
        self.parameters.iter().filter(|p| p.is_return).count() as u32
    }

    /// Signature view used by the interface matcher.
    pub fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            params: self
                .parameters
                .iter()
                .filter(|p| !p.is_return)
                .map(|p| p.type_ref.clone())
                .collect(),
            returns: self
                .parameters
                .iter()
                .filter(|p| p.is_return)
                .map(|p| p.type_ref.clone())
                .collect(),
        }
    }
}

/// An import declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEntity {
    /// Stable id: `{file}:{import_path}`
    pub id: String,
    pub file: String,
    pub import_path: String,
    pub line: u32,
    /// Explicit alias, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub is_standard_lib: bool,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub is_relative: bool,
}

/// A call site within a function body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEntity {
    /// Id of the enclosing function
    pub caller_id: String,
    /// Resolved callee function id; `None` until (and unless) the assembler
    /// matches `callee_name` against the final node set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_id: Option<String>,
    /// `{package}.{name}` for bare identifiers, literal selector text otherwise
    pub callee_name: String,
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Where a type reference occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageContext {
    Parameter,
    Return,
    Field,
    /// Interface method signature
    Signature,
}

impl UsageContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageContext::Parameter => "parameter",
            UsageContext::Return => "return",
            UsageContext::Field => "field",
            UsageContext::Signature => "signature",
        }
    }
}

/// A `uses_type` edge from a function or type to a named type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeUsage {
    /// Function or type id
    pub from_id: String,
    /// Qualified name of the referenced type
    pub to_type: String,
    pub context: UsageContext,
    pub file: String,
    pub line: u32,
}

/// The package a file belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntity {
    /// Directory path relative to the repository root; `main` for root files
    pub id: String,
    /// Package name from the package clause
    pub name: String,
}

/// Everything extracted from one source file
#[derive(Debug, Clone)]
pub struct CodeStructure {
    /// Relative file path (forward slashes)
    pub file: String,
    pub module_path: String,
    pub language: Language,
    pub is_test_file: bool,
    /// Full normalized source text (persisted for context extraction)
    pub source: String,
    /// BLAKE3 hash of `source`, for change detection
    pub content_hash: String,
    pub package: PackageEntity,
    pub types: Vec<TypeEntity>,
    pub functions: Vec<FunctionEntity>,
    pub imports: Vec<ImportEntity>,
    pub calls: Vec<CallEntity>,
    pub usages: Vec<TypeUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str, params: &[&str], returns: &[&str]) -> MethodSignature {
        MethodSignature {
            name: name.to_string(),
            params: params.iter().map(|p| TypeReference::named(*p)).collect(),
            returns: returns.iter().map(|r| TypeReference::named(*r)).collect(),
        }
    }

    #[test]
    fn test_type_reference_equality_requires_all_components() {
        let plain = TypeReference::named("Config");
        let pointer = TypeReference {
            is_pointer: true,
            ..TypeReference::named("Config")
        };
        let sliced = TypeReference {
            is_slice: true,
            ..TypeReference::named("Config")
        };
        let qualified = TypeReference {
            package_alias: Some("pkg".to_string()),
            ..TypeReference::named("Config")
        };
        assert_ne!(plain, pointer);
        assert_ne!(plain, sliced);
        assert_ne!(plain, qualified);
        assert_eq!(plain, TypeReference::named("Config"));
    }

    #[test]
    fn test_signature_equality_positional() {
        assert_eq!(sig("Close", &[], &["error"]), sig("Close", &[], &["error"]));
        assert_ne!(
            sig("Close", &[], &["error"]),
            sig("Close", &["string"], &["error"])
        );
        assert_ne!(
            sig("Read", &["byte"], &["int", "error"]),
            sig("Read", &["byte"], &["error", "int"])
        );
    }

    #[test]
    fn test_qualified_name() {
        let t = TypeReference {
            package_alias: Some("io".to_string()),
            ..TypeReference::named("Reader")
        };
        assert_eq!(t.qualified_name(), "io.Reader");
        assert_eq!(TypeReference::named("Reader").qualified_name(), "Reader");
    }

    #[test]
    fn test_function_counts_and_signature() {
        let f = FunctionEntity {
            id: "pkg.Read".to_string(),
            name: "Read".to_string(),
            file: "pkg/r.go".to_string(),
            start_line: 1,
            end_line: 3,
            start_byte: 0,
            end_byte: 40,
            module_path: "pkg".to_string(),
            is_exported: true,
            is_method: false,
            receiver_type_id: None,
            receiver_type_name: None,
            parameters: vec![
                ParameterEntity {
                    name: Some("p".to_string()),
                    declared_type: "[]byte".to_string(),
                    type_ref: TypeReference {
                        is_slice: true,
                        ..TypeReference::named("byte")
                    },
                    position: 0,
                    is_return: false,
                    is_variadic: false,
                },
                ParameterEntity {
                    name: None,
                    declared_type: "int".to_string(),
                    type_ref: TypeReference::named("int"),
                    position: 0,
                    is_return: true,
                    is_variadic: false,
                },
                ParameterEntity {
                    name: None,
                    declared_type: "error".to_string(),
                    type_ref: TypeReference::named("error"),
                    position: 1,
                    is_return: true,
                    is_variadic: false,
                },
            ],
        };
        assert_eq!(f.param_count(), 1);
        assert_eq!(f.return_count(), 2);
        let s = f.signature();
        assert_eq!(s.name, "Read");
        assert_eq!(s.params.len(), 1);
        assert!(s.params[0].is_slice);
        assert_eq!(s.returns.len(), 2);
    }

    #[test]
    fn test_type_counts() {
        let t = TypeEntity {
            id: "pkg.Server".to_string(),
            name: "Server".to_string(),
            kind: TypeKind::Struct,
            file: "pkg/s.go".to_string(),
            start_line: 1,
            end_line: 5,
            start_byte: 0,
            end_byte: 80,
            module_path: "pkg".to_string(),
            is_exported: true,
            fields: vec![
                TypeField {
                    name: "addr".to_string(),
                    declared_type: "string".to_string(),
                    position: 0,
                    is_method: false,
                    param_count: None,
                    return_count: None,
                },
                TypeField {
                    name: "".to_string(),
                    declared_type: "Logger".to_string(),
                    position: 1,
                    is_method: false,
                    param_count: None,
                    return_count: None,
                },
            ],
            methods: vec![sig("Serve", &[], &["error"])],
            resolved_methods: vec![],
            embedded_types: vec!["pkg.Logger".to_string()],
        };
        assert_eq!(t.field_count(), 2);
        assert_eq!(t.method_count(), 1);
    }
}
