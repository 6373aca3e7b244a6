//! Type-expression parsing and import-path classification
//!
//! Reduces a tree-sitter type node to a [`TypeReference`] value. Container
//! modifiers are flattened: `*T`, `[]T`, `[N]T`, and `...T` all collapse to
//! flags on the base name, maps are recorded without key/value detail, and
//! inline anonymous types use sentinel names ("interface", "func").

use std::collections::HashMap;

use tree_sitter::Node;

use crate::language::go::BUILTIN_TYPES;

use super::types::TypeReference;

/// Parse a type node into a [`TypeReference`].
pub(crate) fn parse_type_expr(node: Node, source: &str) -> TypeReference {
    match node.kind() {
        "pointer_type" => {
            let inner = named_child(node)
                .map(|n| parse_type_expr(n, source))
                .unwrap_or_else(|| TypeReference::named(node_text(node, source)));
            TypeReference {
                is_pointer: true,
                ..inner
            }
        }
        "slice_type" | "array_type" => {
            let inner = node
                .child_by_field_name("element")
                .map(|n| parse_type_expr(n, source))
                .unwrap_or_else(|| TypeReference::named(node_text(node, source)));
            TypeReference {
                is_slice: true,
                ..inner
            }
        }
        // Key/value detail is not recorded for maps
        "map_type" => TypeReference {
            is_map: true,
            ..TypeReference::named("map")
        },
        "qualified_type" => {
            let package = node
                .child_by_field_name("package")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_else(|| node_text(node, source));
            TypeReference {
                name,
                package_alias: if package.is_empty() {
                    None
                } else {
                    Some(package)
                },
                is_pointer: false,
                is_slice: false,
                is_map: false,
            }
        }
        "type_identifier" => TypeReference::named(node_text(node, source)),
        // Inline anonymous types keep sentinel names only
        "interface_type" => TypeReference::named("interface"),
        "struct_type" => TypeReference::named("struct"),
        "function_type" | "func_literal" => TypeReference::named("func"),
        "channel_type" => TypeReference::named("chan"),
        "generic_type" => node
            .child_by_field_name("type")
            .map(|n| parse_type_expr(n, source))
            .unwrap_or_else(|| TypeReference::named(node_text(node, source))),
        "parenthesized_type" => named_child(node)
            .map(|n| parse_type_expr(n, source))
            .unwrap_or_else(|| TypeReference::named(node_text(node, source))),
        "variadic_parameter_declaration" => {
            // Handled by the parameter walker; reaching here means a bare
            // `...T` type node
            let inner = node
                .child_by_field_name("type")
                .map(|n| parse_type_expr(n, source))
                .unwrap_or_else(|| TypeReference::named(node_text(node, source)));
            TypeReference {
                is_slice: true,
                ..inner
            }
        }
        _ => TypeReference::named(node_text(node, source)),
    }
}

/// First named child, skipping punctuation.
fn named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let result = node.named_children(&mut cursor).next();
    result
}

pub(crate) fn node_text(node: Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}

/// Whether a reference names a predeclared or anonymous type that never
/// produces a usage edge.
pub(crate) fn is_builtin(type_ref: &TypeReference) -> bool {
    type_ref.package_alias.is_none() && BUILTIN_TYPES.contains(type_ref.name.as_str())
}

/// Classify an import path: `(is_standard_lib, is_external, is_relative)`.
///
/// Standard-library paths contain no dot and no leading `./` or `../`;
/// relative paths start with `./` or `../`; everything else is external.
pub(crate) fn classify_import(path: &str) -> (bool, bool, bool) {
    let is_relative = path.starts_with("./") || path.starts_with("../");
    if is_relative {
        return (false, false, true);
    }
    let is_standard = !path.contains('.');
    (is_standard, !is_standard, false)
}

/// Qualified display name for a usage-edge target.
///
/// Same-package references qualify with the module path; cross-package
/// references resolve the alias through the import map to the final path
/// segment. Unknown aliases pass through as written.
pub(crate) fn qualify(
    type_ref: &TypeReference,
    module_path: &str,
    aliases: &HashMap<String, String>,
) -> String {
    match &type_ref.package_alias {
        Some(alias) => {
            let package = aliases
                .get(alias)
                .map(|path| last_segment(path))
                .unwrap_or(alias.as_str());
            format!("{}.{}", package, type_ref.name)
        }
        None => format!("{}.{}", module_path, type_ref.name),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_import() {
        assert_eq!(classify_import("fmt"), (true, false, false));
        assert_eq!(classify_import("net/http"), (true, false, false));
        assert_eq!(
            classify_import("github.com/user/repo"),
            (false, true, false)
        );
        assert_eq!(classify_import("./local"), (false, false, true));
        assert_eq!(classify_import("../sibling"), (false, false, true));
    }

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin(&TypeReference::named("error")));
        assert!(is_builtin(&TypeReference::named("map")));
        assert!(!is_builtin(&TypeReference::named("Config")));
        // Qualified names are never builtin, even when the short name matches
        let qualified = TypeReference {
            package_alias: Some("errs".to_string()),
            ..TypeReference::named("error")
        };
        assert!(!is_builtin(&qualified));
    }

    #[test]
    fn test_qualify_same_package() {
        let aliases = HashMap::new();
        let t = TypeReference::named("Server");
        assert_eq!(qualify(&t, "internal/api", &aliases), "internal/api.Server");
    }

    #[test]
    fn test_qualify_through_alias_map() {
        let mut aliases = HashMap::new();
        aliases.insert("mypkg".to_string(), "github.com/user/mypkg".to_string());
        aliases.insert("alt".to_string(), "github.com/user/other".to_string());
        let t = TypeReference {
            package_alias: Some("alt".to_string()),
            ..TypeReference::named("Thing")
        };
        assert_eq!(qualify(&t, "main", &aliases), "other.Thing");
    }

    #[test]
    fn test_qualify_unknown_alias_passes_through() {
        let aliases = HashMap::new();
        let t = TypeReference {
            package_alias: Some("mystery".to_string()),
            ..TypeReference::named("Widget")
        };
        assert_eq!(qualify(&t, "main", &aliases), "mystery.Widget");
    }
}
