//! Go language definition

use std::collections::HashSet;
use std::sync::LazyLock;

use super::LanguageDef;

static DEFINITION: LanguageDef = LanguageDef {
    name: "go",
    grammar: || tree_sitter_go::LANGUAGE.into(),
    extensions: &["go"],
    test_file_suffix: "_test.go",
    root_package: "main",
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}

/// Built-in Go types excluded from type-usage edges.
///
/// Without this filter, `type_usages("error")` would return most of the
/// codebase. Covers the predeclared numeric, boolean, textual, and universal
/// error types plus the sentinel names the type-reference parser produces
/// for inline anonymous types.
pub static BUILTIN_TYPES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "bool",
        "string",
        "int",
        "int8",
        "int16",
        "int32",
        "int64",
        "uint",
        "uint8",
        "uint16",
        "uint32",
        "uint64",
        "uintptr",
        "byte",
        "rune",
        "float32",
        "float64",
        "complex64",
        "complex128",
        "error",
        "any",
        // Sentinels for inline anonymous and detail-less types
        "interface",
        "func",
        "struct",
        "map",
        "chan",
    ]
    .into_iter()
    .collect()
});

/// Built-in Go functions excluded from call extraction.
///
/// Calls to these would otherwise appear as unresolvable `{package}.len`
/// style edges and pollute caller queries.
pub static BUILTIN_FUNCS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "len", "cap", "make", "new", "append", "copy", "delete", "panic", "recover", "print",
        "println", "close", "complex", "real", "imag", "min", "max", "clear",
    ]
    .into_iter()
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_cover_predeclared() {
        assert!(BUILTIN_TYPES.contains("error"));
        assert!(BUILTIN_TYPES.contains("string"));
        assert!(BUILTIN_TYPES.contains("uintptr"));
        assert!(!BUILTIN_TYPES.contains("Config"));
    }

    #[test]
    fn test_builtin_funcs() {
        assert!(BUILTIN_FUNCS.contains("append"));
        assert!(!BUILTIN_FUNCS.contains("Append"));
    }
}
