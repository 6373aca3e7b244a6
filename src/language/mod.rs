//! Language registry for the extraction front-end
//!
//! Each supported source language contributes a [`LanguageDef`] carrying its
//! tree-sitter grammar, file-extension mapping, and test-file convention.
//! The extractor depends only on this contract, so adding a language means
//! adding a definition here and an AST walker in `extract/` — nothing else
//! in the core changes.

use std::collections::HashMap;
use std::sync::LazyLock;

pub mod go;

/// A language definition with all parsing configuration
pub struct LanguageDef {
    /// Language name (e.g., "go")
    pub name: &'static str,
    /// Function to get the tree-sitter grammar
    pub grammar: fn() -> tree_sitter::Language,
    /// File extensions for this language
    pub extensions: &'static [&'static str],
    /// Suffix identifying test files (e.g., "_test.go")
    pub test_file_suffix: &'static str,
    /// Package key for files in the repository root
    pub root_package: &'static str,
}

impl LanguageDef {
    /// Whether a relative file path names a test file in this language.
    pub fn is_test_file(&self, file: &str) -> bool {
        file.ends_with(self.test_file_suffix)
    }
}

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Go,
}

impl Language {
    pub fn def(&self) -> &'static LanguageDef {
        match self {
            Language::Go => go::definition(),
        }
    }

    /// Get the tree-sitter grammar for this language
    pub fn grammar(&self) -> tree_sitter::Language {
        (self.def().grammar)()
    }

    /// Look up a language by file extension
    pub fn from_extension(ext: &str) -> Option<Language> {
        REGISTRY.by_extension.get(ext).copied()
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.def().name)
    }
}

impl std::str::FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(Language::Go),
            other => Err(format!("Unknown language: '{other}'")),
        }
    }
}

/// Global language registry
pub static REGISTRY: LazyLock<LanguageRegistry> = LazyLock::new(LanguageRegistry::new);

/// Registry of all supported languages
pub struct LanguageRegistry {
    by_extension: HashMap<&'static str, Language>,
}

impl LanguageRegistry {
    fn new() -> Self {
        let mut by_extension = HashMap::new();
        for lang in [Language::Go] {
            for ext in lang.def().extensions {
                by_extension.insert(*ext, lang);
            }
        }
        Self { by_extension }
    }

    /// All file extensions the registry can parse
    pub fn supported_extensions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_extension.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_registered_by_extension() {
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("rs"), None);
    }

    #[test]
    fn test_language_round_trip() {
        let lang: Language = "go".parse().unwrap();
        assert_eq!(lang.to_string(), "go");
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_test_file_suffix() {
        let def = Language::Go.def();
        assert!(def.is_test_file("pkg/server/handler_test.go"));
        assert!(!def.is_test_file("pkg/server/handler.go"));
        assert!(!def.is_test_file("pkg/server/test_helpers.go"));
    }
}
