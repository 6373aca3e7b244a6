//! Configuration file support for codegraph
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/codegraph/config.toml` (user defaults)
//! 2. `.codegraph.toml` in project root (project overrides)
//!
//! CLI flags override all config file values.

use serde::Deserialize;
use std::path::Path;

use crate::query::{DEFAULT_CONTEXT_LINES, DEFAULT_DEPTH, DEFAULT_MAX_PER_LEVEL, DEFAULT_MAX_RESULTS, MAX_DEPTH};

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/codegraph/config.toml or .codegraph.toml
/// depth = 3             # Default traversal depth (max 6)
/// max_results = 100     # Overall result cap
/// max_per_level = 50    # Per-depth-level cap
/// context_lines = 3     # Context padding for --context
/// quiet = false         # Suppress progress output
/// verbose = false       # Enable verbose logging
/// exclude = ["vendor/%", "%_generated.go"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default traversal depth (overridden by --depth)
    pub depth: Option<u32>,
    /// Default overall result cap (overridden by --max-results)
    pub max_results: Option<usize>,
    /// Default per-level cap (overridden by --max-per-level)
    pub max_per_level: Option<usize>,
    /// Default context padding (overridden by --context-lines)
    pub context_lines: Option<u32>,
    /// Enable quiet mode by default
    pub quiet: Option<bool>,
    /// Enable verbose mode by default
    pub verbose: Option<bool>,
    /// Default exclude patterns applied to every query (SQL LIKE syntax)
    pub exclude: Vec<String>,
}

impl Config {
    /// Load configuration from user and project config files
    pub fn load(project_root: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("codegraph/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&project_root.join(".codegraph.toml")).unwrap_or_default();

        // Project overrides user
        let merged = user_config.override_with(project_config);
        tracing::debug!(
            depth = ?merged.depth,
            max_results = ?merged.max_results,
            max_per_level = ?merged.max_per_level,
            context_lines = ?merged.context_lines,
            excludes = merged.exclude.len(),
            "Effective config after merge"
        );
        merged
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present)
    fn override_with(self, other: Self) -> Self {
        let mut exclude = self.exclude;
        for pattern in other.exclude {
            if !exclude.contains(&pattern) {
                exclude.push(pattern);
            }
        }
        Config {
            depth: other.depth.or(self.depth),
            max_results: other.max_results.or(self.max_results),
            max_per_level: other.max_per_level.or(self.max_per_level),
            context_lines: other.context_lines.or(self.context_lines),
            quiet: other.quiet.or(self.quiet),
            verbose: other.verbose.or(self.verbose),
            exclude,
        }
    }

    // ===== Accessors with defaults =====

    /// Traversal depth, clamped to the engine maximum
    pub fn depth_or_default(&self) -> u32 {
        self.depth.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH)
    }

    pub fn max_results_or_default(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn max_per_level_or_default(&self) -> usize {
        self.max_per_level.unwrap_or(DEFAULT_MAX_PER_LEVEL)
    }

    pub fn context_lines_or_default(&self) -> u32 {
        self.context_lines.unwrap_or(DEFAULT_CONTEXT_LINES)
    }

    pub fn quiet_or_default(&self) -> bool {
        self.quiet.unwrap_or(false)
    }

    pub fn verbose_or_default(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.depth_or_default(), 3);
        assert_eq!(config.max_results_or_default(), 100);
        assert_eq!(config.max_per_level_or_default(), 50);
        assert_eq!(config.context_lines_or_default(), 3);
        assert!(!config.quiet_or_default());
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_depth_clamped_to_engine_max() {
        let config = Config {
            depth: Some(12),
            ..Default::default()
        };
        assert_eq!(config.depth_or_default(), MAX_DEPTH);
    }

    #[test]
    fn test_override_precedence() {
        let user = Config {
            depth: Some(2),
            max_results: Some(20),
            exclude: vec!["vendor/%".to_string()],
            ..Default::default()
        };
        let project = Config {
            depth: Some(4),
            exclude: vec!["%_test.go".to_string(), "vendor/%".to_string()],
            ..Default::default()
        };
        let merged = user.override_with(project);
        assert_eq!(merged.depth, Some(4), "project wins");
        assert_eq!(merged.max_results, Some(20), "user survives when project silent");
        assert_eq!(
            merged.exclude,
            vec!["vendor/%".to_string(), "%_test.go".to_string()],
            "excludes union without duplicates"
        );
    }

    #[test]
    fn test_load_file_missing_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load_file(&dir.path().join("nope.toml")).is_none());
    }

    #[test]
    fn test_load_project_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".codegraph.toml"),
            "depth = 5\nexclude = [\"vendor/%\"]\n",
        )
        .unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.depth, Some(5));
        assert_eq!(config.exclude, vec!["vendor/%".to_string()]);
    }
}
