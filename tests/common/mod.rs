//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::TestProject;
//! ```

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;

use codegraph::{Assembler, CancelFlag, CodeGraph, Extractor, Store};

/// Build a graph directly from in-memory sources (no disk round trip).
pub fn build_graph(files: &[(&str, &str)]) -> CodeGraph {
    let extractor = Extractor::new().expect("extractor");
    let structures = files
        .iter()
        .map(|(file, src)| {
            extractor
                .extract_source(file, src)
                .unwrap_or_else(|e| panic!("extract {file}: {e}"))
        })
        .collect();
    Assembler::new(Extractor::new().expect("extractor"), CancelFlag::new())
        .build_from_structures(structures)
        .expect("build")
}

/// A store in a temp directory, populated from in-memory sources.
///
/// Wraps a `Store` with its backing `TempDir`, ensuring the directory
/// lives as long as the store is in use.
pub struct TestStore {
    pub store: Store,
    _dir: TempDir,
}

impl TestStore {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let graph = build_graph(files);
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::open(&dir.path().join("graph.db")).expect("Failed to open store");
        store.save_graph(&graph).expect("Failed to save graph");
        Self { store, _dir: dir }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// An on-disk Go project in a temp directory, for CLI and full-build tests.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for (file, src) in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(&path, src).expect("write fixture");
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, src: &str) {
        let path = self.dir.path().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(&path, src).expect("write fixture");
    }

    pub fn remove(&self, file: &str) {
        std::fs::remove_file(self.dir.path().join(file)).expect("remove fixture");
    }
}
