//! Shortest-path query tests

mod common;

use common::TestStore;

use codegraph::{CancelFlag, QueryEngine, QueryOp, QueryRequest};

const CHAIN: &[(&str, &str)] = &[(
    "app/app.go",
    "package app\n\nfunc Main() { Handler() }\n\nfunc Handler() { Service() }\n\nfunc Service() { Repo() }\n\nfunc Repo() {}\n",
)];

fn path_request(target: &str, to: &str, depth: u32) -> QueryRequest {
    let mut req = QueryRequest::new(QueryOp::Path, target);
    req.to = Some(to.to_string());
    req.depth = Some(depth);
    req
}

#[test]
fn test_chain_path_in_order() {
    let store = TestStore::new(CHAIN);
    let engine = QueryEngine::new(&store, CancelFlag::new());
    let response = engine
        .query(&path_request("app.Main", "app.Repo", 5))
        .unwrap();

    let got: Vec<(String, u32)> = response
        .results
        .iter()
        .map(|r| (r.id.clone(), r.depth))
        .collect();
    assert_eq!(
        got,
        vec![
            ("app.Main".to_string(), 0),
            ("app.Handler".to_string(), 1),
            ("app.Service".to_string(), 2),
            ("app.Repo".to_string(), 3),
        ],
        "results ordered by position along the path"
    );
    assert_eq!(response.total_returned, 4);
    assert!(response.suggestion.is_none());
}

#[test]
fn test_insufficient_depth_yields_suggestion() {
    let store = TestStore::new(CHAIN);
    let engine = QueryEngine::new(&store, CancelFlag::new());
    let response = engine
        .query(&path_request("app.Main", "app.Repo", 2))
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.total_found, 0);
    let suggestion = response.suggestion.expect("suggestion on absent path");
    assert!(suggestion.contains("app.Main"));
    assert!(suggestion.contains("app.Repo"));
}

#[test]
fn test_path_without_to_rejected() {
    let store = TestStore::new(CHAIN);
    let engine = QueryEngine::new(&store, CancelFlag::new());
    let err = engine
        .query(&QueryRequest::new(QueryOp::Path, "app.Main"))
        .unwrap_err();
    assert!(matches!(err, codegraph::QueryError::MissingPathTarget));
}

#[test]
fn test_path_over_cycle_terminates() {
    let store = TestStore::new(&[(
        "cyc/cyc.go",
        "package cyc\n\nfunc A() { B() }\n\nfunc B() { C() }\n\nfunc C() { A() }\n",
    )]);
    let engine = QueryEngine::new(&store, CancelFlag::new());

    let response = engine.query(&path_request("cyc.A", "cyc.C", 6)).unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["cyc.A", "cyc.B", "cyc.C"]);

    // Unreachable target over a cycle still terminates
    let response = engine
        .query(&path_request("cyc.A", "cyc.Missing", 6))
        .unwrap();
    assert!(response.results.is_empty());
    assert!(response.suggestion.is_some());
}

#[test]
fn test_path_picks_shortest() {
    let store = TestStore::new(&[(
        "app/app.go",
        "package app\n\nfunc Main() {\n\tLong()\n\tShort()\n}\n\nfunc Long() { Mid() }\n\nfunc Mid() { End() }\n\nfunc Short() { End() }\n\nfunc End() {}\n",
    )]);
    let engine = QueryEngine::new(&store, CancelFlag::new());
    let response = engine.query(&path_request("app.Main", "app.End", 6)).unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 3, "two hops beat three: {ids:?}");
    assert_eq!(ids[0], "app.Main");
    assert_eq!(ids[2], "app.End");
}
