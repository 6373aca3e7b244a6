//! In-memory BFS shortest path over a depth-bounded edge set
//!
//! The engine loads the reachable call edges with a recursive CTE rooted at
//! the source, then runs BFS here. The visited set rejects nodes once
//! enqueued, so cyclic graphs terminate; the depth bound caps the layer
//! count.

use std::collections::{HashMap, HashSet, VecDeque};

/// Shortest call path `from → to`, at most `max_depth` hops.
///
/// Returns the node sequence including both endpoints, or `None` when no
/// path exists within the bound. A zero-hop query (`from == to`) returns
/// the single node.
pub(crate) fn shortest_path(
    edges: &[(String, String)],
    from: &str,
    to: &str,
    max_depth: u32,
) -> Option<Vec<String>> {
    if from == to {
        return Some(vec![from.to_string()]);
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (caller, callee) in edges {
        adjacency.entry(caller.as_str()).or_default().push(callee);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
    visited.insert(from);
    queue.push_back((from, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        if let Some(nexts) = adjacency.get(current) {
            for next in nexts {
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if *next == to {
                    return Some(reconstruct(&parent, from, to));
                }
                queue.push_back((next, depth + 1));
            }
        }
    }

    None
}

fn reconstruct(parent: &HashMap<&str, &str>, from: &str, to: &str) -> Vec<String> {
    let mut path = vec![to.to_string()];
    let mut current = to;
    while current != from {
        current = parent[current];
        path.push(current.to_string());
    }
    path.reverse();
    path
}
