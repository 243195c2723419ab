use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::graph::{GraphQuery, VertexId};

fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    (a.min(b), a.max(b))
}

/// Computes truss numbers with a sequential peeling pass.
///
/// The graph is read as undirected: an edge present in either direction is
/// one edge. Starting at level `k = 3`, edges with fewer than `k - 2`
/// triangles are removed one at a time, each removal lowering the support of
/// the two other edges of every triangle it closed, and receive truss number
/// `k - 1`. This is slow but shares no code with the parallel engine, which
/// makes it a useful reference.
///
/// # Arguments
///
/// * `graph` - Any graph exposing [`GraphQuery`].
///
/// # Returns
///
/// The truss number of every edge, keyed by `(low, high)` endpoint pair.
pub fn serial_truss_numbers<G: GraphQuery>(graph: &G) -> FxHashMap<(VertexId, VertexId), usize> {
    let vertices = graph.vertex_list();
    let num_vertices = vertices.iter().max().map_or(0, |&v| v + 1);
    let mut adjacency: Vec<FxHashSet<VertexId>> = vec![FxHashSet::default(); num_vertices];
    for u in &vertices {
        for w in graph.read_neighbor(u) {
            if *u != w {
                adjacency[*u].insert(w);
                adjacency[w].insert(*u);
            }
        }
    }

    let mut support: FxHashMap<(VertexId, VertexId), usize> = FxHashMap::default();
    for (u, neighbors) in adjacency.iter().enumerate() {
        for &w in neighbors {
            if u < w {
                let common = neighbors.intersection(&adjacency[w]).count();
                support.insert((u, w), common);
            }
        }
    }

    let mut truss_numbers = FxHashMap::default();
    let mut k = 3;
    while !support.is_empty() {
        loop {
            let weak: Vec<(VertexId, VertexId)> = support
                .iter()
                .filter(|(_, &triangles)| triangles + 2 < k)
                .map(|(&edge, _)| edge)
                .collect();
            if weak.is_empty() {
                break;
            }
            for (u, w) in weak {
                if support.remove(&(u, w)).is_none() {
                    continue;
                }
                truss_numbers.insert((u, w), k - 1);
                adjacency[u].remove(&w);
                adjacency[w].remove(&u);
                let closers: Vec<VertexId> =
                    adjacency[u].intersection(&adjacency[w]).copied().collect();
                for x in closers {
                    for edge in [edge_key(u, x), edge_key(w, x)] {
                        if let Some(triangles) = support.get_mut(&edge) {
                            *triangles -= 1;
                        }
                    }
                }
            }
        }
        k += 1;
    }
    truss_numbers
}

/// Compares computed truss numbers against a reference, logging each mismatch.
///
/// # Returns
///
/// `true` when both maps hold exactly the same edges and numbers.
pub fn truss_numbers_match(
    expected: &FxHashMap<(VertexId, VertexId), usize>,
    actual: &FxHashMap<(VertexId, VertexId), usize>,
) -> bool {
    let mut matches = expected.len() == actual.len();
    if !matches {
        warn!(
            expected = expected.len(),
            actual = actual.len(),
            "edge counts differ"
        );
    }
    for (&(u, v), &k) in expected {
        match actual.get(&(u, v)) {
            Some(&found) if found == k => {}
            found => {
                warn!(u, v, expected = k, ?found, "truss number mismatch");
                matches = false;
            }
        }
    }
    matches
}
