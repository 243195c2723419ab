use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::graph::{EdgeSlot, Graph, VertexId};
use crate::parallel::Policy;

/// One recorded range of a vertex's out-edges.
#[derive(Debug, Default)]
struct WorkItem {
    vertex: AtomicUsize,
    begin: AtomicUsize,
    end: AtomicUsize,
}

/// A collected set of `(vertex, edge range)` work items.
///
/// Algorithms with a selective edge predicate record only the edges they
/// need, then hand the whole set to [`Worklist::process_all_edges`], which
/// balances edges (not vertices) across workers. Appends claim a slot with a
/// single `fetch_add`, so independent vertices may append concurrently.
///
/// No ordering is guaranteed between items.
#[derive(Debug)]
pub struct Worklist {
    items: Box<[WorkItem]>,
    len: AtomicUsize,
}

impl Worklist {
    /// Creates a worklist able to hold `capacity` ranges, typically one per vertex.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: (0..capacity).map(|_| WorkItem::default()).collect(),
            len: AtomicUsize::new(0),
        }
    }

    pub fn clear(&mut self) {
        *self.len.get_mut() = 0;
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire).min(self.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records edges `begin..end` of `vertex` as work.
    ///
    /// # Parameters
    ///
    /// * `vertex` - The vertex whose out-edges are recorded.
    /// * `begin` - First edge index of the range, relative to the live edge list.
    /// * `end` - One past the last edge index; must not exceed the out-degree
    ///   at the time the worklist is processed.
    ///
    /// # Panics
    /// If more items are appended than the worklist was created for.
    pub fn append(&self, vertex: VertexId, begin: usize, end: usize) {
        let slot = self.len.fetch_add(1, Ordering::AcqRel);
        assert!(
            slot < self.items.len(),
            "worklist capacity of {} exceeded",
            self.items.len()
        );
        let item = &self.items[slot];
        item.vertex.store(vertex, Ordering::Relaxed);
        item.begin.store(begin, Ordering::Relaxed);
        item.end.store(end, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<(VertexId, Range<usize>)> {
        self.items[..self.len()]
            .iter()
            .map(|item| {
                (
                    item.vertex.load(Ordering::Relaxed),
                    item.begin.load(Ordering::Relaxed)..item.end.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Total number of edges covered by the recorded ranges.
    pub fn num_edges(&self) -> usize {
        self.snapshot().iter().map(|(_, range)| range.len()).sum()
    }

    /// Applies `worker` to every recorded `(vertex, edge)` pair.
    ///
    /// With [`Policy::Fixed`] the concatenated edge ranges are cut into one
    /// equal share per worker thread, regardless of where vertex boundaries
    /// fall. With [`Policy::Dynamic`] each range becomes a task, and ranges at
    /// or above the graph's edge grain are split further by work stealing.
    ///
    /// # Parameters
    ///
    /// * `graph` - The graph the recorded ranges index into.
    /// * `policy` - How edges are divided among workers.
    /// * `worker` - Called once per recorded edge with its source vertex.
    ///   Calls run concurrently and in no particular order.
    pub fn process_all_edges<E, F>(&self, graph: &Graph<E>, policy: Policy, worker: F)
    where
        E: EdgeSlot,
        F: Fn(VertexId, &E) + Sync + Send,
    {
        let items = self.snapshot();
        match policy {
            Policy::Fixed => {
                // offsets[i] = number of edges recorded before item i
                let mut offsets = Vec::with_capacity(items.len() + 1);
                offsets.push(0);
                for (_, range) in &items {
                    offsets.push(offsets[offsets.len() - 1] + range.len());
                }
                let total = offsets[items.len()];
                let chunk = Policy::Fixed.min_len(total);
                (0..total.div_ceil(chunk)).into_par_iter().for_each(|chunk_index| {
                    let start = chunk_index * chunk;
                    let stop = (start + chunk).min(total);
                    let mut item_index = offsets.partition_point(|&offset| offset <= start) - 1;
                    let mut position = start;
                    while position < stop {
                        let (vertex, range) = &items[item_index];
                        let edges = &graph.out_edges(*vertex)[range.clone()];
                        let from = position - offsets[item_index];
                        let to = (stop - offsets[item_index]).min(edges.len());
                        for edge in &edges[from..to] {
                            worker(*vertex, edge);
                        }
                        position += to - from;
                        item_index += 1;
                    }
                });
            }
            Policy::Dynamic => {
                let grain = graph.edge_grain();
                items.par_iter().for_each(|(vertex, range)| {
                    let edges = &graph.out_edges(*vertex)[range.clone()];
                    if edges.len() < grain {
                        edges.iter().for_each(|edge| worker(*vertex, edge));
                    } else {
                        edges.par_iter().for_each(|edge| worker(*vertex, edge));
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::graph::{EdgeList, TrussEdge};

    fn star_and_path() -> Graph<TrussEdge> {
        let mut pairs: Vec<_> = (1..40).map(|v| (0, v)).collect();
        pairs.extend((40..60).map(|v| (v, v + 1)));
        Graph::from_edge_list(&EdgeList::from_pairs(pairs))
    }

    /// Registers the lower-id neighbors of each vertex, mirroring how k-truss
    /// builds its worklist.
    fn build_lower(graph: &Graph<TrussEdge>) -> Worklist {
        let worklist = Worklist::with_capacity(graph.num_vertices());
        graph.for_each_vertex(Policy::Fixed, |v| {
            let end = graph.out_edges(v).partition_point(|e| e.dst < v);
            if end > 0 {
                worklist.append(v, 0, end);
            }
        });
        worklist
    }

    #[test]
    fn test_every_edge_processed_once() {
        for grain in [0, 3, usize::MAX] {
            let mut graph = star_and_path();
            graph.set_edge_grain(grain);
            let worklist = build_lower(&graph);
            assert_eq!(worklist.num_edges(), graph.num_handles());
            for policy in [Policy::Fixed, Policy::Dynamic] {
                let hits: Vec<AtomicUsize> =
                    (0..graph.num_handles()).map(|_| AtomicUsize::new(0)).collect();
                worklist.process_all_edges(&graph, policy, |src, edge| {
                    assert!(edge.dst < src);
                    hits[edge.handle].fetch_add(1, Ordering::Relaxed);
                });
                assert!(
                    hits.iter().all(|h| h.load(Ordering::Relaxed) == 1),
                    "policy {policy:?} grain {grain} missed or repeated an edge"
                );
            }
        }
    }

    #[test]
    fn test_clear() {
        let graph = star_and_path();
        let mut worklist = build_lower(&graph);
        assert!(!worklist.is_empty());
        worklist.clear();
        assert!(worklist.is_empty());
        let calls = AtomicUsize::new(0);
        worklist.process_all_edges(&graph, Policy::Fixed, |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.into_inner(), 0);
    }

    #[test]
    #[should_panic(expected = "worklist capacity of 1 exceeded")]
    fn test_capacity_overflow_panics() {
        let worklist = Worklist::with_capacity(1);
        worklist.append(0, 0, 1);
        worklist.append(1, 0, 1);
    }
}
