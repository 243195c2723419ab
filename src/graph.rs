use std::cmp::Ordering;
use std::ops::Range;

use rayon::prelude::*;

use crate::config::DEFAULT_EDGE_GRAIN;
use crate::parallel::Policy;

pub mod build;
mod edge;
mod query;

pub use build::EdgeList;
pub use edge::{Edge, EdgeHandle, EdgeSlot, TrussEdge, VertexId};
pub use query::GraphQuery;

/// Adjacency store shared by the analytics engines.
///
/// Every vertex owns a contiguous array of edge slots sized to its original
/// out-degree. `out_degree[v]` marks how many of those slots are live; slots
/// past it are logically removed but stay resident, so peeling can shrink a
/// list in place and a later trial can restore it.
///
/// # Type Parameters
/// - `E`: Edge slot type. [`Edge`] for plain traversal, [`TrussEdge`] when
///   the undirected-edge handle is needed.
///
/// # Invariants
/// - Degrees only shrink after construction (until [`Graph::restore_out_degrees`]).
/// - For graphs built with [`Graph::from_edge_list`], every undirected edge
///   `{u, v}` is stored as both `u→v` and `v→u`, and both slots carry the same
///   [`EdgeHandle`].
#[derive(Debug)]
pub struct Graph<E = Edge> {
    num_vertices: usize,
    num_edges: usize,
    num_handles: usize,
    out_degree: Vec<usize>,
    out_edges: Vec<Box<[E]>>,
    edge_grain: usize,
}

/// Shape of the degree distribution, logged by the driver after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeSummary {
    pub max_degree: usize,
    pub mean_degree: f64,
    /// Vertices whose edges fan out across workers (degree at or above the grain).
    pub num_hubs: usize,
}

impl<E: EdgeSlot> Graph<E> {
    /// Assembles a graph from per-vertex edge arrays.
    ///
    /// `num_handles` is the number of distinct edge handles used by the slots.
    pub(crate) fn from_adjacency(adjacency: Vec<Vec<E>>, num_handles: usize) -> Self {
        let out_degree: Vec<usize> = adjacency.iter().map(Vec::len).collect();
        let num_edges = out_degree.iter().sum();
        let out_edges = adjacency
            .into_iter()
            .map(Vec::into_boxed_slice)
            .collect::<Vec<_>>();
        Self {
            num_vertices: out_edges.len(),
            num_edges,
            num_handles,
            out_degree,
            out_edges,
            edge_grain: DEFAULT_EDGE_GRAIN,
        }
    }

    /// Sets the degree at which a vertex's edges are fanned out across workers.
    pub fn with_edge_grain(mut self, edge_grain: usize) -> Self {
        self.edge_grain = edge_grain;
        self
    }

    pub fn set_edge_grain(&mut self, edge_grain: usize) {
        self.edge_grain = edge_grain;
    }

    pub fn edge_grain(&self) -> usize {
        self.edge_grain
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Number of directed edge slots fixed at construction.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Number of distinct edge handles; equals the number of undirected
    /// edges for symmetric graphs.
    pub fn num_handles(&self) -> usize {
        self.num_handles
    }

    pub fn out_degree(&self, vertex_id: VertexId) -> usize {
        self.out_degree[vertex_id]
    }

    /// Index range of the live out-edges of `vertex_id` within its edge array.
    pub fn out_edges_range(&self, vertex_id: VertexId) -> Range<usize> {
        0..self.out_degree[vertex_id]
    }

    /// Live out-edges of `vertex_id`.
    pub fn out_edges(&self, vertex_id: VertexId) -> &[E] {
        &self.out_edges[vertex_id][..self.out_degree[vertex_id]]
    }

    /// The whole edge array of `vertex_id`, including logically removed slots.
    pub fn resident_edges(&self, vertex_id: VertexId) -> &[E] {
        &self.out_edges[vertex_id]
    }

    /// Applies `worker` to every vertex in parallel.
    pub fn for_each_vertex<F>(&self, policy: Policy, worker: F)
    where
        F: Fn(VertexId) + Sync + Send,
    {
        (0..self.num_vertices)
            .into_par_iter()
            .with_min_len(policy.min_len(self.num_vertices))
            .for_each(worker);
    }

    /// Applies `worker` to every live out-edge of `src`.
    ///
    /// Vertices with fewer live edges than the edge grain are walked serially
    /// by the calling worker; larger ones are split across workers according
    /// to `policy`. Both paths visit exactly the same slots.
    ///
    /// # Parameters
    ///
    /// * `policy` - How a hub vertex's edges are divided among workers.
    /// * `src` - The vertex whose out-edges are visited.
    /// * `worker` - Called once per live out-edge slot.
    pub fn for_each_out_edge<F>(&self, policy: Policy, src: VertexId, worker: F)
    where
        F: Fn(&E) + Sync + Send,
    {
        let edges = self.out_edges(src);
        if edges.len() < self.edge_grain {
            edges.iter().for_each(worker);
        } else {
            edges
                .par_iter()
                .with_min_len(policy.min_len(edges.len()))
                .for_each(worker);
        }
    }

    /// Shrinks the live edge count of `vertex_id`.
    ///
    /// # Panics
    /// If `new_degree` exceeds the current degree; edge lists never grow.
    pub fn set_out_degree(&mut self, vertex_id: VertexId, new_degree: usize) {
        let degree = &mut self.out_degree[vertex_id];
        assert!(
            new_degree <= *degree,
            "out-degree of vertex {vertex_id} cannot grow from {} to {new_degree}",
            *degree
        );
        *degree = new_degree;
    }

    /// Marks every resident slot live again, undoing any peeling.
    ///
    /// The restored arrays are not re-sorted; callers that need destination
    /// order must sort afterwards.
    pub fn restore_out_degrees(&mut self) {
        self.out_degree
            .par_iter_mut()
            .zip(self.out_edges.par_iter())
            .for_each(|(degree, edges)| *degree = edges.len());
    }

    /// Locates the live slot `u→w` by binary search.
    ///
    /// Requires destination-sorted edge lists.
    ///
    /// # Returns
    ///
    /// The slot, or `None` if `u` has no live edge to `w`.
    pub fn try_find_out_edge(&self, u: VertexId, w: VertexId) -> Option<&E> {
        let edges = self.out_edges(u);
        edges
            .binary_search_by(|edge| edge.dst().cmp(&w))
            .ok()
            .map(|index| &edges[index])
    }

    /// Returns the live slot `u→w`.
    ///
    /// # Panics
    /// If the edge does not exist. Callers establish existence through the
    /// symmetric-edge invariant, so a miss is a programming error.
    pub fn find_out_edge(&self, u: VertexId, w: VertexId) -> &E {
        match self.try_find_out_edge(u, w) {
            Some(edge) => edge,
            None => panic!("edge {u}->{w} does not exist"),
        }
    }

    /// Sorts the live part of every edge list with `compare`.
    pub fn sort_edge_lists_by<C>(&mut self, compare: C)
    where
        C: Fn(&E, &E) -> Ordering + Sync,
    {
        self.out_edges
            .par_iter_mut()
            .zip(self.out_degree.par_iter())
            .for_each(|(edges, &degree)| edges[..degree].sort_unstable_by(&compare));
    }

    /// Sorts every edge list by destination id.
    pub fn sort_edge_lists(&mut self) {
        self.sort_edge_lists_by(|a, b| a.dst().cmp(&b.dst()));
    }

    /// Checks that every live edge list is in ascending destination order.
    pub fn is_sorted_by_destination(&self) -> bool {
        (0..self.num_vertices).into_par_iter().all(|v| {
            self.out_edges(v)
                .windows(2)
                .all(|pair| pair[0].dst() <= pair[1].dst())
        })
    }

    /// Compacts every edge list in place.
    ///
    /// Live slots for which `keep` returns `false` are moved to the tail of
    /// their array by a stable partition, so surviving edges keep their
    /// relative order. The out-degree is shrunk past them and `on_removed`
    /// receives the removed slots of each vertex that lost any.
    ///
    /// # Parameters
    ///
    /// * `policy` - How vertices are divided among workers.
    /// * `keep` - Decides, for a source vertex and one of its live slots,
    ///   whether the slot stays live.
    /// * `on_removed` - Receives a source vertex and its newly removed slots,
    ///   after they have been moved past the new out-degree.
    pub fn retain_out_edges<K, R>(&mut self, policy: Policy, keep: K, on_removed: R)
    where
        K: Fn(VertexId, &E) -> bool + Sync + Send,
        R: Fn(VertexId, &[E]) + Sync + Send,
    {
        let min_len = policy.min_len(self.num_vertices);
        self.out_degree
            .par_iter_mut()
            .zip(self.out_edges.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .for_each(|(v, (degree, edges))| {
                let live = &mut edges[..*degree];
                let kept = stable_partition(live, |edge| keep(v, edge));
                if kept < live.len() {
                    on_removed(v, &live[kept..]);
                    *degree = kept;
                }
            });
    }

    /// Sum of live out-degrees.
    pub fn num_live_edges(&self) -> usize {
        self.out_degree.par_iter().sum()
    }

    pub fn degree_summary(&self) -> DegreeSummary {
        let max_degree = self.out_degree.par_iter().copied().max().unwrap_or(0);
        let num_hubs = self
            .out_degree
            .par_iter()
            .filter(|&&degree| degree >= self.edge_grain)
            .count();
        let mean_degree = if self.num_vertices == 0 {
            0.0
        } else {
            self.num_live_edges() as f64 / self.num_vertices as f64
        };
        DegreeSummary {
            max_degree,
            mean_degree,
            num_hubs,
        }
    }
}

/// Moves the slots rejected by `keep` behind the accepted ones, preserving
/// order on both sides. Returns the number of accepted slots.
fn stable_partition<E: Copy>(slots: &mut [E], mut keep: impl FnMut(&E) -> bool) -> usize {
    let Some(first_removed) = slots.iter().position(|slot| !keep(slot)) else {
        return slots.len();
    };
    let tail = &mut slots[first_removed..];
    let mut kept = Vec::with_capacity(tail.len());
    let mut removed = vec![tail[0]];
    for &slot in &tail[1..] {
        if keep(&slot) {
            kept.push(slot);
        } else {
            removed.push(slot);
        }
    }
    tail[..kept.len()].copy_from_slice(&kept);
    tail[kept.len()..].copy_from_slice(&removed);
    first_removed + kept.len()
}

impl<E: EdgeSlot> GraphQuery for Graph<E> {
    fn read_neighbor(&self, vertex_id: &VertexId) -> Vec<VertexId> {
        if !self.has_vertex(vertex_id) {
            return vec![];
        }
        self.out_edges(*vertex_id).iter().map(EdgeSlot::dst).collect()
    }

    fn has_vertex(&self, vertex_id: &VertexId) -> bool {
        *vertex_id < self.num_vertices
    }

    fn has_edge(&self, src_id: &VertexId, dst_id: &VertexId) -> bool {
        self.has_vertex(src_id)
            && self
                .out_edges(*src_id)
                .iter()
                .any(|edge| edge.dst() == *dst_id)
    }

    fn vertex_list(&self) -> Vec<VertexId> {
        (0..self.num_vertices).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;

    fn diamond() -> Graph<TrussEdge> {
        let edge_list =
            EdgeList::from_pairs(vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        Graph::from_edge_list(&edge_list)
    }

    #[test]
    fn test_degrees_and_ranges() {
        let graph = diamond();
        assert_eq!(graph.num_vertices(), 4);
        assert_eq!(graph.num_edges(), 10);
        assert_eq!(graph.num_handles(), 5);
        assert_eq!(graph.out_degree(1), 3);
        assert_eq!(graph.out_edges_range(1), 0..3);
        let dsts: Vec<_> = graph.out_edges(1).iter().map(|e| e.dst).collect();
        assert_eq!(dsts, vec![0, 2, 3]);
    }

    #[test]
    fn test_mirror_slots_share_handle() {
        let graph = diamond();
        for u in 0..graph.num_vertices() {
            for edge in graph.out_edges(u) {
                let mirror = graph.find_out_edge(edge.dst, u);
                assert_eq!(mirror.handle, edge.handle);
                assert_eq!(mirror.dst, u);
            }
        }
    }

    #[test]
    #[should_panic(expected = "edge 0->3 does not exist")]
    fn test_find_missing_edge_panics() {
        let graph = diamond();
        graph.find_out_edge(0, 3);
    }

    #[test]
    fn test_for_each_out_edge_serial_and_parallel_agree() {
        let pairs = (1..50).map(|v| (0, v)).collect::<Vec<_>>();
        let edge_list = EdgeList::from_pairs(pairs);
        for grain in [0, 10, usize::MAX] {
            let graph: Graph = Graph::from_edge_list(&edge_list).with_edge_grain(grain);
            for policy in [Policy::Fixed, Policy::Dynamic] {
                let sum = AtomicUsize::new(0);
                let count = AtomicUsize::new(0);
                graph.for_each_out_edge(policy, 0, |edge| {
                    sum.fetch_add(edge.dst, AtomicOrdering::Relaxed);
                    count.fetch_add(1, AtomicOrdering::Relaxed);
                });
                assert_eq!(count.into_inner(), 49);
                assert_eq!(sum.into_inner(), (1..50).sum::<usize>());
            }
        }
    }

    #[test]
    fn test_for_each_vertex_visits_all() {
        let graph = diamond();
        for policy in [Policy::Fixed, Policy::Dynamic] {
            let visits: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();
            graph.for_each_vertex(policy, |v| {
                visits[v].fetch_add(1, AtomicOrdering::Relaxed);
            });
            assert!(visits.iter().all(|v| v.load(AtomicOrdering::Relaxed) == 1));
        }
    }

    #[test]
    fn test_set_out_degree_shrinks() {
        let mut graph = diamond();
        graph.set_out_degree(1, 1);
        assert_eq!(graph.out_degree(1), 1);
        assert_eq!(graph.resident_edges(1).len(), 3);
        assert!(graph.try_find_out_edge(1, 3).is_none());
        graph.restore_out_degrees();
        assert_eq!(graph.out_degree(1), 3);
    }

    #[test]
    #[should_panic(expected = "cannot grow")]
    fn test_set_out_degree_never_grows() {
        let mut graph = diamond();
        graph.set_out_degree(0, 3);
    }

    #[test]
    fn test_retain_out_edges_is_stable() {
        let mut graph = diamond();
        let removed = AtomicUsize::new(0);
        graph.retain_out_edges(
            Policy::Dynamic,
            |_, edge| edge.dst != 2,
            |_, tail| {
                assert!(tail.iter().all(|edge| edge.dst == 2));
                removed.fetch_add(tail.len(), AtomicOrdering::Relaxed);
            },
        );
        assert_eq!(removed.into_inner(), 3);
        let dsts: Vec<_> = graph.out_edges(1).iter().map(|e| e.dst).collect();
        assert_eq!(dsts, vec![0, 3]);
        assert_eq!(graph.resident_edges(1)[2].dst, 2);
        assert!(graph.is_sorted_by_destination());
        assert_eq!(graph.num_live_edges(), 7);
    }

    #[test]
    fn test_sort_edge_lists_by() {
        let mut graph = diamond();
        graph.sort_edge_lists_by(|a, b| b.dst.cmp(&a.dst));
        assert!(!graph.is_sorted_by_destination());
        graph.sort_edge_lists();
        assert!(graph.is_sorted_by_destination());
    }

    #[test]
    fn test_stable_partition() {
        let mut values = [5, 1, 6, 2, 7, 3];
        let kept = stable_partition(&mut values, |v| *v < 5);
        assert_eq!(kept, 3);
        assert_eq!(values, [1, 2, 3, 5, 6, 7]);

        let mut all_kept = [1, 2];
        assert_eq!(stable_partition(&mut all_kept, |_| true), 2);
    }

    #[test]
    fn test_graph_query() {
        let graph = diamond();
        assert_eq!(graph.read_neighbor(&0), vec![1, 2]);
        assert!(graph.read_neighbor(&9).is_empty());
        assert!(graph.has_edge(&3, &2));
        assert!(!graph.has_edge(&0, &3));
        assert_eq!(graph.vertex_list(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_degree_summary() {
        let graph = diamond().with_edge_grain(3);
        let summary = graph.degree_summary();
        assert_eq!(summary.max_degree, 3);
        assert_eq!(summary.num_hubs, 2);
        assert!((summary.mean_degree - 2.5).abs() < f64::EPSILON);
    }
}
