use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::graph::{Graph, TrussEdge, VertexId};
use crate::measure::timed;
use crate::parallel::{Policy, ReplicatedCounter};
use crate::worklist::Worklist;

/// Configuration for the k-truss engine.
///
/// # Fields
///
/// * `vertex_policy` - Scheduling of per-vertex passes (edge removal, sizing).
/// * `worklist_policy` - Scheduling of the per-edge triangle passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KTrussConfig {
    pub vertex_policy: Policy,
    pub worklist_policy: Policy,
}

impl Default for KTrussConfig {
    fn default() -> Self {
        Self {
            vertex_policy: Policy::Dynamic,
            worklist_policy: Policy::Dynamic,
        }
    }
}

/// Summary of one k-truss run.
///
/// Both per-level vectors are indexed by truss level and have `max_k + 1`
/// entries; levels 0 and 1 are always zero. Counts are cumulative: an edge
/// with truss number `m` is counted at every level `2..=m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KTrussStats {
    /// Highest truss number assigned to any edge; 0 for a graph without edges.
    pub max_k: usize,
    pub edges_per_truss: Vec<usize>,
    pub vertices_per_truss: Vec<usize>,
}

/// Per undirected edge state, indexed by [`TrussEdge::handle`].
///
/// For a triangle `p > q > r`, the edge `{q, r}` is its base and `{p, q}`
/// its apex.
#[derive(Debug, Default)]
struct TrussCounters {
    /// Triangles of the live graph containing this edge.
    tc: AtomicI64,
    /// Live triangles using this edge as their base.
    qr_c: AtomicI64,
    /// Live triangles using this edge as their apex.
    p_ref_c: AtomicI64,
    /// Truss number, stamped on removal; 0 until then.
    kte: AtomicUsize,
    /// Support was below the level threshold when the current round started.
    weak: AtomicBool,
}

impl TrussCounters {
    fn support(&self) -> i64 {
        self.tc.load(Ordering::Relaxed)
    }

    fn is_weak(&self) -> bool {
        self.weak.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.tc.store(0, Ordering::Relaxed);
        self.qr_c.store(0, Ordering::Relaxed);
        self.p_ref_c.store(0, Ordering::Relaxed);
        self.kte.store(0, Ordering::Relaxed);
        self.weak.store(false, Ordering::Relaxed);
    }
}

/// Adds `delta` to the support of the three edges of triangle `p, q, r`
/// and to its base and apex references.
fn apply_triangle(
    counters: &[TrussCounters],
    pq: &TrussEdge,
    pr: &TrussEdge,
    qr: &TrussEdge,
    delta: i64,
) {
    counters[pq.handle].tc.fetch_add(delta, Ordering::Relaxed);
    counters[pr.handle].tc.fetch_add(delta, Ordering::Relaxed);
    counters[qr.handle].tc.fetch_add(delta, Ordering::Relaxed);
    counters[qr.handle].qr_c.fetch_add(delta, Ordering::Relaxed);
    counters[pq.handle].p_ref_c.fetch_add(delta, Ordering::Relaxed);
}

/// Live edges of `v` pointing at lower ids.
fn lower_edges(graph: &Graph<TrussEdge>, v: VertexId) -> &[TrussEdge] {
    let edges = graph.out_edges(v);
    &edges[..edges.partition_point(|edge| edge.dst < v)]
}

/// Live edges of `v` pointing at higher ids.
fn upper_edges(graph: &Graph<TrussEdge>, v: VertexId) -> &[TrussEdge] {
    let edges = graph.out_edges(v);
    &edges[edges.partition_point(|edge| edge.dst <= v)..]
}

/// Calls `f(p→r, q→r)` for every live triangle `p > q > r` closed by `p→q`.
///
/// Two-pointer merge of `p`'s edges with `q`'s edges below `q`; both lists
/// are destination-sorted.
fn for_each_triangle<F>(graph: &Graph<TrussEdge>, p: VertexId, pq: &TrussEdge, mut f: F)
where
    F: FnMut(&TrussEdge, &TrussEdge),
{
    let p_edges = graph.out_edges(p);
    let mut pr = 0;
    for qr in lower_edges(graph, pq.dst) {
        while pr < p_edges.len() && p_edges[pr].dst < qr.dst {
            pr += 1;
        }
        if pr == p_edges.len() {
            break;
        }
        if p_edges[pr].dst == qr.dst {
            f(&p_edges[pr], qr);
        }
    }
}

fn bump(histogram: &mut Vec<usize>, level: usize) {
    if histogram.len() <= level {
        histogram.resize(level + 1, 0);
    }
    histogram[level] += 1;
}

fn merge_histograms(mut left: Vec<usize>, right: Vec<usize>) -> Vec<usize> {
    if left.len() < right.len() {
        return merge_histograms(right, left);
    }
    for (total, count) in left.iter_mut().zip(right) {
        *total += count;
    }
    left
}

/// Turns per-level counts into cumulative counts for levels `2..=max_k`.
fn cumulative(histogram: &[usize], max_k: usize) -> Vec<usize> {
    let mut per_truss = vec![0; max_k + 1];
    let mut running = 0;
    for level in (2..=max_k).rev() {
        running += histogram.get(level).copied().unwrap_or(0);
        per_truss[level] = running;
    }
    per_truss
}

/// K-truss decomposition by triangle counting and level-by-level peeling.
///
/// Triangles are enumerated once each from their apex edge `p→q` (`q < p`)
/// through a worklist of every vertex's lower-id edges. At level `k`, each
/// round marks the edges whose support is below `k - 2`, unrolls every
/// triangle that contains a marked edge, and compacts edges left with no
/// support out of the edge lists, stamping them with truss number `k - 1`.
/// Rounds repeat until a level is stable, then `k` grows until no edge is
/// left.
///
/// The engine peels the graph in place; [`KTruss::clear`] restores it.
pub struct KTruss<'g> {
    graph: &'g mut Graph<TrussEdge>,
    config: KTrussConfig,
    counters: Vec<TrussCounters>,
    vertex_max_k: Vec<AtomicUsize>,
    worklist: Worklist,
    removed: ReplicatedCounter,
    num_weak: ReplicatedCounter,
}

impl<'g> KTruss<'g> {
    pub fn new(graph: &'g mut Graph<TrussEdge>, config: KTrussConfig) -> Self {
        let counters = (0..graph.num_handles())
            .map(|_| TrussCounters::default())
            .collect();
        let vertex_max_k = (0..graph.num_vertices())
            .map(|_| AtomicUsize::new(0))
            .collect();
        let worklist = Worklist::with_capacity(graph.num_vertices());
        Self {
            graph,
            config,
            counters,
            vertex_max_k,
            worklist,
            removed: ReplicatedCounter::new(),
            num_weak: ReplicatedCounter::new(),
        }
    }

    pub fn graph(&self) -> &Graph<TrussEdge> {
        &*self.graph
    }

    /// Restores every peeled edge, re-sorts the edge lists and zeroes all
    /// per-edge and per-vertex results.
    pub fn clear(&mut self) {
        self.graph.restore_out_degrees();
        self.graph.sort_edge_lists();
        self.counters.par_iter().for_each(TrussCounters::reset);
        self.vertex_max_k
            .par_iter()
            .for_each(|max_k| max_k.store(0, Ordering::Relaxed));
        self.worklist.clear();
    }

    /// Highest truss number of any edge incident to `vertex_id`; 0 if it has none.
    pub fn vertex_max_k(&self, vertex_id: VertexId) -> usize {
        self.vertex_max_k[vertex_id].load(Ordering::Relaxed)
    }

    fn resident_edge(&self, u: VertexId, v: VertexId) -> Option<&TrussEdge> {
        self.graph.resident_edges(u).iter().find(|edge| edge.dst == v)
    }

    /// Truss number of edge `{u, v}`, or `None` if the graph has no such edge.
    /// Returns `Some(0)` before the edge has been peeled.
    pub fn truss_number(&self, u: VertexId, v: VertexId) -> Option<usize> {
        self.resident_edge(u, v)
            .map(|edge| self.counters[edge.handle].kte.load(Ordering::Relaxed))
    }

    /// Current triangle support of edge `{u, v}`.
    pub fn edge_support(&self, u: VertexId, v: VertexId) -> Option<i64> {
        self.resident_edge(u, v)
            .map(|edge| self.counters[edge.handle].support())
    }

    /// Truss number of every edge, keyed by `(low, high)` endpoint pair.
    pub fn truss_numbers(&self) -> FxHashMap<(VertexId, VertexId), usize> {
        let mut truss_numbers = FxHashMap::default();
        for src in 0..self.graph.num_vertices() {
            for edge in self.graph.resident_edges(src) {
                if edge.dst < src {
                    truss_numbers.insert(
                        (edge.dst, src),
                        self.counters[edge.handle].kte.load(Ordering::Relaxed),
                    );
                }
            }
        }
        truss_numbers
    }

    /// Writes one `low-high: k` line per edge, ordered by endpoint pair.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut truss_numbers: Vec<_> = self.truss_numbers().into_iter().collect();
        truss_numbers.sort_unstable();
        for ((low, high), k) in truss_numbers {
            writeln!(out, "{low}-{high}: {k}")?;
        }
        Ok(())
    }

    /// Registers the lower-id edges of every vertex.
    fn build_worklist(&mut self) {
        self.worklist.clear();
        let graph = &*self.graph;
        let worklist = &self.worklist;
        graph.for_each_vertex(Policy::Fixed, |p| {
            let end = lower_edges(graph, p).len();
            if end > 0 {
                worklist.append(p, 0, end);
            }
        });
    }

    fn count_initial_triangles(&mut self) {
        self.build_worklist();
        let graph = &*self.graph;
        let counters = &self.counters;
        self.worklist
            .process_all_edges(graph, self.config.worklist_policy, |p, pq| {
                debug_assert_eq!(graph.find_out_edge(pq.dst, p).handle, pq.handle);
                for_each_triangle(graph, p, pq, |pr, qr| {
                    apply_triangle(counters, pq, pr, qr, 1);
                });
            });
    }

    /// Marks every live edge whose support is below `k - 2`. Returns how many were marked.
    fn mark_weak_edges(&self, k: usize) -> usize {
        self.num_weak.clear();
        let threshold = k as i64 - 2;
        let counters = &self.counters;
        let num_weak = &self.num_weak;
        self.worklist
            .process_all_edges(&*self.graph, self.config.worklist_policy, |_, edge| {
                let counter = &counters[edge.handle];
                let weak = counter.support() < threshold;
                counter.weak.store(weak, Ordering::Relaxed);
                if weak {
                    num_weak.add(1);
                }
            });
        self.num_weak.reduce()
    }

    /// Unrolls every live triangle whose apex `p→q` or side `p→r` is weak.
    #[instrument(level = "trace", skip(self))]
    fn unroll_wedges(&self, k: usize) {
        let graph = &*self.graph;
        let counters = &self.counters;
        self.worklist
            .process_all_edges(graph, self.config.worklist_policy, |p, pq| {
                let pq_weak = counters[pq.handle].is_weak();
                for_each_triangle(graph, p, pq, |pr, qr| {
                    if pq_weak || counters[pr.handle].is_weak() {
                        apply_triangle(counters, pq, pr, qr, -1);
                    }
                });
            });
    }

    /// Unrolls the live triangles whose only weak edge is the base `q→r`.
    ///
    /// Walks from the base: candidate apexes `p > q` are the upper edges of
    /// `q` still referenced by some triangle, and the third edge is located
    /// with a lookup of `p→r`. Triangles with a weak apex or side were
    /// already unrolled by [`KTruss::unroll_wedges`] and are skipped here.
    #[instrument(level = "trace", skip(self))]
    fn unroll_supported_triangles(&self, k: usize) {
        let graph = &*self.graph;
        let counters = &self.counters;
        self.worklist
            .process_all_edges(graph, self.config.worklist_policy, |q, qr| {
                let base = &counters[qr.handle];
                if !base.is_weak() || base.qr_c.load(Ordering::Relaxed) <= 0 {
                    return;
                }
                for qp in upper_edges(graph, q) {
                    let apex = &counters[qp.handle];
                    if apex.is_weak() || apex.p_ref_c.load(Ordering::Relaxed) <= 0 {
                        continue;
                    }
                    if let Some(pr) = graph.try_find_out_edge(qp.dst, qr.dst) {
                        if !counters[pr.handle].is_weak() {
                            apply_triangle(counters, qp, pr, qr, -1);
                        }
                    }
                }
            });
    }

    /// Compacts edges left without support out of every edge list and stamps
    /// them with truss number `k - 1`. Returns the number of undirected edges removed.
    fn remove_edges(&mut self, k: usize) -> usize {
        self.removed.clear();
        let policy = self.config.vertex_policy;
        let counters = &self.counters;
        let removed = &self.removed;
        self.graph.retain_out_edges(
            policy,
            |_, edge| {
                let counter = &counters[edge.handle];
                debug_assert!(!counter.is_weak() || counter.support() == 0);
                counter.support() != 0
            },
            |src, tail| {
                for edge in tail {
                    counters[edge.handle].kte.store(k - 1, Ordering::Relaxed);
                    if edge.dst < src {
                        removed.add(1);
                    }
                }
            },
        );
        self.removed.reduce()
    }

    /// Records each vertex's highest incident truss number and builds the
    /// cumulative per-level edge and vertex counts.
    fn compute_truss_sizes(&self) -> KTrussStats {
        let graph = &*self.graph;
        let counters = &self.counters;
        let vertex_max_k = &self.vertex_max_k;
        let num_vertices = graph.num_vertices();
        let policy = self.config.vertex_policy;

        let edge_histogram = (0..num_vertices)
            .into_par_iter()
            .with_min_len(policy.min_len(num_vertices))
            .fold(Vec::new, |mut histogram, src| {
                let mut max_k = 0;
                for edge in graph.resident_edges(src) {
                    let kte = counters[edge.handle].kte.load(Ordering::Relaxed);
                    assert!(kte >= 2, "edge {src}->{} has no truss number", edge.dst);
                    max_k = max_k.max(kte);
                    if edge.dst < src {
                        bump(&mut histogram, kte);
                    }
                }
                vertex_max_k[src].fetch_max(max_k, Ordering::Relaxed);
                histogram
            })
            .reduce(Vec::new, merge_histograms);

        let vertex_histogram = vertex_max_k
            .par_iter()
            .fold(Vec::new, |mut histogram, max_k| {
                let max_k = max_k.load(Ordering::Relaxed);
                if max_k >= 2 {
                    bump(&mut histogram, max_k);
                }
                histogram
            })
            .reduce(Vec::new, merge_histograms);

        let max_k = edge_histogram.len().saturating_sub(1);
        KTrussStats {
            max_k,
            edges_per_truss: cumulative(&edge_histogram, max_k),
            vertices_per_truss: cumulative(&vertex_histogram, max_k),
        }
    }

    /// Assigns every edge its truss number.
    ///
    /// Peeling removes every edge from the live graph, so a second run needs
    /// [`KTruss::clear`] first to restore the edges and zero the counters.
    ///
    /// # Returns
    ///
    /// The highest truss number found and the cumulative number of edges and
    /// vertices in each truss level.
    ///
    /// # Panics
    /// If the edge lists are not sorted by destination, or if the graph has
    /// already been peeled and not cleared since.
    #[instrument(skip_all, fields(num_vertices = self.graph.num_vertices()))]
    pub fn run(&mut self) -> KTrussStats {
        assert_eq!(
            self.graph.num_live_edges(),
            self.graph.num_edges(),
            "k-truss graph has been peeled; call clear() before running again"
        );
        assert!(
            self.graph.is_sorted_by_destination(),
            "k-truss requires edge lists sorted by destination"
        );
        let mut num_edges = self.graph.num_live_edges() / 2;
        timed("count initial triangles", || self.count_initial_triangles());

        let mut k = 3;
        while num_edges > 0 {
            loop {
                self.build_worklist();
                let num_weak = self.mark_weak_edges(k);
                if num_weak == 0 {
                    break;
                }
                timed("unroll wedges", || self.unroll_wedges(k));
                timed("unroll supported triangles", || {
                    self.unroll_supported_triangles(k)
                });
                let num_removed = timed("remove edges", || self.remove_edges(k));
                num_edges -= num_removed;
                debug!(k, num_weak, num_removed, num_edges, "peeling round finished");
                if num_removed == 0 {
                    break;
                }
            }
            info!(k, num_edges, "found the {k}-truss");
            k += 1;
        }

        timed("compute truss sizes", || self.compute_truss_sizes())
    }

    /// Serial verification hook. No serial k-truss check is wired in here,
    /// so this always reports failure; compare against
    /// [`crate::algorithms::verify::serial_truss_numbers`] instead.
    pub fn check(&self) -> bool {
        warn!("k-truss check is not implemented, reporting failure");
        false
    }
}
