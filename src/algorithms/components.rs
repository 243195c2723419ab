use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::graph::{Edge, EdgeSlot, Graph, VertexId};
use crate::measure::timed;
use crate::parallel::{Policy, ReplicatedCounter, ReplicatedFlag};

/// How a connect pass moves labels across an edge `src → dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStrategy {
    /// Lower whichever endpoint holds the larger label. Corrects both
    /// directions in one pass, so one-directional edge storage still converges.
    #[default]
    MinExchange,
    /// Only push the source's label into the destination. Cheaper per edge,
    /// but needs the reverse slot to carry labels back.
    RemoteMin,
}

/// Configuration for the connected-components engine.
///
/// # Fields
///
/// * `vertex_policy` - Scheduling of the per-vertex passes.
/// * `strategy` - Connect strategy used by the main rounds.
/// * `remote_min_warmup` - Run one `RemoteMin` connect + tree-climb round
///   before the main rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    pub vertex_policy: Policy,
    pub strategy: ConnectStrategy,
    pub remote_min_warmup: bool,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            vertex_policy: Policy::Fixed,
            strategy: ConnectStrategy::MinExchange,
            remote_min_warmup: false,
        }
    }
}

/// Summary of one components run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentsStats {
    /// Number of distinct labels with at least one member.
    pub num_components: usize,
    /// Connect rounds executed, including the final round that changed nothing.
    pub num_iters: usize,
}

/// Connected-components labeling by parallel label propagation.
///
/// Every vertex starts in its own component. Each round runs a connect pass
/// that lowers labels across edges with atomic `fetch_min`, reduces the
/// replicated `changed` flag, and if anything moved, flattens label chains
/// with one tree-climb pass. Labels never increase, so the loop reaches a
/// fixed point; a race that loses an update only delays it to a later round.
pub struct Components<'g, E = Edge> {
    graph: &'g Graph<E>,
    config: ComponentsConfig,
    component: Vec<AtomicUsize>,
    component_size: Vec<AtomicUsize>,
    num_components: ReplicatedCounter,
    changed: ReplicatedFlag,
}

impl<'g, E: EdgeSlot> Components<'g, E> {
    pub fn new(graph: &'g Graph<E>, config: ComponentsConfig) -> Self {
        let num_vertices = graph.num_vertices();
        let components = Self {
            graph,
            config,
            component: (0..num_vertices).map(AtomicUsize::new).collect(),
            component_size: (0..num_vertices).map(|_| AtomicUsize::new(0)).collect(),
            num_components: ReplicatedCounter::new(),
            changed: ReplicatedFlag::new(),
        };
        components.clear();
        components
    }

    /// Resets every vertex to its own component and zeroes the sizes.
    pub fn clear(&self) {
        self.init_components();
        self.num_components.clear();
        self.changed.clear();
    }

    /// Current label of `vertex_id`.
    pub fn component(&self, vertex_id: VertexId) -> usize {
        self.component[vertex_id].load(Ordering::Relaxed)
    }

    /// Number of vertices labeled `label`; populated by [`Components::run`].
    pub fn component_size(&self, label: usize) -> usize {
        self.component_size[label].load(Ordering::Relaxed)
    }

    /// Snapshot of every vertex's label.
    pub fn labels(&self) -> Vec<usize> {
        self.component
            .par_iter()
            .map(|label| label.load(Ordering::Relaxed))
            .collect()
    }

    fn init_components(&self) {
        self.graph.for_each_vertex(self.config.vertex_policy, |v| {
            self.component[v].store(v, Ordering::Relaxed);
            self.component_size[v].store(0, Ordering::Relaxed);
        });
    }

    /// Lowers `component[target]` to `label`, flagging the round on success.
    fn lower(&self, target: VertexId, label: usize) {
        if self.component[target].fetch_min(label, Ordering::Relaxed) > label {
            self.changed.set();
        }
    }

    fn exchange_min(&self, src: VertexId, dst: VertexId) {
        let comp_src = self.component(src);
        let comp_dst = self.component(dst);
        if comp_dst < comp_src {
            self.lower(src, comp_dst);
        } else if comp_src < comp_dst {
            self.lower(dst, comp_src);
        }
    }

    fn connect(&self, strategy: ConnectStrategy) {
        self.graph.for_each_vertex(self.config.vertex_policy, |src| {
            if self.graph.out_degree(src) == 0 {
                return;
            }
            match strategy {
                ConnectStrategy::MinExchange => {
                    self.graph.for_each_out_edge(Policy::Dynamic, src, |edge| {
                        self.exchange_min(src, edge.dst());
                    });
                }
                ConnectStrategy::RemoteMin => {
                    self.graph.for_each_out_edge(Policy::Dynamic, src, |edge| {
                        self.lower(edge.dst(), self.component(src));
                    });
                }
            }
        });
    }

    /// Points every vertex at its label's label until the chain stops moving.
    fn tree_climb(&self) {
        self.graph.for_each_vertex(self.config.vertex_policy, |v| loop {
            let label = self.component(v);
            let parent = self.component(label);
            if parent == label {
                break;
            }
            self.component[v].fetch_min(parent, Ordering::Relaxed);
        });
    }

    /// One connect pass followed by the round-level reduction of `changed`.
    fn connect_round(&self, strategy: ConnectStrategy) -> bool {
        self.changed.clear();
        self.connect(strategy);
        self.changed.reduce()
    }

    fn count_components(&self) -> usize {
        self.graph.for_each_vertex(self.config.vertex_policy, |v| {
            self.component_size[self.component(v)].fetch_add(1, Ordering::Relaxed);
        });
        self.num_components.clear();
        self.graph.for_each_vertex(self.config.vertex_policy, |c| {
            if self.component_size(c) > 0 {
                self.num_components.add(1);
            }
        });
        self.num_components.reduce()
    }

    /// Labels every vertex with the smallest vertex id of its component.
    #[instrument(skip_all, fields(num_vertices = self.graph.num_vertices()))]
    pub fn run(&self) -> ComponentsStats {
        timed("init components", || self.init_components());

        let mut num_iters = 1;
        if self.config.remote_min_warmup {
            let changed = timed("connect (remote min warmup)", || {
                self.connect_round(ConnectStrategy::RemoteMin)
            });
            if changed {
                timed("tree climb", || self.tree_climb());
            }
            num_iters += 1;
        }

        loop {
            let changed = timed("connect", || self.connect_round(self.config.strategy));
            debug!(iteration = num_iters, changed, "connect round finished");
            if !changed {
                break;
            }
            timed("tree climb", || self.tree_climb());
            num_iters += 1;
        }

        let num_components = timed("count components", || self.count_components());
        info!(num_components, num_iters, "components converged");
        ComponentsStats {
            num_components,
            num_iters,
        }
    }

    /// Serial validation: a BFS from one member of every label must only
    /// reach vertices carrying that label, and together the searches must
    /// reach every vertex.
    ///
    /// The search ignores edge direction, so graphs that store each edge in
    /// one direction only are validated the same way labels spread over them.
    ///
    /// # Returns
    ///
    /// `true` if every label is exactly one connected component.
    pub fn check(&self) -> bool {
        let num_vertices = self.graph.num_vertices();
        let mut visited = vec![false; num_vertices];

        let mut neighbors: Vec<FxHashSet<VertexId>> = vec![FxHashSet::default(); num_vertices];
        for u in 0..num_vertices {
            for edge in self.graph.out_edges(u) {
                neighbors[u].insert(edge.dst());
                neighbors[edge.dst()].insert(u);
            }
        }

        let mut label_to_source = FxHashMap::<usize, VertexId>::default();
        for v in 0..num_vertices {
            label_to_source.insert(self.component(v), v);
        }

        for (&label, &source) in &label_to_source {
            visited[source] = true;
            let mut queue = VecDeque::from([source]);
            while let Some(u) = queue.pop_front() {
                for &v in &neighbors[u] {
                    if self.component(v) != label {
                        warn!(
                            source,
                            label,
                            vertex = v,
                            vertex_label = self.component(v),
                            "connected vertices in different components"
                        );
                        return false;
                    }
                    if !visited[v] {
                        visited[v] = true;
                        queue.push_back(v);
                    }
                }
            }
        }

        match visited.iter().position(|&seen| !seen) {
            Some(vertex) => {
                warn!(vertex, "vertex not reached from any component representative");
                false
            }
            None => true,
        }
    }

    /// Writes one line per non-empty component, listing members as
    /// contiguous ranges: `Component 0: 0-2, 5`.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let labels = self.labels();
        let mut members: Vec<(usize, VertexId)> = labels
            .iter()
            .enumerate()
            .map(|(vertex, &label)| (label, vertex))
            .collect();
        members.sort_unstable();

        let mut index = 0;
        while index < members.len() {
            let label = members[index].0;
            write!(out, "Component {label}: ")?;
            let mut first_entry = true;
            while index < members.len() && members[index].0 == label {
                let first = members[index].1;
                let mut last = first;
                index += 1;
                while index < members.len() && members[index] == (label, last + 1) {
                    last += 1;
                    index += 1;
                }
                if !first_entry {
                    write!(out, ", ")?;
                }
                if first == last {
                    write!(out, "{first}")?;
                } else {
                    write!(out, "{first}-{last}")?;
                }
                first_entry = false;
            }
            writeln!(out)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rayon::ThreadPoolBuilder;

    use super::*;
    use crate::graph::EdgeList;

    fn two_triangles() -> Graph {
        let edge_list = EdgeList::from_pairs(vec![(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)]);
        Graph::from_edge_list(&edge_list)
    }

    fn random_graph(seed: u64, num_vertices: usize, num_pairs: usize) -> EdgeList {
        let mut rng = StdRng::seed_from_u64(seed);
        let pairs = (0..num_pairs)
            .map(|_| (rng.gen_range(0..num_vertices), rng.gen_range(0..num_vertices)))
            .collect();
        EdgeList::new(num_vertices, pairs).unwrap()
    }

    #[test]
    fn test_two_triangles() {
        let graph = two_triangles();
        let cc = Components::new(&graph, ComponentsConfig::default());
        let stats = cc.run();
        assert_eq!(stats.num_components, 2);
        assert_eq!(stats.num_iters, 2);
        assert_eq!(cc.labels(), vec![0, 0, 0, 3, 3, 3]);
        assert_eq!(cc.component_size(0), 3);
        assert_eq!(cc.component_size(3), 3);
        assert_eq!(cc.component_size(1), 0);
        assert!(cc.check());
    }

    #[test]
    fn test_isolated_vertices() {
        let edge_list = EdgeList::new(5, vec![(1, 3)]).unwrap();
        let graph: Graph = Graph::from_edge_list(&edge_list);
        let cc = Components::new(&graph, ComponentsConfig::default());
        let stats = cc.run();
        assert_eq!(stats.num_components, 4);
        assert_eq!(cc.labels(), vec![0, 1, 2, 1, 4]);
        assert!(cc.check());
    }

    #[test]
    fn test_long_path_converges() {
        let pairs = (0..200).map(|v| (199 - v, 200 - v)).collect();
        let graph: Graph = Graph::from_edge_list(&EdgeList::from_pairs(pairs));
        let cc = Components::new(&graph, ComponentsConfig::default());
        let stats = cc.run();
        assert_eq!(stats.num_components, 1);
        assert!(cc.labels().iter().all(|&label| label == 0));
        assert_eq!(cc.component_size(0), 201);
    }

    /// Min-exchange converges even when each edge is stored in one direction only.
    #[test]
    fn test_one_directional_edges() {
        let edge_list = EdgeList::from_pairs(vec![(5, 4), (4, 3), (1, 0), (2, 1)]);
        let graph: Graph = Graph::from_directed_edge_list(&edge_list);
        let cc = Components::new(&graph, ComponentsConfig::default());
        let stats = cc.run();
        assert_eq!(stats.num_components, 2);
        assert_eq!(cc.labels(), vec![0, 0, 0, 3, 3, 3]);
        assert!(cc.check());
    }

    #[test]
    fn test_check_ignores_edge_direction() {
        let edge_list = EdgeList::from_pairs(vec![(0, 1), (2, 1)]);
        let graph: Graph = Graph::from_directed_edge_list(&edge_list);
        let cc = Components::new(&graph, ComponentsConfig::default());
        let stats = cc.run();
        assert_eq!(stats.num_components, 1);
        assert_eq!(cc.labels(), vec![0, 0, 0]);
        assert!(cc.check());
    }

    #[test]
    fn test_strategies_agree() {
        let edge_list = random_graph(11, 300, 280);
        let graph: Graph = Graph::from_edge_list(&edge_list);
        let baseline = Components::new(&graph, ComponentsConfig::default());
        let expected = baseline.run();
        let expected_labels = baseline.labels();
        assert!(baseline.check());

        for (strategy, remote_min_warmup) in [
            (ConnectStrategy::RemoteMin, false),
            (ConnectStrategy::MinExchange, true),
            (ConnectStrategy::RemoteMin, true),
        ] {
            let config = ComponentsConfig {
                vertex_policy: Policy::Dynamic,
                strategy,
                remote_min_warmup,
            };
            let cc = Components::new(&graph, config);
            let stats = cc.run();
            assert_eq!(stats.num_components, expected.num_components);
            assert_eq!(cc.labels(), expected_labels);
        }
    }

    /// The edge grain is a performance knob: walking edges serially or
    /// fanning them out must give the same labels.
    #[test]
    fn test_grain_threshold_equivalence() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let mut pairs = random_graph(5, 500, 400).pairs;
        pairs.extend((1..120).map(|v| (0, v * 3)));
        let edge_list = EdgeList::new(500, pairs).unwrap();

        pool.install(|| {
            let serial: Graph = Graph::from_edge_list(&edge_list).with_edge_grain(usize::MAX);
            let fanned: Graph = Graph::from_edge_list(&edge_list).with_edge_grain(0);
            let cc_serial = Components::new(&serial, ComponentsConfig::default());
            let cc_fanned = Components::new(&fanned, ComponentsConfig::default());
            let serial_stats = cc_serial.run();
            let fanned_stats = cc_fanned.run();
            assert_eq!(serial_stats.num_components, fanned_stats.num_components);
            assert_eq!(cc_serial.labels(), cc_fanned.labels());
        });
    }

    #[test]
    fn test_labels_never_increase() {
        let graph: Graph = Graph::from_edge_list(&random_graph(3, 200, 220));
        let cc = Components::new(&graph, ComponentsConfig::default());
        let mut previous = cc.labels();
        loop {
            let changed = cc.connect_round(ConnectStrategy::MinExchange);
            let after_connect = cc.labels();
            cc.tree_climb();
            let after_climb = cc.labels();
            for v in 0..previous.len() {
                assert!(after_connect[v] <= previous[v], "label of {v} increased in connect");
                assert!(after_climb[v] <= after_connect[v], "label of {v} increased in tree climb");
            }
            previous = after_climb;
            if !changed {
                break;
            }
        }
    }

    #[test]
    fn test_tree_climb_idempotent_after_convergence() {
        let graph: Graph = Graph::from_edge_list(&random_graph(8, 150, 160));
        let cc = Components::new(&graph, ComponentsConfig::default());
        cc.run();
        let converged = cc.labels();
        cc.tree_climb();
        assert_eq!(cc.labels(), converged);
        cc.tree_climb();
        assert_eq!(cc.labels(), converged);
    }

    #[test]
    fn test_clear_allows_rerun() {
        let graph = two_triangles();
        let cc = Components::new(&graph, ComponentsConfig::default());
        let first = cc.run();
        cc.clear();
        assert_eq!(cc.labels(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(cc.component_size(0), 0);
        let second = cc.run();
        assert_eq!(first, second);
        assert_eq!(cc.component_size(0), 3);
    }

    #[test]
    fn test_check_detects_bad_labels() {
        let graph = two_triangles();
        let cc = Components::new(&graph, ComponentsConfig::default());
        cc.run();
        cc.component[4].store(0, Ordering::Relaxed);
        assert!(!cc.check());
    }

    #[test]
    fn test_dump_ranges() {
        let edge_list = EdgeList::new(7, vec![(0, 1), (1, 2), (2, 5), (3, 4)]).unwrap();
        let graph: Graph = Graph::from_edge_list(&edge_list);
        let cc = Components::new(&graph, ComponentsConfig::default());
        cc.run();
        let mut out = Vec::new();
        cc.dump(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Component 0: 0-2, 5\nComponent 3: 3-4\nComponent 6: 6\n"
        );
    }
}
