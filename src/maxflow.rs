use std::collections::HashMap;
use std::ops::Range;

use ordered_float::OrderedFloat;
use rs_graph::{self, Buildable, Builder, IndexGraph};
use tracing::debug;

use crate::Energy;

/// Side of the minimum cut a node ends up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Source,
    Sink,
}

/// The capability set the optimizer needs from a max-flow engine.
///
/// Nodes are dense integer handles handed out by [`MaxFlow::add_nodes`].
/// Terminal capacities accumulate across calls and may be negative; only the
/// difference between a node's source and sink capacity affects the cut.
pub trait MaxFlow {
    /// Appends `count` nodes and returns their handles.
    fn add_nodes(&mut self, count: usize) -> Range<usize>;

    /// Adds `source_capacity` to the arc source -> `node` and
    /// `sink_capacity` to the arc `node` -> sink.
    fn add_tweights(&mut self, node: usize, source_capacity: Energy, sink_capacity: Energy);

    /// Adds the arc `u -> v` with `capacity` and `v -> u` with
    /// `reverse_capacity`. Both must be nonnegative.
    fn add_edge(&mut self, u: usize, v: usize, capacity: Energy, reverse_capacity: Energy);

    /// Computes the maximum flow, which is also the minimum cut value.
    fn maxflow(&mut self) -> Energy;

    /// Cut membership of `node` after [`MaxFlow::maxflow`].
    fn what_segment(&self, node: usize) -> Segment;

    fn node_count(&self) -> usize;
}

/// [`MaxFlow`] engine backed by `rs-graph`'s Dinic implementation.
///
/// The network is recorded as it is built and turned into an `rs-graph`
/// [`rs_graph::VecGraph`] with two extra terminal nodes on every call to
/// [`MaxFlow::maxflow`]. Until then every node reports [`Segment::Sink`].
#[derive(Debug, Clone, Default)]
pub struct DinicMaxFlow {
    terminals: Vec<(Energy, Energy)>,
    arcs: Vec<(usize, usize, Energy, Energy)>,
    source_side: Vec<bool>,
}

impl DinicMaxFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated `(source, sink)` capacities of `node`, before netting.
    pub fn terminal_capacities(&self, node: usize) -> (Energy, Energy) {
        self.terminals[node]
    }

    /// Total capacity from `u` to `v` over all arcs added so far.
    pub fn arc_capacity(&self, u: usize, v: usize) -> Energy {
        self.arcs
            .iter()
            .map(|&(a, b, cap, rev)| {
                if (a, b) == (u, v) {
                    cap
                } else if (a, b) == (v, u) {
                    rev
                } else {
                    0.0
                }
            })
            .sum()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }
}

impl MaxFlow for DinicMaxFlow {
    fn add_nodes(&mut self, count: usize) -> Range<usize> {
        let first = self.terminals.len();
        self.terminals.resize(first + count, (0.0, 0.0));
        first..first + count
    }

    fn add_tweights(&mut self, node: usize, source_capacity: Energy, sink_capacity: Energy) {
        let (source, sink) = &mut self.terminals[node];
        *source += source_capacity;
        *sink += sink_capacity;
    }

    fn add_edge(&mut self, u: usize, v: usize, capacity: Energy, reverse_capacity: Energy) {
        assert!(
            u < self.terminals.len() && v < self.terminals.len(),
            "arc {u} -> {v} references a node outside 0..{}",
            self.terminals.len()
        );
        self.arcs.push((u, v, capacity, reverse_capacity));
    }

    fn maxflow(&mut self) -> Energy {
        let n = self.terminals.len();
        let mut capacities: HashMap<rs_graph::vecgraph::Edge<usize>, OrderedFloat<Energy>> =
            HashMap::new();
        let mut b: rs_graph::vecgraph::VecGraphBuilder<usize> = rs_graph::VecGraph::new_builder();
        // Site nodes go first so their ids match the handles.
        let nodes = b.add_nodes(n);
        let source = b.add_node();
        let sink = b.add_node();

        // Every node pays exactly one of its terminal arcs, so the common
        // part is a constant and only the difference needs an arc.
        let mut constant = 0.0;
        for (node, &(to_source, to_sink)) in nodes.iter().zip(&self.terminals) {
            constant += to_source.min(to_sink);
            let residual = to_source - to_sink;
            if residual > 0.0 {
                let e = b.add_edge(source, *node);
                capacities.insert(e, OrderedFloat(residual));
            } else if residual < 0.0 {
                let e = b.add_edge(*node, sink);
                capacities.insert(e, OrderedFloat(-residual));
            }
        }
        for &(u, v, cap, rev) in &self.arcs {
            if cap > 0.0 {
                let e = b.add_edge(nodes[u], nodes[v]);
                capacities.insert(e, OrderedFloat(cap));
            }
            if rev > 0.0 {
                let e = b.add_edge(nodes[v], nodes[u]);
                capacities.insert(e, OrderedFloat(rev));
            }
        }

        let g = b.into_graph();
        debug!(
            nodes = n,
            arcs = capacities.len(),
            "Running Dinic max-flow"
        );
        let (flow, _flows, min_cut) =
            rs_graph::maxflow::dinic::dinic(&g, source, sink, |edge| capacities[&edge]);

        self.source_side = vec![false; n];
        for node in min_cut {
            let id = g.node_id(node);
            if id < n {
                self.source_side[id] = true;
            }
        }
        flow.into_inner() + constant
    }

    fn what_segment(&self, node: usize) -> Segment {
        assert!(
            node < self.terminals.len(),
            "node {node} is outside 0..{}",
            self.terminals.len()
        );
        if self.source_side.get(node).copied().unwrap_or(false) {
            Segment::Source
        } else {
            Segment::Sink
        }
    }

    fn node_count(&self) -> usize {
        self.terminals.len()
    }
}
