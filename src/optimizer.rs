use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::GraphCutError;
use crate::graph::EdgeGraph;
use crate::maxflow::{DinicMaxFlow, MaxFlow, Segment};
use crate::{Energy, Label, Site};

/// Cost of giving a single site a label.
pub trait UnaryCost: Send + Sync {
    fn cost(&self, site: Site, label: Label) -> Energy;
}

/// Cost contributed by an edge `(s1, s2)` for the labels of its endpoints.
///
/// Must be regular for the result to be a global minimum:
/// `E(0,0) + E(1,1) <= E(0,1) + E(1,0)`.
pub trait PairwiseCost: Send + Sync {
    fn cost(&self, s1: Site, s2: Site, l1: Label, l2: Label) -> Energy;
}

impl<F> UnaryCost for F
where
    F: Fn(Site, Label) -> Energy + Send + Sync,
{
    fn cost(&self, site: Site, label: Label) -> Energy {
        self(site, label)
    }
}

impl<F> PairwiseCost for F
where
    F: Fn(Site, Site, Label, Label) -> Energy + Send + Sync,
{
    fn cost(&self, s1: Site, s2: Site, l1: Label, l2: Label) -> Energy {
        self(s1, s2, l1, l2)
    }
}

pub type Unary = Arc<dyn UnaryCost>;
pub type Pairwise = Arc<dyn PairwiseCost>;

/// Minimizes binary energies of the form
/// `sum_i E_i(y_i) + sum_{(i,j)} E_ij(y_i, y_j)` with regular `E_ij` through
/// a single minimum cut.
///
/// The flow network is built once, in the constructor, and owned by the
/// optimizer. Cloning builds a fresh, unsolved network from the same graph
/// and cost functions.
///
/// Label convention: a site whose node ends up on the source side of the
/// cut gets label `true` (foreground), the sink side gets `false`.
pub struct BinaryGraphCutOptimizer<S: MaxFlow = DinicMaxFlow> {
    graph: EdgeGraph,
    unary: Option<Unary>,
    pairwise: Option<Pairwise>,
    solver: S,
}

impl BinaryGraphCutOptimizer<DinicMaxFlow> {
    /// Builds the network for `graph` with the given costs. A missing unary
    /// cost counts as zero everywhere, a missing pairwise cost adds no edges.
    pub fn new(graph: EdgeGraph, unary: Option<Unary>, pairwise: Option<Pairwise>) -> Self {
        Self::with_solver(DinicMaxFlow::new(), graph, unary, pairwise)
    }

    pub fn builder(graph: EdgeGraph) -> OptimizerBuilder<DinicMaxFlow> {
        OptimizerBuilder {
            graph,
            unary: None,
            pairwise: None,
            solver: DinicMaxFlow::new(),
        }
    }
}

impl<S: MaxFlow> BinaryGraphCutOptimizer<S> {
    /// Like [`BinaryGraphCutOptimizer::new`] but on a caller-provided, empty
    /// max-flow engine.
    pub fn with_solver(
        solver: S,
        graph: EdgeGraph,
        unary: Option<Unary>,
        pairwise: Option<Pairwise>,
    ) -> Self {
        let mut optimizer = BinaryGraphCutOptimizer {
            graph,
            unary,
            pairwise,
            solver,
        };
        optimizer.setup_network();
        optimizer
    }

    fn setup_network(&mut self) {
        let n = self.graph.vertex_count();
        self.solver.add_nodes(n);

        // source -> s: E_s(0), s -> sink: E_s(1)
        if let Some(unary) = &self.unary {
            for s in 0..n {
                self.solver
                    .add_tweights(s, unary.cost(s, false), unary.cost(s, true));
            }
        }

        // E(x1, x2) = u1(x1) + u2(x2) + K * x1 * (1 - x2) with
        // u1 = (0, D - B), u2 = (A, B), K = B + C - A - D.
        if let Some(pairwise) = &self.pairwise {
            let mut irregular = 0usize;
            for (s1, s2) in self.graph.edges() {
                let a = pairwise.cost(s1, s2, false, false);
                let b = pairwise.cost(s1, s2, false, true);
                let c = pairwise.cost(s1, s2, true, false);
                let d = pairwise.cost(s1, s2, true, true);

                self.solver.add_tweights(s2, a, b);
                self.solver.add_tweights(s1, 0.0, d - b);

                let capacity = b + c - a - d;
                if capacity < 0.0 {
                    irregular += 1;
                    trace!(s1, s2, capacity, "Non-regular pairwise term");
                }
                self.solver.add_edge(s1, s2, capacity.max(0.0), 0.0);
            }
            if irregular > 0 {
                warn!(
                    "{} of {} pairwise terms are not regular; the cut is not guaranteed to be a minimum",
                    irregular,
                    self.graph.edge_count()
                );
            }
        }

        debug!(
            sites = n,
            edges = self.graph.edge_count(),
            unary = self.unary.is_some(),
            pairwise = self.pairwise.is_some(),
            "Flow network built"
        );
    }

    /// Runs max-flow on the network. Returns the flow value, which equals
    /// the minimum energy when every pairwise term is regular.
    ///
    /// Calling it again recomputes the same cut.
    pub fn optimize(&mut self) -> Energy {
        let energy = self.solver.maxflow();
        debug!(energy, "Graph cut optimized");
        energy
    }

    /// Label of `site` after [`BinaryGraphCutOptimizer::optimize`]: `true`
    /// if it lies on the source side.
    ///
    /// # Panics
    ///
    /// Panics if `site` is not below [`BinaryGraphCutOptimizer::site_count`].
    pub fn segment_of(&self, site: Site) -> Label {
        self.solver.what_segment(site) == Segment::Source
    }

    pub fn try_segment_of(&self, site: Site) -> Result<Label, GraphCutError> {
        self.check_site(site)?;
        Ok(self.segment_of(site))
    }

    /// Labels of all sites, indexed by site.
    pub fn labeling(&self) -> Vec<Label> {
        (0..self.site_count()).map(|s| self.segment_of(s)).collect()
    }

    /// Evaluates the energy of an arbitrary labeling under this optimizer's
    /// costs.
    pub fn energy(&self, labeling: &[Label]) -> Result<Energy, GraphCutError> {
        if labeling.len() != self.site_count() {
            return Err(GraphCutError::LabelingLength {
                expected: self.site_count(),
                actual: labeling.len(),
            });
        }
        let unary: Energy = match &self.unary {
            Some(unary) => labeling
                .iter()
                .enumerate()
                .map(|(s, &l)| unary.cost(s, l))
                .sum(),
            None => 0.0,
        };
        let pairwise: Energy = match &self.pairwise {
            Some(pairwise) => self
                .graph
                .edges()
                .map(|(s1, s2)| pairwise.cost(s1, s2, labeling[s1], labeling[s2]))
                .sum(),
            None => 0.0,
        };
        Ok(unary + pairwise)
    }

    pub fn site_count(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn graph(&self) -> &EdgeGraph {
        &self.graph
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    fn check_site(&self, site: Site) -> Result<(), GraphCutError> {
        if site < self.site_count() {
            Ok(())
        } else {
            Err(GraphCutError::SiteOutOfRange {
                site,
                site_count: self.site_count(),
            })
        }
    }
}

impl<S: MaxFlow + Default> Clone for BinaryGraphCutOptimizer<S> {
    fn clone(&self) -> Self {
        Self::with_solver(
            S::default(),
            self.graph.clone(),
            self.unary.clone(),
            self.pairwise.clone(),
        )
    }
}

impl<S: MaxFlow> fmt::Debug for BinaryGraphCutOptimizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryGraphCutOptimizer")
            .field("sites", &self.graph.vertex_count())
            .field("edges", &self.graph.edge_count())
            .field("unary", &self.unary.is_some())
            .field("pairwise", &self.pairwise.is_some())
            .finish()
    }
}

/// Step-by-step construction of a [`BinaryGraphCutOptimizer`] from closures.
pub struct OptimizerBuilder<S: MaxFlow = DinicMaxFlow> {
    graph: EdgeGraph,
    unary: Option<Unary>,
    pairwise: Option<Pairwise>,
    solver: S,
}

impl<S: MaxFlow> OptimizerBuilder<S> {
    pub fn unary<F>(mut self, f: F) -> Self
    where
        F: Fn(Site, Label) -> Energy + Send + Sync + 'static,
    {
        self.unary = Some(Arc::new(f));
        self
    }

    pub fn pairwise<F>(mut self, f: F) -> Self
    where
        F: Fn(Site, Site, Label, Label) -> Energy + Send + Sync + 'static,
    {
        self.pairwise = Some(Arc::new(f));
        self
    }

    /// Declares at least `n` sites, so sites without edges still get nodes.
    pub fn site_count(mut self, n: usize) -> Self {
        self.graph.declare_sites(n);
        self
    }

    pub fn solver<T: MaxFlow>(self, solver: T) -> OptimizerBuilder<T> {
        OptimizerBuilder {
            graph: self.graph,
            unary: self.unary,
            pairwise: self.pairwise,
            solver,
        }
    }

    pub fn build(self) -> BinaryGraphCutOptimizer<S> {
        BinaryGraphCutOptimizer::with_solver(self.solver, self.graph, self.unary, self.pairwise)
    }
}
