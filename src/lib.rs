//! Binary energy minimization by graph cuts.
//!
//! Energies of the form `sum_i E_i(y_i) + sum_{(i,j)} E_ij(y_i, y_j)` over
//! binary labels are reduced to a single s-t minimum cut (Kolmogorov & Zabih).
//! The result is a global minimum whenever every pairwise term is regular:
//! `E_ij(0,0) + E_ij(1,1) <= E_ij(0,1) + E_ij(1,0)`.
//!
//! ```no_run
//! use binary_graphcut::{BinaryGraphCutOptimizer, EdgeGraph};
//!
//! let graph = EdgeGraph::grid_4(64, 48);
//! let mut optimizer = BinaryGraphCutOptimizer::builder(graph)
//!     .unary(|site, label| if label { 1.0 } else { (site % 3) as f64 })
//!     .pairwise(|_, _, a, b| if a == b { 0.0 } else { 0.5 })
//!     .build();
//! optimizer.optimize();
//! let foreground = optimizer.segment_of(0);
//! ```

pub mod error;
pub mod graph;
pub mod maxflow;
pub mod optimizer;

pub use error::GraphCutError;
pub use graph::EdgeGraph;
pub use maxflow::{DinicMaxFlow, MaxFlow, Segment};
pub use optimizer::{
    BinaryGraphCutOptimizer, OptimizerBuilder, Pairwise, PairwiseCost, Unary, UnaryCost,
};

/// Index of a site (vertex), dense and 0-based.
pub type Site = usize;
/// Binary label; `true` is foreground and corresponds to the source side of the cut.
pub type Label = bool;
pub type Energy = f64;
