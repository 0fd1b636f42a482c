use std::collections::HashSet;

use itertools::Itertools;

use crate::Site;

/// Undirected site adjacency without duplicate edges.
///
/// Each edge keeps the orientation of its first insertion; iteration yields
/// edges in insertion order. The vertex count is implied by the largest site
/// referenced by an edge, or by an explicit site declaration, whichever is
/// larger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeGraph {
    edges: Vec<(Site, Site)>,
    keys: HashSet<(Site, Site)>,
    vertices: usize,
}

fn edge_key(a: Site, b: Site) -> (Site, Site) {
    if a <= b { (a, b) } else { (b, a) }
}

impl EdgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph with sites `0..n` already declared, so that
    /// sites without any edge still get a node in the flow network.
    pub fn with_sites(n: usize) -> Self {
        EdgeGraph { vertices: n, ..Self::default() }
    }

    /// Raises the declared site count to at least `n`.
    pub fn declare_sites(&mut self, n: usize) {
        self.vertices = self.vertices.max(n);
    }

    /// 4-connected grid over `width * height` sites numbered row-major.
    pub fn grid_4(width: usize, height: usize) -> Self {
        let mut graph = EdgeGraph::with_sites(width * height);
        for (y, x) in (0..height).cartesian_product(0..width) {
            let s = y * width + x;
            if x + 1 < width {
                graph.insert_edge(s, s + 1);
            }
            if y + 1 < height {
                graph.insert_edge(s, s + width);
            }
        }
        graph
    }

    /// Inserts the undirected edge `{a, b}`. Returns `false` if it was
    /// already present in either orientation, or if `a == b`.
    pub fn insert_edge(&mut self, a: Site, b: Site) -> bool {
        if a == b || !self.keys.insert(edge_key(a, b)) {
            return false;
        }
        self.edges.push((a, b));
        self.vertices = self.vertices.max(a.max(b) + 1);
        true
    }

    pub fn has_edge(&self, a: Site, b: Site) -> bool {
        self.keys.contains(&edge_key(a, b))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of sites: the largest referenced site + 1, or the declared
    /// count if larger. An empty graph with nothing declared has 0.
    pub fn vertex_count(&self) -> usize {
        self.vertices
    }

    /// True when the graph holds no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = (Site, Site)> + Clone + '_ {
        self.edges.iter().copied()
    }

    pub fn neighbors(&self, s: Site) -> impl Iterator<Item = Site> + '_ {
        self.edges.iter().filter_map(move |&(a, b)| {
            if a == s {
                Some(b)
            } else if b == s {
                Some(a)
            } else {
                None
            }
        })
    }
}

impl<'a> IntoIterator for &'a EdgeGraph {
    type Item = (Site, Site);
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, (Site, Site)>>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter().copied()
    }
}

impl Extend<(Site, Site)> for EdgeGraph {
    fn extend<I: IntoIterator<Item = (Site, Site)>>(&mut self, iter: I) {
        for (a, b) in iter {
            self.insert_edge(a, b);
        }
    }
}

impl FromIterator<(Site, Site)> for EdgeGraph {
    fn from_iter<I: IntoIterator<Item = (Site, Site)>>(iter: I) -> Self {
        let mut graph = EdgeGraph::new();
        graph.extend(iter);
        graph
    }
}
