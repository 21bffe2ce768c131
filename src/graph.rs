use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::{DEFAULT_WEIGHT, READ_BUFFER_SIZE};

/// Vertex id. Signed and 64-bit wide so any integer id of an edge file fits.
pub type VInt = i64;

/// Adjacency of one vertex: neighbor -> edge weight.
pub type Neighbors = BTreeMap<VInt, f64>;

/// An undirected weighted edge as handed over by a loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedEdge {
    pub src: VInt,
    pub dst: VInt,
    pub weight: f64,
}

impl WeightedEdge {
    pub fn new(src: VInt, dst: VInt, weight: f64) -> Self {
        Self { src, dst, weight }
    }
}

impl From<(VInt, VInt)> for WeightedEdge {
    fn from((src, dst): (VInt, VInt)) -> Self {
        Self::new(src, dst, DEFAULT_WEIGHT)
    }
}

impl From<(VInt, VInt, f64)> for WeightedEdge {
    fn from((src, dst, weight): (VInt, VInt, f64)) -> Self {
        Self::new(src, dst, weight)
    }
}

impl From<(VInt, VInt, Option<f64>)> for WeightedEdge {
    fn from((src, dst, weight): (VInt, VInt, Option<f64>)) -> Self {
        Self::new(src, dst, weight.unwrap_or(DEFAULT_WEIGHT))
    }
}

/// Weighted undirected graph kept as a symmetric adjacency map.
/// Every edge (u, v, w) is stored both as `adj_map[u][v]` and `adj_map[v][u]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedGraph {
    pub(crate) adj_map: BTreeMap<VInt, Neighbors>,
}

impl WeightedGraph {
    pub fn new() -> WeightedGraph {
        WeightedGraph {
            adj_map: BTreeMap::new(),
        }
    }

    /// Build a graph from an edge sequence. A pair seen twice keeps the last weight.
    pub fn from_edges<I, E>(edges: I) -> WeightedGraph
    where
        I: IntoIterator<Item = E>,
        E: Into<WeightedEdge>,
    {
        let mut graph = WeightedGraph::new();
        for edge in edges {
            let edge = edge.into();
            graph.insert_edge(edge.src, edge.dst, edge.weight);
        }
        graph
    }

    /// Insert (or overwrite) the undirected edge (u, v).
    pub fn insert_edge(&mut self, u: VInt, v: VInt, weight: f64) {
        self.adj_map.entry(u).or_default().insert(v, weight);
        self.adj_map.entry(v).or_default().insert(u, weight);
    }

    /// Insert a vertex without edges. Existing vertices are left untouched.
    pub fn insert_vertex(&mut self, u: VInt) {
        self.adj_map.entry(u).or_default();
    }

    pub fn contains_vertex(&self, u: &VInt) -> bool {
        self.adj_map.contains_key(u)
    }

    pub fn vertices(&self) -> impl Iterator<Item = VInt> + '_ {
        self.adj_map.keys().copied()
    }

    /// Neighbors of `u` with edge weights, empty for unknown vertices.
    pub fn neighbors(&self, u: &VInt) -> impl Iterator<Item = (VInt, f64)> + '_ {
        self.adj_map
            .get(u)
            .into_iter()
            .flat_map(|neighbors| neighbors.iter().map(|(&v, &w)| (v, w)))
    }

    pub fn edge_weight(&self, u: &VInt, v: &VInt) -> Option<f64> {
        self.adj_map.get(u).and_then(|neighbors| neighbors.get(v)).copied()
    }

    /// Sum of the weights incident to `u`.
    pub fn degree(&self, u: &VInt) -> f64 {
        self.adj_map
            .get(u)
            .map(|neighbors| neighbors.values().sum())
            .unwrap_or(0.0)
    }

    pub fn vertex_count(&self) -> usize {
        self.adj_map.len()
    }

    /// Number of undirected edges, self-loops included.
    pub fn edge_count(&self) -> usize {
        self.adj_map
            .iter()
            .map(|(u, neighbors)| neighbors.range(*u..).count())
            .sum()
    }

    /// Total edge weight `m`, each undirected edge counted once.
    pub fn total_weight(&self) -> f64 {
        self.adj_map
            .iter()
            .map(|(u, neighbors)| neighbors.range(*u..).map(|(_, w)| w).sum::<f64>())
            .sum()
    }
}

/// Read an edge list file, one `u v [w]` record per line.
/// Blank lines and lines starting with `#` are skipped.
/// With `merge_duplicates`, repeated undirected pairs are summed into one edge.
pub fn read_edge_file(path: impl AsRef<Path>, merge_duplicates: bool) -> Result<Vec<WeightedEdge>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open edge file {}", path.display()))?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut edges = Vec::new();
    // Position of an undirected pair inside `edges`, only used when merging.
    let mut pair_index = BTreeMap::<(VInt, VInt), usize>::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let edge = match parse_edge_line(&line)
            .with_context(|| format!("{}:{}: malformed edge record", path.display(), line_no + 1))?
        {
            Some(edge) => edge,
            None => continue,
        };

        if !merge_duplicates {
            edges.push(edge);
            continue;
        }
        let key = (edge.src.min(edge.dst), edge.src.max(edge.dst));
        match pair_index.entry(key) {
            Entry::Occupied(slot) => edges[*slot.get()].weight += edge.weight,
            Entry::Vacant(slot) => {
                slot.insert(edges.len());
                edges.push(edge);
            }
        }
    }
    log::debug!("Read {} edges from {}", edges.len(), path.display());
    Ok(edges)
}

fn parse_edge_line(line: &str) -> Result<Option<WeightedEdge>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        bail!("expected `u v [w]`, found {:?}", line);
    }
    let src: VInt = tokens[0]
        .parse()
        .with_context(|| format!("invalid vertex id {:?}", tokens[0]))?;
    let dst: VInt = tokens[1]
        .parse()
        .with_context(|| format!("invalid vertex id {:?}", tokens[1]))?;
    let weight = match tokens.get(2) {
        Some(token) => {
            let weight: f64 = token
                .parse()
                .with_context(|| format!("invalid weight {:?}", token))?;
            if !weight.is_finite() || weight < 0.0 {
                bail!("weight must be a finite non-negative number, found {}", weight);
            }
            weight
        }
        None => DEFAULT_WEIGHT,
    };
    Ok(Some(WeightedEdge::new(src, dst, weight)))
}

#[cfg(test)]
mod test_graph {
    use std::io::Write;

    use crate::graph::{read_edge_file, WeightedEdge, WeightedGraph};

    #[test]
    fn test_symmetric_adjacency() {
        let g = WeightedGraph::from_edges(vec![(1, 2, 2.0), (2, 3, 0.5)]);
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.edge_weight(&1, &2), Some(2.0));
        assert_eq!(g.edge_weight(&2, &1), Some(2.0));
        assert_eq!(g.edge_weight(&3, &2), Some(0.5));
        assert_eq!(g.edge_weight(&1, &3), None);
        assert_eq!(g.degree(&2), 2.5);
        assert_eq!(g.degree(&42), 0.0);
    }

    #[test]
    fn test_default_weight() {
        let g = WeightedGraph::from_edges(vec![(1i64, 2i64, None), (2, 3, Some(3.0))]);
        assert_eq!(g.edge_weight(&1, &2), Some(1.0));
        assert_eq!(g.edge_weight(&2, &3), Some(3.0));
    }

    #[test]
    fn test_total_weight_counts_each_edge_once() {
        let g = WeightedGraph::from_edges(vec![(1, 2, 1.0), (2, 3, 2.0), (3, 1, 4.0)]);
        assert_eq!(g.total_weight(), 7.0);

        // A self-loop is a single undirected edge as well.
        let mut g = g;
        g.insert_edge(4, 4, 1.5);
        assert_eq!(g.total_weight(), 8.5);
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn test_duplicate_edge_last_write_wins() {
        let g = WeightedGraph::from_edges(vec![(1, 2, 1.0), (2, 1, 5.0)]);
        assert_eq!(g.edge_weight(&1, &2), Some(5.0));
        assert_eq!(g.total_weight(), 5.0);
    }

    #[test]
    fn test_isolated_vertex() {
        let mut g = WeightedGraph::from_edges(vec![(1, 2)]);
        g.insert_vertex(7);
        assert!(g.contains_vertex(&7));
        assert_eq!(g.neighbors(&7).count(), 0);
        assert_eq!(g.vertices().collect::<Vec<_>>(), vec![1, 2, 7]);
    }

    #[test]
    fn test_read_edge_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment line\n1 2\n2 3 0.5\n\n3 1 2").unwrap();
        let edges = read_edge_file(file.path(), false).unwrap();
        assert_eq!(
            edges,
            vec![
                WeightedEdge::new(1, 2, 1.0),
                WeightedEdge::new(2, 3, 0.5),
                WeightedEdge::new(3, 1, 2.0),
            ]
        );
    }

    #[test]
    fn test_read_edge_file_merge_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2 1.0\n2 3\n2 1 2.5").unwrap();

        let merged = read_edge_file(file.path(), true).unwrap();
        assert_eq!(merged, vec![WeightedEdge::new(1, 2, 3.5), WeightedEdge::new(2, 3, 1.0)]);

        // Without merging the graph keeps the last weight.
        let raw = read_edge_file(file.path(), false).unwrap();
        let g = WeightedGraph::from_edges(raw);
        assert_eq!(g.edge_weight(&1, &2), Some(2.5));
    }

    #[test]
    fn test_read_negative_and_wide_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-1 2\n5000000000 3 0.5").unwrap();
        let edges = read_edge_file(file.path(), false).unwrap();
        assert_eq!(
            edges,
            vec![WeightedEdge::new(-1, 2, 1.0), WeightedEdge::new(5_000_000_000, 3, 0.5)]
        );

        let g = WeightedGraph::from_edges(edges);
        assert_eq!(g.vertices().collect::<Vec<_>>(), vec![-1, 2, 3, 5_000_000_000]);
        assert_eq!(g.edge_weight(&2, &-1), Some(1.0));
    }

    #[test]
    fn test_read_malformed_edge_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2\n3").unwrap();
        let err = read_edge_file(file.path(), false).unwrap_err();
        assert!(format!("{:#}", err).contains(":2:"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 x").unwrap();
        assert!(read_edge_file(file.path(), false).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2 heavy").unwrap();
        assert!(read_edge_file(file.path(), false).is_err());

        assert!(read_edge_file("no/such/file.edges", false).is_err());
    }
}
