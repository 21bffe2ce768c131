//! Multi-level Louvain modularity optimisation.
//!
//! Every pass runs two stages on the current level:
//!
//! 1. **Local moving**: vertices are visited in a shuffled order and each one is moved
//!    to the neighbouring community with the largest positive modularity gain, until a
//!    round moves nothing or the round cap is hit.
//! 2. **Aggregation**: every community collapses into one super-node, edges between
//!    communities are summed, edges inside a community become internal weight.
//!
//! Passes repeat until local moving finds nothing to do or the pass cap is hit.
//! The total weight `m` is taken from the finest graph and never recomputed.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::comm_table::{rank_communities, CommID, CommTable, VertexRecord};
use crate::config::{LouvainConfig, NO_GAIN};
use crate::graph::{VInt, WeightedGraph};

/// Why the driver loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Termination {
    /// Local moving found no improving move.
    #[display(fmt = "converged")]
    Converged,
    /// Every allowed pass improved the partition.
    #[display(fmt = "pass cap reached")]
    PassCapReached,
}

/// Statistics of one pass of the driver loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub pass: usize,
    pub rounds: usize, // Local moving rounds run in this pass.
    pub moved: bool, // Whether any vertex changed community.
    pub community_count: usize, // Communities left after the pass.
    pub modularity: f64, // Modularity of the partition after the pass.
}

/// Result of a complete run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LouvainRun {
    pub termination: Termination,
    pub communities: Vec<Vec<VInt>>,
    pub history: Vec<PassSummary>,
}

impl LouvainRun {
    /// (original node, community index) pairs following the order of `communities`.
    pub fn assignments(&self) -> Vec<(VInt, usize)> {
        self.communities
            .iter()
            .enumerate()
            .flat_map(|(index, community)| community.iter().map(move |v| (*v, index)))
            .collect()
    }

    pub fn modularity(&self) -> Option<f64> {
        self.history.last().map(|summary| summary.modularity)
    }
}

/// Louvain community detection over a weighted undirected graph.
pub struct Louvain<R: Rng = StdRng> {
    graph: WeightedGraph, // Graph of the current level.
    table: CommTable, // Partition of the current level.
    total_weight: f64, // m of the finest graph.
    config: LouvainConfig,
    rng: R, // Source of the visiting order.
    history: Vec<PassSummary>,
}

impl Louvain<StdRng> {
    /// Seeded from `config.seed` when present, from OS entropy otherwise.
    pub fn new(graph: WeightedGraph, config: LouvainConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Louvain::with_rng(graph, config, rng)
    }
}

impl<R: Rng> Louvain<R> {
    pub fn with_rng(graph: WeightedGraph, config: LouvainConfig, rng: R) -> Self {
        let total_weight = graph.total_weight();
        let table = CommTable::from_graph(&graph);
        debug!(
            "Louvain initialised: {} vertices, {} edges, m = {}",
            graph.vertex_count(),
            graph.edge_count(),
            total_weight
        );
        Louvain {
            graph,
            table,
            total_weight,
            config,
            rng,
            history: Vec::new(),
        }
    }

    pub fn graph(&self) -> &WeightedGraph {
        &self.graph
    }

    pub fn table(&self) -> &CommTable {
        &self.table
    }

    pub fn config(&self) -> &LouvainConfig {
        &self.config
    }

    /// m of the finest graph, fixed for the whole run.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn history(&self) -> &[PassSummary] {
        &self.history
    }

    /// Alternate local moving and aggregation until nothing moves or the pass cap is hit.
    pub fn execute(&mut self) -> Termination {
        let mut pass = 0usize;
        loop {
            if pass >= self.config.max_passes {
                warn!(
                    "Stopped after {} passes with {} communities left, partition may be suboptimal",
                    pass,
                    self.table.community_count()
                );
                return Termination::PassCapReached;
            }
            pass += 1;
            info!(
                "Pass {} (max {}): {} vertices",
                pass,
                self.config.max_passes,
                self.table.vertex_count()
            );

            let (moved, rounds) = self.run_local_moving();
            if moved {
                self.aggregate_level();
            }
            let summary = PassSummary {
                pass,
                rounds,
                moved,
                community_count: self.table.community_count(),
                modularity: self.level_modularity(),
            };
            info!(
                "Pass {} done: {} rounds, {} communities, modularity {:.6}",
                summary.pass, summary.rounds, summary.community_count, summary.modularity
            );
            self.history.push(summary);

            if !moved {
                return Termination::Converged;
            }
        }
    }

    /// Execute and collect the outcome.
    pub fn run(mut self) -> LouvainRun {
        let termination = self.execute();
        LouvainRun {
            termination,
            communities: self.communities(),
            history: self.history,
        }
    }

    /// Original node ids per community, largest communities first.
    pub fn communities(&self) -> Vec<Vec<VInt>> {
        rank_communities(self.table.flatten())
    }

    /// (original node, community index) pairs, largest communities first.
    pub fn assignments(&self) -> Vec<(VInt, usize)> {
        self.table.assignments()
    }

    /// Local moving stage. Returns true if any vertex changed community.
    pub fn local_moving(&mut self) -> bool {
        self.run_local_moving().0
    }

    fn run_local_moving(&mut self) -> (bool, usize) {
        let m = self.total_weight;
        if m <= 0.0 {
            debug!("Total weight is zero, nothing to optimise");
            return (false, 0);
        }

        let mut improved = false;
        let mut rounds = 0usize;
        let mut visit_sequence = self.table.vertex_ids();
        while rounds < self.config.max_local_rounds {
            rounds += 1;
            visit_sequence.shuffle(&mut self.rng);

            let mut moved = false;
            let mut max_gain = 0.0f64;
            for &v in &visit_sequence {
                let Some(v_cid) = self.table.community_of(&v) else {
                    continue;
                };
                let (best_cid, best_gain) = self.best_community(v, v_cid, m);
                max_gain = max_gain.max(best_gain);
                if best_gain > 0.0 && best_cid != v_cid && self.table.move_vertex(v, v_cid, best_cid) {
                    moved = true;
                }
            }
            debug!(
                "Local moving round {} (max {}): {} communities, max gain {:.6e}",
                rounds,
                self.config.max_local_rounds,
                self.table.community_count(),
                max_gain
            );

            if !moved {
                return (improved, rounds);
            }
            improved = true;
        }
        debug!("Local moving hit the round cap of {}", self.config.max_local_rounds);
        (improved, rounds)
    }

    /// Best neighbouring community of `v` and its gain.
    /// Without any neighbouring community the vertex stays with gain `NO_GAIN`.
    fn best_community(&self, v: VInt, v_cid: CommID, m: f64) -> (CommID, f64) {
        let k_v = self.table.degree_including_internal(&v);

        // Weight from v to each neighbouring community, in first-seen order.
        let mut k_v_in_old = 0.0;
        let mut links: Vec<(CommID, f64)> = Vec::new();
        let mut link_index = BTreeMap::<CommID, usize>::new();
        for (neighbor, weight) in self.graph.neighbors(&v) {
            if neighbor == v {
                continue;
            }
            let Some(cid) = self.table.community_of(&neighbor) else {
                continue;
            };
            if cid == v_cid {
                k_v_in_old += weight;
                continue;
            }
            match link_index.get(&cid) {
                Some(&index) => links[index].1 += weight,
                None => {
                    link_index.insert(cid, links.len());
                    links.push((cid, weight));
                }
            }
        }

        let tot_old = self.table.community_total_degree(&v_cid);
        let delta_remove = remove_gain(k_v_in_old, k_v, tot_old, m);

        let mut best: Option<(CommID, f64)> = None;
        for (cid, k_v_in_new) in links {
            let tot_new = self.table.community_total_degree(&cid);
            let delta_q = insert_gain(k_v_in_new, k_v, tot_new, m) + delta_remove;
            if best.map_or(true, |(_, gain)| delta_q > gain) {
                best = Some((cid, delta_q));
            }
        }
        best.unwrap_or((v_cid, NO_GAIN))
    }

    /// Aggregation stage: replace the current level by its community graph.
    pub fn aggregate_level(&mut self) {
        let (graph, table) = aggregate(&self.graph, &self.table);
        debug!(
            "Aggregated {} vertices into {} super-nodes",
            self.table.vertex_count(),
            table.vertex_count()
        );
        self.graph = graph;
        self.table = table;
    }

    /// Modularity of the current partition, computed on the current level.
    /// Agrees with [`modularity`] on the finest graph when the input has no self-loops.
    pub fn level_modularity(&self) -> f64 {
        let m = self.total_weight;
        if m <= 0.0 {
            return 0.0;
        }
        self.table
            .communities()
            .map(|(cid, _)| {
                let mut internal = 0.0;
                for v in self.table.members(&cid) {
                    if let Some(record) = self.table.vertex(&v) {
                        internal += record.internal_weight;
                    }
                    for (neighbor, weight) in self.graph.neighbors(&v) {
                        if self.table.community_of(&neighbor) == Some(cid) {
                            internal += weight / 2.0;
                        }
                    }
                }
                let tot = self.table.community_total_degree(&cid);
                internal / m - (tot / (2.0 * m)).powi(2)
            })
            .sum()
    }
}

/// Gain of taking a vertex out of its community.
/// `k_v_in` is its weight to the other members, `tot` the community total including itself.
pub(crate) fn remove_gain(k_v_in: f64, k_v: f64, tot: f64, m: f64) -> f64 {
    (-k_v_in + k_v * (tot - k_v) / (2.0 * m)) / m
}

/// Gain of inserting an isolated vertex into a community with total degree `tot`.
pub(crate) fn insert_gain(k_v_in: f64, k_v: f64, tot: f64, m: f64) -> f64 {
    (k_v_in - k_v * tot / (2.0 * m)) / m
}

/// Collapse every non-empty community of `table` into one super-node.
///
/// The super-node keeps the community id, the union of the members' original nodes and
/// their internal weight plus every edge inside the community. Edges between two
/// communities are summed into one edge.
pub fn aggregate(graph: &WeightedGraph, table: &CommTable) -> (WeightedGraph, CommTable) {
    let mut new_graph = WeightedGraph::new();
    let mut records = Vec::with_capacity(table.community_count());
    let mut crossing = BTreeMap::<(CommID, CommID), f64>::new();

    for (cid, _) in table.communities() {
        let mut member_nodes = BTreeSet::new();
        let mut internal_weight = 0.0;
        for v in table.members(&cid) {
            let Some(record) = table.vertex(&v) else {
                continue;
            };
            member_nodes.extend(record.member_nodes.iter().copied());
            internal_weight += record.internal_weight;
            for (neighbor, weight) in graph.neighbors(&v) {
                match table.community_of(&neighbor) {
                    // Seen from both endpoints.
                    Some(n_cid) if n_cid == cid => internal_weight += weight / 2.0,
                    Some(n_cid) if cid < n_cid => {
                        *crossing.entry((cid, n_cid)).or_insert(0.0) += weight;
                    }
                    _ => {}
                }
            }
        }
        new_graph.insert_vertex(cid);
        records.push(VertexRecord::super_node(cid, member_nodes, internal_weight));
    }

    for ((c1, c2), weight) in crossing {
        if weight != 0.0 {
            new_graph.insert_edge(c1, c2, weight);
        }
    }
    let new_table = CommTable::from_records(&new_graph, records);
    (new_graph, new_table)
}

/// Newman modularity `Q = 1/2m * sum_ij [A_ij - k_i k_j / 2m] * delta(c_i, c_j)`.
///
/// Vertices of `graph` missing from `communities` count as singletons. Returns 0 for a
/// graph without weight.
pub fn modularity(graph: &WeightedGraph, communities: &[Vec<VInt>]) -> f64 {
    let m = graph.total_weight();
    if m <= 0.0 {
        return 0.0;
    }

    let mut membership = BTreeMap::<VInt, usize>::new();
    for (index, community) in communities.iter().enumerate() {
        for v in community {
            membership.insert(*v, index);
        }
    }
    let mut next_index = communities.len();
    for v in graph.vertices() {
        membership.entry(v).or_insert_with(|| {
            next_index += 1;
            next_index - 1
        });
    }

    let mut internal = vec![0.0f64; next_index];
    let mut degree = vec![0.0f64; next_index];
    for u in graph.vertices() {
        let cu = membership[&u];
        for (v, weight) in graph.neighbors(&u) {
            degree[cu] += weight;
            if membership.get(&v) == Some(&cu) {
                internal[cu] += weight;
            }
        }
    }

    internal
        .iter()
        .zip(degree.iter())
        .map(|(a, k)| a / (2.0 * m) - (k / (2.0 * m)).powi(2))
        .sum()
}
