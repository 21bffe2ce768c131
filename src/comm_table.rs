// Partition of one level: vertex records of original nodes and super-nodes, and the
// community each of them currently belongs to.
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::graph::{VInt, WeightedGraph};

pub type CommID = VInt;

/// One active vertex of the current level, either an original node or a super-node.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexRecord {
    pub id: VInt, // Key of this vertex in the table.
    pub community_id: CommID, // Community the vertex currently belongs to.
    pub member_nodes: BTreeSet<VInt>, // Original nodes folded into this vertex.
    pub internal_weight: f64, // Edge weight already folded inside this vertex.
}

impl VertexRecord {
    /// Record of an original node, alone in its own community.
    pub fn leaf(id: VInt) -> VertexRecord {
        VertexRecord {
            id,
            community_id: id,
            member_nodes: BTreeSet::from([id]),
            internal_weight: 0.0,
        }
    }

    /// Record of a collapsed community, alone in its own community.
    pub fn super_node(id: VInt, member_nodes: BTreeSet<VInt>, internal_weight: f64) -> VertexRecord {
        VertexRecord {
            id,
            community_id: id,
            member_nodes,
            internal_weight,
        }
    }
}

/// Partition of the vertices of one level into communities.
///
/// `comm_map` and `vertex_map` are kept consistent: every vertex `v` is a member of
/// `comm_map[vertex_map[v].community_id]` and of no other community.
#[derive(Debug, Clone, PartialEq)]
pub struct CommTable {
    comm_map: BTreeMap<CommID, BTreeSet<VInt>>,
    vertex_map: BTreeMap<VInt, VertexRecord>,
    degrees: BTreeMap<VInt, f64>, // k_v per vertex, fixed for the level.
    comm_degrees: BTreeMap<CommID, f64>, // tot per community.
}

impl CommTable {
    /// One singleton community per vertex of the graph.
    pub fn from_graph(graph: &WeightedGraph) -> CommTable {
        CommTable::from_records(graph, graph.vertices().map(VertexRecord::leaf))
    }

    /// Build the table of a level from its vertex records.
    /// Each record must name a vertex of `graph`; records start in their own community.
    pub fn from_records(
        graph: &WeightedGraph,
        records: impl IntoIterator<Item = VertexRecord>,
    ) -> CommTable {
        let mut table = CommTable {
            comm_map: BTreeMap::new(),
            vertex_map: BTreeMap::new(),
            degrees: BTreeMap::new(),
            comm_degrees: BTreeMap::new(),
        };
        for mut record in records {
            let id = record.id;
            record.community_id = id;
            // Folded edges count at both of their endpoints.
            let degree = graph.degree(&id) + 2.0 * record.internal_weight;
            table.comm_map.insert(id, BTreeSet::from([id]));
            table.degrees.insert(id, degree);
            table.comm_degrees.insert(id, degree);
            table.vertex_map.insert(id, record);
        }
        table
    }

    pub fn vertex(&self, v: &VInt) -> Option<&VertexRecord> {
        self.vertex_map.get(v)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &VertexRecord> {
        self.vertex_map.values()
    }

    pub fn vertex_ids(&self) -> Vec<VInt> {
        self.vertex_map.keys().copied().collect()
    }

    pub fn community_of(&self, v: &VInt) -> Option<CommID> {
        self.vertex_map.get(v).map(|record| record.community_id)
    }

    /// Members of community `c`, empty if the community is unknown or empty.
    pub fn members(&self, c: &CommID) -> impl Iterator<Item = VInt> + '_ {
        self.comm_map.get(c).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn is_member(&self, c: &CommID, v: &VInt) -> bool {
        self.comm_map.get(c).map_or(false, |set| set.contains(v))
    }

    /// Non-empty communities with their members.
    pub fn communities(&self) -> impl Iterator<Item = (CommID, &BTreeSet<VInt>)> {
        self.comm_map
            .iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(c, members)| (*c, members))
    }

    pub fn community_count(&self) -> usize {
        self.communities().count()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_map.len()
    }

    /// k_v: incident weight of `v` plus its folded internal weight.
    pub fn degree_including_internal(&self, v: &VInt) -> f64 {
        self.degrees.get(v).copied().unwrap_or(0.0)
    }

    /// tot: sum of k_v over the members of `c`.
    pub fn community_total_degree(&self, c: &CommID) -> f64 {
        self.comm_degrees.get(c).copied().unwrap_or(0.0)
    }

    /// Move `v` from community `from` to community `to`.
    /// Returns false, leaving the table untouched, if `from == to` or `v` is not in `from`.
    pub fn move_vertex(&mut self, v: VInt, from: CommID, to: CommID) -> bool {
        if from == to || !self.is_member(&from, &v) {
            return false;
        }
        let Some(record) = self.vertex_map.get_mut(&v) else {
            return false;
        };
        record.community_id = to;

        if let Some(members) = self.comm_map.get_mut(&from) {
            members.remove(&v);
        }
        self.comm_map.entry(to).or_default().insert(v);

        let degree = self.degrees.get(&v).copied().unwrap_or(0.0);
        if let Some(tot) = self.comm_degrees.get_mut(&from) {
            *tot -= degree;
        }
        *self.comm_degrees.entry(to).or_insert(0.0) += degree;
        true
    }

    /// Original node ids of every non-empty community, each list sorted.
    pub fn flatten(&self) -> Vec<Vec<VInt>> {
        self.communities()
            .map(|(_, members)| {
                members
                    .iter()
                    .filter_map(|v| self.vertex_map.get(v))
                    .flat_map(|record| record.member_nodes.iter().copied())
                    .sorted()
                    .collect()
            })
            .collect()
    }

    /// (original node, community index) pairs, with communities numbered by
    /// descending size. Equal sizes are ordered by their smallest node.
    pub fn assignments(&self) -> Vec<(VInt, usize)> {
        rank_communities(self.flatten())
            .into_iter()
            .enumerate()
            .flat_map(|(index, community)| community.into_iter().map(move |v| (v, index)))
            .collect()
    }
}

/// Order communities by descending size, then by smallest member.
pub fn rank_communities(communities: Vec<Vec<VInt>>) -> Vec<Vec<VInt>> {
    communities
        .into_iter()
        .sorted_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())))
        .collect()
}

/// Write `node\tcommunity` lines.
pub fn write_assignments(path: impl AsRef<Path>, assignments: &[(VInt, usize)]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create output {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (vertex, comm_index) in assignments {
        writeln!(writer, "{}\t{}", vertex, comm_index)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write output {}", path.display()))?;
    Ok(())
}
