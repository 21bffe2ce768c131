//! Louvain community detection on weighted undirected graphs.
//!
//! ```
//! use louvain_community::{Louvain, LouvainConfig, WeightedGraph};
//!
//! let graph = WeightedGraph::from_edges(vec![(1, 2), (2, 3), (3, 1), (4, 5), (5, 6), (6, 4)]);
//! let mut louvain = Louvain::new(graph, LouvainConfig::default().with_seed(7));
//! louvain.execute();
//! assert_eq!(louvain.communities().len(), 2);
//! ```

pub mod comm_table;
pub mod community_algo;
pub mod config;
pub mod graph;
pub mod logger;

pub use comm_table::{write_assignments, CommID, CommTable, VertexRecord};
pub use community_algo::{aggregate, modularity, Louvain, LouvainRun, PassSummary, Termination};
pub use config::LouvainConfig;
pub use graph::{read_edge_file, VInt, WeightedEdge, WeightedGraph};
