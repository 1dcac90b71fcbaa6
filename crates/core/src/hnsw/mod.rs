//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! Nodes live on a stack of layers: every node is on layer 0, and each layer
//! above holds an exponentially thinner subset. Queries descend greedily from
//! the sparse top layers and finish with a beam search of width `max(ef, k)`
//! on layer 0.
//!
//! The graph uses parallel per-node arrays indexed by internal `u32` id:
//! items, neighbor lists, levels and tombstones. External ids map to internal
//! ids through a hash map that only tracks live items.

/// HNSW graph structure, configuration, builder and trait implementations.
pub mod graph;
/// HNSW insertion algorithm with bidirectional connections and heuristic pruning.
pub mod insert;
/// Node retirement: tombstoning, unlinking and entry point repair.
pub mod remove;
/// HNSW search: single-layer beam search and multi-layer KNN.
pub mod search;
/// Epoch-based visited set for efficient graph traversal.
pub(crate) mod visited;

pub use graph::{HnswBuilder, HnswConfig, HnswIndex};
