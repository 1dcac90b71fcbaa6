//! # recallkit-core
//!
//! Approximate k-nearest-neighbor search with an HNSW graph, an exact
//! brute-force counterpart used as ground truth, and a partition-parallel
//! evaluator that measures the graph's recall against that ground truth.
//!
//! This is the core library crate with zero async dependencies. The
//! `recallkit` binary in `crates/cli` drives it end to end.

/// Global configuration constants: limits, defaults, and tuning parameters.
pub mod config;
/// Minimal partitioned table with typed columns, consumed by the evaluator.
pub mod dataset;
/// Distance functions, distance orderings and the dense metrics.
pub mod distance;
/// Error type and `Result` alias.
pub mod error;
/// Recall evaluation over neighbor-list columns.
pub mod evaluation;
/// Brute-force index and the exact view over an HNSW index.
pub mod exact;
/// HNSW approximate nearest neighbor index: graph structure, search, insertion, and removal.
pub mod hnsw;
/// Index capability traits.
pub mod index;
/// Item and neighbor value types.
pub mod item;
/// Checksummed snapshot framing and atomic file writes.
pub(crate) mod persistence;
/// Runs probes against an index and its exact view and measures recall.
pub mod pipeline;
/// `Arc<RwLock<_>>` handle for sharing an index across threads.
pub mod shared;

pub use distance::{DistanceFunction, DistanceMetric, DistanceOrdering, NaturalOrder, ReverseOrder};
pub use error::{Error, Result};
pub use evaluation::{EvaluatorConfig, RecallCounts, RecallEvaluator};
pub use exact::{BruteForceIndex, ExactView};
pub use hnsw::{HnswBuilder, HnswConfig, HnswIndex};
pub use index::{Index, SearchIndex};
pub use item::{Dimensions, Item, ItemId, Neighbor, Vector};
pub use shared::SharedIndex;
