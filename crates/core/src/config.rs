//! Global configuration constants for recallkit.
//!
//! All tuning defaults, limits, and on-disk format markers are defined here.
//! These are compile-time constants; runtime configuration goes through
//! [`HnswConfig`](crate::hnsw::HnswConfig), [`EvaluatorConfig`](crate::evaluation::EvaluatorConfig)
//! and the CLI arguments in the `recallkit` binary.

/// Default number of bidirectional links per HNSW node on upper layers.
///
/// Layer 0 keeps twice as many. Higher values improve recall but increase
/// memory and build time. Typical range: 5–48.
pub const HNSW_DEFAULT_M: usize = 10;

/// Default ef parameter during HNSW search.
///
/// Size of the dynamic candidate list at query time. The effective list is
/// always at least `k`.
pub const HNSW_DEFAULT_EF: usize = 10;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default capacity bound used by `HnswConfig::default()`.
pub const DEFAULT_MAX_ITEM_COUNT: usize = 1_000_000;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_MAX_LAYERS: usize = 16;

/// Default seed for level assignment. Node `i` draws its level from a
/// generator seeded with `seed + i`.
pub const HNSW_DEFAULT_SEED: u64 = 42;

/// Progress listeners passed to bulk insertion are notified after this many items.
pub const PROGRESS_UPDATE_INTERVAL: usize = 100_000;

/// Magic bytes appended before the CRC32 footer of an index snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"RKS1";

/// Default name of the ground-truth neighbor column read by the evaluator.
pub const DEFAULT_EXACT_NEIGHBORS_COL: &str = "exactNeighbors";

/// Default name of the approximate neighbor column read by the evaluator.
pub const DEFAULT_APPROXIMATE_NEIGHBORS_COL: &str = "approximateNeighbors";

/// Field holding the neighbor id inside a neighbor record.
pub const NEIGHBOR_FIELD: &str = "neighbor";

/// Field holding the distance inside a neighbor record.
pub const DISTANCE_FIELD: &str = "distance";

/// Default number of partitions produced by the query pipeline.
pub const DEFAULT_NUM_PARTITIONS: usize = 8;

/// Maximum number of results (`k`) accepted by the CLI.
pub const MAX_K: usize = 10_000;
