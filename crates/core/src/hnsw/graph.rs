//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef, ef_construction, capacity, removal support).
//! [`HnswIndex`] stores the graph in parallel per-node arrays indexed by internal id.
//! [`HnswBuilder`] assembles an index from a distance function and optional overrides.

use crate::config;
use crate::distance::{DistanceFunction, DistanceOrdering, NaturalOrder};
use crate::error::{Error, Result};
use crate::exact::ExactView;
use crate::index::{Index, SearchIndex};
use crate::item::{Item, ItemId, Neighbor, Vector};
use crate::persistence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, recall, and memory usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum number of live items the index accepts.
    pub max_item_count: usize,
    /// Number of bidirectional links per node (except layer 0, which uses `m_max0`).
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during search (raised to `k` when smaller).
    pub ef: usize,
    /// Candidate list size during index construction.
    pub ef_construction: usize,
    /// Keep inbound edge lists so removed nodes can be unlinked.
    #[serde(default)]
    pub remove_enabled: bool,
    /// Base seed for per-node level assignment.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_item_count: config::DEFAULT_MAX_ITEM_COUNT,
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef: config::HNSW_DEFAULT_EF,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            remove_enabled: false,
            seed: config::HNSW_DEFAULT_SEED,
        }
    }
}

impl HnswConfig {
    /// Checks the construction invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_item_count == 0 {
            return Err(Error::Configuration(
                "max_item_count must be positive".into(),
            ));
        }
        if self.m == 0 {
            return Err(Error::Configuration("m must be positive".into()));
        }
        if self.m_max0 < self.m {
            return Err(Error::Configuration(format!(
                "m_max0 ({}) must be at least m ({})",
                self.m_max0, self.m
            )));
        }
        if self.ef == 0 {
            return Err(Error::Configuration("ef must be positive".into()));
        }
        if self.ef_construction == 0 {
            return Err(Error::Configuration(
                "ef_construction must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Approximate k-NN index over a layered proximity graph.
///
/// Node `i` owns `items[i]`, `neighbors[i]` (one list per layer it lives on),
/// `layers[i]` and `deleted[i]`. Removed nodes stay in the arrays as
/// tombstones; updates reuse the node of the id they replace.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "Id: Serialize, V: Serialize, F: Serialize, O: Serialize",
    deserialize = "Id: Deserialize<'de> + Eq + std::hash::Hash, V: Deserialize<'de>, \
                   F: Deserialize<'de>, O: Deserialize<'de>"
))]
pub struct HnswIndex<Id, V, F, O = NaturalOrder> {
    pub(crate) config: HnswConfig,
    pub(crate) dimensions: usize,
    pub(crate) distance: F,
    pub(crate) ordering: O,
    pub(crate) items: Vec<Item<Id, V>>,
    pub(crate) neighbors: Vec<Vec<Vec<u32>>>, // [node][layer][neighbor]
    /// Reverse edges, maintained only when `remove_enabled`.
    pub(crate) inbound: Vec<Vec<Vec<u32>>>,
    pub(crate) layers: Vec<u8>,
    pub(crate) deleted: Vec<bool>,
    /// Live ids only.
    pub(crate) id_to_internal: HashMap<Id, u32>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_layer: usize,
}

impl<Id, V, F, O> fmt::Debug for HnswIndex<Id, V, F, O>
where
    F: fmt::Debug,
    O: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("config", &self.config)
            .field("dimensions", &self.dimensions)
            .field("distance", &self.distance)
            .field("ordering", &self.ordering)
            .field("live", &self.id_to_internal.len())
            .field("nodes", &self.items.len())
            .field("entry_point", &self.entry_point)
            .field("max_layer", &self.max_layer)
            .finish()
    }
}

/// Builder for [`HnswIndex`]. Obtained from [`HnswIndex::builder`].
#[derive(Debug, Clone)]
pub struct HnswBuilder<Id, V, F, O = NaturalOrder> {
    dimensions: usize,
    distance: F,
    ordering: O,
    config: HnswConfig,
    _marker: PhantomData<fn() -> (Id, V)>,
}

impl<Id, V, F, O> HnswBuilder<Id, V, F, O> {
    /// Links per node on upper layers; layer 0 keeps `2 * m`.
    pub fn m(mut self, m: usize) -> Self {
        self.config.m = m;
        self.config.m_max0 = m.saturating_mul(2);
        self
    }

    pub fn ef(mut self, ef: usize) -> Self {
        self.config.ef = ef;
        self
    }

    pub fn ef_construction(mut self, ef_construction: usize) -> Self {
        self.config.ef_construction = ef_construction;
        self
    }

    pub fn remove_enabled(mut self, remove_enabled: bool) -> Self {
        self.config.remove_enabled = remove_enabled;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Replaces the distance ordering, e.g. with [`ReverseOrder`](crate::ReverseOrder)
    /// for similarity scores.
    pub fn ordering<O2>(self, ordering: O2) -> HnswBuilder<Id, V, F, O2> {
        HnswBuilder {
            dimensions: self.dimensions,
            distance: self.distance,
            ordering,
            config: self.config,
            _marker: PhantomData,
        }
    }

    /// Validates the parameters and creates an empty index.
    pub fn build(self) -> Result<HnswIndex<Id, V, F, O>>
    where
        Id: ItemId,
        V: Vector,
        F: DistanceFunction<V>,
        O: DistanceOrdering<F::Distance>,
    {
        HnswIndex::new(self.dimensions, self.distance, self.ordering, self.config)
    }
}

impl<Id, V, F> HnswIndex<Id, V, F, NaturalOrder> {
    /// Starts building an index with default parameters and natural ordering.
    pub fn builder(dimensions: usize, distance: F, max_item_count: usize) -> HnswBuilder<Id, V, F> {
        HnswBuilder {
            dimensions,
            distance,
            ordering: NaturalOrder,
            config: HnswConfig {
                max_item_count,
                ..HnswConfig::default()
            },
            _marker: PhantomData,
        }
    }
}

impl<Id, V, F, O> HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    /// Creates a new empty index.
    pub fn new(dimensions: usize, distance: F, ordering: O, config: HnswConfig) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration("dimensions must be positive".into()));
        }
        config.validate()?;
        Ok(Self {
            config,
            dimensions,
            distance,
            ordering,
            items: Vec::new(),
            neighbors: Vec::new(),
            inbound: Vec::new(),
            layers: Vec::new(),
            deleted: Vec::new(),
            id_to_internal: HashMap::new(),
            entry_point: None,
            max_layer: 0,
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn m(&self) -> usize {
        self.config.m
    }

    pub fn ef(&self) -> usize {
        self.config.ef
    }

    pub fn ef_construction(&self) -> usize {
        self.config.ef_construction
    }

    pub fn max_item_count(&self) -> usize {
        self.config.max_item_count
    }

    pub fn remove_enabled(&self) -> bool {
        self.config.remove_enabled
    }

    pub fn distance_function(&self) -> &F {
        &self.distance
    }

    pub fn distance_ordering(&self) -> &O {
        &self.ordering
    }

    /// Changes the capacity bound. Fails if it would be below the live item count.
    pub fn resize(&mut self, max_item_count: usize) -> Result<()> {
        let live = self.id_to_internal.len();
        if max_item_count == 0 || max_item_count < live {
            return Err(Error::Configuration(format!(
                "cannot resize to {max_item_count}: index holds {live} items"
            )));
        }
        self.config.max_item_count = max_item_count;
        Ok(())
    }

    /// Live items in internal-id order.
    pub(crate) fn live_items(&self) -> impl Iterator<Item = &Item<Id, V>> {
        self.items
            .iter()
            .zip(&self.deleted)
            .filter(|(_, deleted)| !**deleted)
            .map(|(item, _)| item)
    }

    /// Draws the level of node `internal_id` from an exponential distribution.
    /// Seeded per node, so identical insertion sequences build identical graphs.
    pub(crate) fn level_for(&self, internal_id: u32) -> usize {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(internal_id as u64));
        let r: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let ml = 1.0 / (self.config.m.max(2) as f64).ln();
        let level = (-r.ln() * ml).floor() as usize;
        level.min(config::HNSW_MAX_LAYERS - 1)
    }

    #[inline]
    pub(crate) fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    #[inline]
    pub(crate) fn distance_to(&self, query: &V, node: u32) -> F::Distance {
        self.distance.distance(query, self.items[node as usize].vector())
    }

    /// Orders `(distance, node)` pairs closest first, ties by internal id.
    #[inline]
    pub(crate) fn compare(&self, a: &(F::Distance, u32), b: &(F::Distance, u32)) -> Ordering {
        self.ordering.compare(&a.0, &b.0).then(a.1.cmp(&b.1))
    }

    /// Replaces the out-links of `node` at `layer`, keeping reverse edges in sync.
    pub(crate) fn set_links(&mut self, node: u32, layer: usize, links: Vec<u32>) {
        if self.config.remove_enabled {
            let old = std::mem::take(&mut self.neighbors[node as usize][layer]);
            for &target in old.iter().filter(|t| !links.contains(t)) {
                self.inbound[target as usize][layer].retain(|&src| src != node);
            }
            for &target in links.iter().filter(|t| !old.contains(t)) {
                self.inbound[target as usize][layer].push(node);
            }
        }
        self.neighbors[node as usize][layer] = links;
    }

    pub(crate) fn check_dimensions(&self, vector: &V) -> Result<()> {
        let actual = vector.dimensions();
        if actual != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }

    /// Validate internal invariants after deserialization.
    ///
    /// Checks that all parallel arrays have consistent lengths, that the id map
    /// and tombstones agree, that entry point, neighbor and inbound ids are in
    /// bounds, and that inbound lists mirror the out-links.
    /// Fails with [`Error::Corrupt`] naming the first violation.
    pub fn validate(&self) -> Result<()> {
        self.check_consistency().map_err(Error::Corrupt)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        self.config.validate().map_err(|e| e.to_string())?;
        if self.dimensions == 0 {
            return Err("dimensions must be positive".into());
        }

        let nc = self.items.len();
        if nc > u32::MAX as usize {
            return Err(format!("node count {nc} exceeds u32 range"));
        }
        for (name, len) in [
            ("neighbors", self.neighbors.len()),
            ("layers", self.layers.len()),
            ("deleted", self.deleted.len()),
        ] {
            if len != nc {
                return Err(format!("{name} length {len} != node count {nc}"));
            }
        }
        let expected_inbound = if self.config.remove_enabled { nc } else { 0 };
        if self.inbound.len() != expected_inbound {
            return Err(format!(
                "inbound length {} != expected {}",
                self.inbound.len(),
                expected_inbound
            ));
        }

        for node in 0..nc {
            let level = self.layers[node] as usize;
            if level >= config::HNSW_MAX_LAYERS {
                return Err(format!("node {node} level {level} out of range"));
            }
            if self.neighbors[node].len() != level + 1 {
                return Err(format!(
                    "node {node} has {} layers, expected {}",
                    self.neighbors[node].len(),
                    level + 1
                ));
            }
            if self.config.remove_enabled && self.inbound[node].len() != level + 1 {
                return Err(format!("node {node} inbound layers mismatch"));
            }
            let dims = self.items[node].vector().dimensions();
            if dims != self.dimensions {
                return Err(format!(
                    "node {node} has {dims} dimensions, expected {}",
                    self.dimensions
                ));
            }
            for (layer, links) in self.neighbors[node].iter().enumerate() {
                for &target in links {
                    let t = target as usize;
                    if t >= nc {
                        return Err(format!("node {node} links to out-of-bounds node {t}"));
                    }
                    if (self.layers[t] as usize) < layer {
                        return Err(format!(
                            "node {node} links to node {t} above its level at layer {layer}"
                        ));
                    }
                }
            }
        }

        if self.config.remove_enabled {
            for node in 0..nc {
                for (layer, sources) in self.inbound[node].iter().enumerate() {
                    for &src in sources {
                        let s = src as usize;
                        if s >= nc || self.neighbors[s].len() <= layer {
                            return Err(format!(
                                "node {node} has invalid inbound node {s} at layer {layer}"
                            ));
                        }
                        if !self.neighbors[s][layer].contains(&(node as u32)) {
                            return Err(format!(
                                "inbound edge {s} -> {node} at layer {layer} has no out-link"
                            ));
                        }
                    }
                }
                for (layer, links) in self.neighbors[node].iter().enumerate() {
                    for &target in links {
                        if !self.inbound[target as usize][layer].contains(&(node as u32)) {
                            return Err(format!(
                                "out-link {node} -> {target} at layer {layer} has no inbound edge"
                            ));
                        }
                    }
                }
            }
        }

        let live = self.deleted.iter().filter(|&&d| !d).count();
        if live != self.id_to_internal.len() {
            return Err(format!(
                "{} mapped ids but {live} live nodes",
                self.id_to_internal.len()
            ));
        }
        for (id, &node) in &self.id_to_internal {
            let n = node as usize;
            if n >= nc || self.deleted[n] || self.items[n].id() != id {
                return Err(format!("id {id:?} maps to invalid node {node}"));
            }
        }

        match self.entry_point {
            Some(ep) => {
                let ep = ep as usize;
                if ep >= nc {
                    return Err(format!("entry point {ep} out of bounds (node count {nc})"));
                }
                if self.layers[ep] as usize != self.max_layer {
                    return Err(format!(
                        "entry point level {} != max layer {}",
                        self.layers[ep], self.max_layer
                    ));
                }
            }
            None if live > 0 => return Err("missing entry point".into()),
            None => {}
        }
        Ok(())
    }
}

impl<Id, V, F, O> SearchIndex<Id, V, F::Distance> for HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    fn find_nearest(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, F::Distance>>> {
        self.find_nearest_with_ef(query, k, self.config.ef)
    }

    fn get(&self, id: &Id) -> Option<&Item<Id, V>> {
        self.id_to_internal
            .get(id)
            .map(|&node| &self.items[node as usize])
    }

    fn len(&self) -> usize {
        self.id_to_internal.len()
    }

    fn items(&self) -> Vec<&Item<Id, V>> {
        self.live_items().collect()
    }
}

impl<Id, V, F, O> Index<Id, V, F::Distance> for HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V> + Serialize + DeserializeOwned,
    O: DistanceOrdering<F::Distance> + Serialize + DeserializeOwned,
{
    type Exact<'a>
        = ExactView<'a, Id, V, F, O>
    where
        Self: 'a;

    fn add(&mut self, item: Item<Id, V>) -> Result<bool> {
        HnswIndex::add(self, item)
    }

    fn remove(&mut self, id: &Id, version: u64) -> Result<bool> {
        HnswIndex::remove(self, id, version)
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        persistence::write_snapshot(self, writer)?;
        tracing::info!(
            "Saved HNSW index ({} items, {} nodes, max layer {})",
            self.id_to_internal.len(),
            self.items.len(),
            self.max_layer
        );
        Ok(())
    }

    fn load(reader: &mut dyn Read) -> Result<Self> {
        let index: Self = persistence::read_snapshot(reader)?;
        index.validate()?;
        tracing::info!(
            "Loaded HNSW index ({} items, {} dimensions)",
            index.id_to_internal.len(),
            index.dimensions
        );
        Ok(index)
    }

    fn as_exact_index(&self) -> ExactView<'_, Id, V, F, O> {
        ExactView::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceMetric, ReverseOrder};

    type TestIndex = HnswIndex<u32, Vec<f32>, DistanceMetric>;

    #[test]
    fn test_default_config() {
        let config = HnswConfig::default();
        assert_eq!(config.m, 10);
        assert_eq!(config.m_max0, 20);
        assert_eq!(config.ef, 10);
        assert_eq!(config.ef_construction, 200);
        assert!(!config.remove_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_parameters() {
        for builder in [
            TestIndex::builder(3, DistanceMetric::Euclidean, 0),
            TestIndex::builder(3, DistanceMetric::Euclidean, 10).m(0),
            TestIndex::builder(3, DistanceMetric::Euclidean, 10).ef(0),
            TestIndex::builder(3, DistanceMetric::Euclidean, 10).ef_construction(0),
            TestIndex::builder(0, DistanceMetric::Euclidean, 10),
        ] {
            let err = builder.build().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "got {err:?}");
        }
    }

    #[test]
    fn test_builder_getters() {
        let index: TestIndex = HnswIndex::builder(4, DistanceMetric::Cosine, 50)
            .m(16)
            .ef(32)
            .ef_construction(100)
            .remove_enabled(true)
            .build()
            .unwrap();
        assert_eq!(index.m(), 16);
        assert_eq!(index.config().m_max0, 32);
        assert_eq!(index.ef(), 32);
        assert_eq!(index.ef_construction(), 100);
        assert_eq!(index.max_item_count(), 50);
        assert!(index.remove_enabled());
        assert_eq!(index.dimensions(), 4);
        assert!(index.is_empty());
    }

    #[test]
    fn test_builder_with_reverse_order() {
        let index: HnswIndex<u32, Vec<f32>, DistanceMetric, ReverseOrder> =
            HnswIndex::builder(2, DistanceMetric::InnerProduct, 10)
                .ordering(ReverseOrder)
                .build()
                .unwrap();
        assert_eq!(*index.distance_ordering(), ReverseOrder);
    }

    #[test]
    fn test_level_assignment_is_reproducible() {
        let a: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 10)
            .build()
            .unwrap();
        let b: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 10)
            .build()
            .unwrap();
        let levels_a: Vec<usize> = (0..1000).map(|i| a.level_for(i)).collect();
        let levels_b: Vec<usize> = (0..1000).map(|i| b.level_for(i)).collect();
        assert_eq!(levels_a, levels_b);
        assert!(levels_a.iter().all(|&l| l < config::HNSW_MAX_LAYERS));
        // With m = 10 roughly 90% of nodes stay on layer 0.
        let ground = levels_a.iter().filter(|&&l| l == 0).count();
        assert!(ground > 800, "only {ground} nodes on layer 0");
    }

    #[test]
    fn test_resize() {
        let mut index: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 2)
            .build()
            .unwrap();
        index.add(Item::new(1, vec![0.0, 0.0])).unwrap();
        index.add(Item::new(2, vec![1.0, 0.0])).unwrap();
        assert!(matches!(
            index.add(Item::new(3, vec![2.0, 0.0])),
            Err(Error::SizeLimitExceeded { capacity: 2 })
        ));
        assert!(index.resize(1).is_err());
        index.resize(3).unwrap();
        assert!(index.add(Item::new(3, vec![2.0, 0.0])).unwrap());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_validate_detects_bad_neighbor() {
        let mut index: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 10)
            .build()
            .unwrap();
        for i in 0..5u32 {
            index.add(Item::new(i, vec![i as f32, 0.0])).unwrap();
        }
        assert!(index.validate().is_ok());
        index.neighbors[0][0].push(99);
        assert!(matches!(
            index.validate(),
            Err(Error::Corrupt(msg)) if msg.contains("out-of-bounds")
        ));
    }

    #[test]
    fn test_load_rejects_tampered_inbound() {
        let mut index: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 20)
            .m(4)
            .remove_enabled(true)
            .build()
            .unwrap();
        for i in 0..12u32 {
            index.add(Item::new(i, vec![i as f32, (i % 3) as f32])).unwrap();
        }
        assert!(index.validate().is_ok());

        let mut out_of_bounds = index.clone();
        out_of_bounds.inbound[0][0].push(500);
        let mut buf = Vec::new();
        out_of_bounds.save(&mut buf).unwrap();
        assert!(matches!(
            TestIndex::load(&mut buf.as_slice()),
            Err(Error::Corrupt(_))
        ));

        // A source that does not link back is rejected too.
        let mut asymmetric = index.clone();
        let stranger = (0..12u32)
            .find(|&n| n != 1 && !asymmetric.neighbors[n as usize][0].contains(&1))
            .unwrap();
        asymmetric.inbound[1][0].push(stranger);
        assert!(matches!(asymmetric.validate(), Err(Error::Corrupt(_))));

        let mut missing = index.clone();
        let target = missing.neighbors[2][0][0] as usize;
        missing.inbound[target][0].retain(|&src| src != 2);
        assert!(matches!(missing.validate(), Err(Error::Corrupt(_))));
    }
}
