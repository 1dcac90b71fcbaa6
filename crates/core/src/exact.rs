//! Exact (brute-force) k-NN search.
//!
//! [`BruteForceIndex`] is a standalone index answering every query by a full
//! scan. [`ExactView`] is the same scan over a borrowed [`HnswIndex`], used as
//! ground truth when measuring the graph's recall. Both are O(n) per query.

use crate::distance::{DistanceFunction, DistanceOrdering, NaturalOrder};
use crate::error::{Error, Result};
use crate::hnsw::HnswIndex;
use crate::index::{Index, SearchIndex};
use crate::item::{Dimensions, Item, ItemId, Neighbor, Vector};
use crate::persistence;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Scores every item against `query` and returns the `k` closest, ties broken by id.
pub(crate) fn exact_search<'a, Id, V, F, O>(
    items: impl IntoIterator<Item = &'a Item<Id, V>>,
    distance: &F,
    ordering: &O,
    query: &V,
    k: usize,
) -> Vec<Neighbor<Id, F::Distance>>
where
    Id: ItemId + 'a,
    V: 'a,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    let mut scored: Vec<(F::Distance, &Item<Id, V>)> = items
        .into_iter()
        .map(|item| (distance.distance(query, item.vector()), item))
        .collect();

    let cmp = |a: &(F::Distance, &Item<Id, V>), b: &(F::Distance, &Item<Id, V>)| -> Ordering {
        ordering
            .compare(&a.0, &b.0)
            .then_with(|| a.1.id().cmp(b.1.id()))
    };
    if k > 0 && scored.len() > k {
        scored.select_nth_unstable_by(k - 1, |a, b| cmp(a, b));
        scored.truncate(k);
    }
    scored.sort_by(|a, b| cmp(a, b));

    scored
        .into_iter()
        .map(|(d, item)| Neighbor::new(item.id().clone(), d))
        .collect()
}

fn check_query<V: Dimensions>(dimensions: usize, query: &V, k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidArgument("k must be positive".into()));
    }
    let actual = query.dimensions();
    if actual != dimensions {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual,
        });
    }
    Ok(())
}

/// Read-only exhaustive view over the live items of an [`HnswIndex`].
///
/// Uses the index's distance function and ordering, so its answers are the
/// ground truth the graph approximates.
#[derive(Debug)]
pub struct ExactView<'a, Id, V, F, O = NaturalOrder> {
    index: &'a HnswIndex<Id, V, F, O>,
}

impl<'a, Id, V, F, O> Clone for ExactView<'a, Id, V, F, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, Id, V, F, O> Copy for ExactView<'a, Id, V, F, O> {}

impl<'a, Id, V, F, O> ExactView<'a, Id, V, F, O> {
    pub fn new(index: &'a HnswIndex<Id, V, F, O>) -> Self {
        Self { index }
    }
}

impl<'a, Id, V, F, O> SearchIndex<Id, V, F::Distance> for ExactView<'a, Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    fn find_nearest(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, F::Distance>>> {
        check_query(self.index.dimensions(), query, k)?;
        Ok(exact_search(
            self.index.live_items(),
            self.index.distance_function(),
            self.index.distance_ordering(),
            query,
            k,
        ))
    }

    fn get(&self, id: &Id) -> Option<&Item<Id, V>> {
        self.index.get(id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn items(&self) -> Vec<&Item<Id, V>> {
        self.index.items()
    }
}

/// Brute-force index: stores items in id order and scans them all on every query.
///
/// Removal is always supported. Useful as a baseline and for small collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "Id: Serialize, V: Serialize, F: Serialize, O: Serialize",
    deserialize = "Id: Deserialize<'de> + Ord, V: Deserialize<'de>, F: Deserialize<'de>, \
                   O: Deserialize<'de>"
))]
pub struct BruteForceIndex<Id, V, F, O = NaturalOrder> {
    dimensions: usize,
    max_item_count: usize,
    distance: F,
    ordering: O,
    items: BTreeMap<Id, Item<Id, V>>,
}

impl<Id, V, F, O> BruteForceIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    pub fn new(dimensions: usize, distance: F, ordering: O, max_item_count: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration("dimensions must be positive".into()));
        }
        if max_item_count == 0 {
            return Err(Error::Configuration(
                "max_item_count must be positive".into(),
            ));
        }
        Ok(Self {
            dimensions,
            max_item_count,
            distance,
            ordering,
            items: BTreeMap::new(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn max_item_count(&self) -> usize {
        self.max_item_count
    }

    pub fn add(&mut self, item: Item<Id, V>) -> Result<bool> {
        let actual = item.vector().dimensions();
        if actual != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        match self.items.get(item.id()) {
            Some(stored) if stored.version() > item.version() => return Ok(false),
            Some(_) => {}
            None if self.items.len() >= self.max_item_count => {
                return Err(Error::SizeLimitExceeded {
                    capacity: self.max_item_count,
                });
            }
            None => {}
        }
        self.items.insert(item.id().clone(), item);
        Ok(true)
    }

    pub fn remove(&mut self, id: &Id, version: u64) -> Result<bool> {
        match self.items.get(id) {
            Some(stored) if stored.version() <= version => {
                self.items.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.dimensions == 0 || self.max_item_count == 0 {
            return Err("dimensions and max_item_count must be positive".into());
        }
        if self.items.len() > self.max_item_count {
            return Err(format!(
                "{} items exceed capacity {}",
                self.items.len(),
                self.max_item_count
            ));
        }
        for (id, item) in &self.items {
            if item.id() != id {
                return Err(format!("key {id:?} holds item {:?}", item.id()));
            }
            if item.vector().dimensions() != self.dimensions {
                return Err(format!("item {id:?} has wrong dimensionality"));
            }
        }
        Ok(())
    }
}

impl<Id, V, F, O> SearchIndex<Id, V, F::Distance> for BruteForceIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    fn find_nearest(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, F::Distance>>> {
        check_query(self.dimensions, query, k)?;
        Ok(exact_search(
            self.items.values(),
            &self.distance,
            &self.ordering,
            query,
            k,
        ))
    }

    fn get(&self, id: &Id) -> Option<&Item<Id, V>> {
        self.items.get(id)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn items(&self) -> Vec<&Item<Id, V>> {
        self.items.values().collect()
    }
}

impl<Id, V, F, O> Index<Id, V, F::Distance> for BruteForceIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V> + Serialize + DeserializeOwned,
    O: DistanceOrdering<F::Distance> + Serialize + DeserializeOwned,
{
    type Exact<'a>
        = &'a Self
    where
        Self: 'a;

    fn add(&mut self, item: Item<Id, V>) -> Result<bool> {
        BruteForceIndex::add(self, item)
    }

    fn remove(&mut self, id: &Id, version: u64) -> Result<bool> {
        BruteForceIndex::remove(self, id, version)
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        persistence::write_snapshot(self, writer)?;
        tracing::info!("Saved brute-force index ({} items)", self.items.len());
        Ok(())
    }

    fn load(reader: &mut dyn Read) -> Result<Self> {
        let index: Self = persistence::read_snapshot(reader)?;
        index
            .validate()
            .map_err(|e| Error::Corrupt(format!("snapshot validation failed: {e}")))?;
        tracing::info!("Loaded brute-force index ({} items)", index.items.len());
        Ok(index)
    }

    fn as_exact_index(&self) -> &Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceMetric, ReverseOrder};

    type TestIndex = BruteForceIndex<u32, Vec<f64>, DistanceMetric>;

    fn line(n: u32) -> TestIndex {
        let mut index = TestIndex::new(1, DistanceMetric::Euclidean, NaturalOrder, 100).unwrap();
        for i in 0..n {
            index.add(Item::new(i, vec![i as f64])).unwrap();
        }
        index
    }

    #[test]
    fn test_exact_nearest() {
        let index = line(10);
        let ids: Vec<u32> = index
            .find_nearest(&vec![4.2], 3)
            .unwrap()
            .iter()
            .map(|n| *n.id())
            .collect();
        assert_eq!(ids, vec![4, 5, 3]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let index = line(10);
        // 3 and 5 are equidistant from 4
        let ids: Vec<u32> = index
            .find_nearest(&vec![4.0], 3)
            .unwrap()
            .iter()
            .map(|n| *n.id())
            .collect();
        assert_eq!(ids, vec![4, 3, 5]);
    }

    #[test]
    fn test_repeated_queries_identical() {
        let index = line(50);
        let a = index.find_nearest(&vec![17.5], 10).unwrap();
        let b = index.find_nearest(&vec![17.5], 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reverse_order() {
        let mut index = BruteForceIndex::<u32, Vec<f64>, DistanceMetric, ReverseOrder>::new(
            1,
            DistanceMetric::Manhattan,
            ReverseOrder,
            10,
        )
        .unwrap();
        for i in 0..5u32 {
            index.add(Item::new(i, vec![i as f64])).unwrap();
        }
        let ids: Vec<u32> = index
            .find_nearest(&vec![0.0], 2)
            .unwrap()
            .iter()
            .map(|n| *n.id())
            .collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_remove_and_versions() {
        let mut index = line(5);
        assert!(index.remove(&2, 0).unwrap());
        assert!(!index.remove(&2, 0).unwrap());
        assert_eq!(index.len(), 4);

        index.add(Item::with_version(9, vec![9.0], 4)).unwrap();
        assert!(!index.add(Item::with_version(9, vec![1.0], 3)).unwrap());
        assert!(!index.remove(&9, 3).unwrap());
        assert!(index.remove(&9, 4).unwrap());
    }

    #[test]
    fn test_capacity_and_dimensions() {
        let mut index = TestIndex::new(2, DistanceMetric::Euclidean, NaturalOrder, 1).unwrap();
        index.add(Item::new(1, vec![0.0, 0.0])).unwrap();
        assert!(index.add(Item::new(1, vec![1.0, 0.0])).unwrap());
        assert!(matches!(
            index.add(Item::new(2, vec![0.0, 0.0])),
            Err(Error::SizeLimitExceeded { capacity: 1 })
        ));
        assert!(matches!(
            index.add(Item::new(3, vec![0.0])),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.find_nearest(&vec![0.0, 0.0], 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_find_neighbors_excludes_self() {
        let index = line(10);
        let ids: Vec<u32> = index
            .find_neighbors(&5, 2)
            .unwrap()
            .iter()
            .map(|n| *n.id())
            .collect();
        assert_eq!(ids, vec![4, 6]);
        assert!(index.find_neighbors(&42, 2).unwrap().is_empty());
    }

    #[test]
    fn test_save_load() {
        let index = line(20);
        let mut buf = Vec::new();
        index.save(&mut buf).unwrap();
        let restored = TestIndex::load(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.len(), 20);
        assert_eq!(
            restored.find_nearest(&vec![3.3], 4).unwrap(),
            index.find_nearest(&vec![3.3], 4).unwrap()
        );
    }

    #[test]
    fn test_exact_view_over_hnsw() {
        let mut hnsw: HnswIndex<u32, Vec<f64>, DistanceMetric> =
            HnswIndex::builder(1, DistanceMetric::Euclidean, 100)
                .build()
                .unwrap();
        for i in 0..30u32 {
            hnsw.add(Item::new(i, vec![i as f64])).unwrap();
        }
        hnsw.add(Item::new(10, vec![100.0])).unwrap();

        let view = hnsw.as_exact_index();
        assert_eq!(view.len(), 30);
        let ids: Vec<u32> = view
            .find_nearest(&vec![10.0], 3)
            .unwrap()
            .iter()
            .map(|n| *n.id())
            .collect();
        assert_eq!(ids, vec![9, 11, 8]);
    }
}
