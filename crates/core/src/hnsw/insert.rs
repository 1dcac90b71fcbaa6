//! HNSW insertion algorithm.
//!
//! Inserts an item into the HNSW graph with bidirectional connections and
//! heuristic neighbor pruning (Algorithm 4 from the HNSW paper). Re-adding an
//! existing id relinks that id's node at its new position.

use crate::distance::{DistanceFunction, DistanceOrdering};
use crate::error::{Error, Result};
use crate::hnsw::graph::HnswIndex;
use crate::hnsw::visited::with_visited;
use crate::item::{Item, ItemId, Vector};
use std::cmp::Ordering;

impl<Id, V, F, O> HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    /// Inserts or replaces an item by id.
    ///
    /// Returns `Ok(false)` without changes if the stored item has a newer version.
    /// An update with an identical vector swaps the item in place. Any other
    /// update reuses the id's node: its out-links are dropped (and, with
    /// `remove_enabled`, its inbound neighbors repaired) before it is linked
    /// again at the new position. The node count therefore never exceeds the
    /// number of distinct ids added, and `max_item_count` bounds both.
    pub fn add(&mut self, item: Item<Id, V>) -> Result<bool> {
        self.check_dimensions(item.vector())?;

        if let Some(&node) = self.id_to_internal.get(item.id()) {
            let stored = &self.items[node as usize];
            if stored.version() > item.version() {
                tracing::debug!(
                    "Ignoring stale update for {:?} (version {} < {})",
                    item.id(),
                    item.version(),
                    stored.version()
                );
                return Ok(false);
            }
            if stored.vector() == item.vector() {
                self.items[node as usize] = item;
            } else {
                self.replace_node(node, item);
            }
            return Ok(true);
        }

        if self.id_to_internal.len() >= self.config.max_item_count {
            return Err(Error::SizeLimitExceeded {
                capacity: self.config.max_item_count,
            });
        }
        if self.items.len() >= u32::MAX as usize {
            return Err(Error::SizeLimitExceeded {
                capacity: u32::MAX as usize,
            });
        }
        self.insert_node(item);
        Ok(true)
    }

    /// Appends a node for `item` and links it into every layer up to its level.
    fn insert_node(&mut self, item: Item<Id, V>) {
        let internal_id = self.items.len() as u32;
        let level = self.level_for(internal_id);

        self.id_to_internal.insert(item.id().clone(), internal_id);
        self.items.push(item);
        self.neighbors.push(vec![Vec::new(); level + 1]);
        if self.config.remove_enabled {
            self.inbound.push(vec![Vec::new(); level + 1]);
        }
        self.layers.push(level as u8);
        self.deleted.push(false);

        self.link_node(internal_id);
    }

    /// Moves `node` to the vector of `item`, keeping its id mapping and level.
    fn replace_node(&mut self, node: u32, item: Item<Id, V>) {
        let n = node as usize;
        // Hidden while detached so it cannot be picked as entry point
        self.deleted[n] = true;
        if self.config.remove_enabled {
            self.unlink(node);
        } else {
            // Edges still pointing here stay valid: they lead to a live node
            for layer in 0..=self.layers[n] as usize {
                self.set_links(node, layer, Vec::new());
            }
        }
        if self.entry_point == Some(node) {
            self.repick_entry_point();
        }
        self.items[n] = item;
        self.deleted[n] = false;
        self.link_node(node);
    }

    /// Connects a detached node to the graph on every layer up to its level.
    fn link_node(&mut self, node: u32) {
        let level = self.layers[node as usize] as usize;

        // First node (or first after every other node was removed)
        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_layer = level;
            return;
        };

        let top = level.min(self.max_layer);
        let query = self.items[node as usize].vector();
        let node_links: Vec<Vec<u32>> = with_visited(self.items.len(), |visited| {
            // Phase 1: greedily descend from the top layer to the node's level + 1
            let mut current_ep = entry_point;
            for layer in (level + 1..=self.max_layer).rev() {
                let results =
                    self.search_layer(query, std::slice::from_ref(&current_ep), 1, layer, visited, false);
                if let Some(&(_, nearest)) = results.first() {
                    current_ep = nearest;
                }
            }

            // Phase 2: beam search each layer and select neighbors for the node
            let mut links = vec![Vec::new(); level + 1];
            let mut layer_eps = vec![current_ep];
            for layer in (0..=top).rev() {
                let candidates: Vec<(F::Distance, u32)> = self
                    .search_layer(
                        query,
                        &layer_eps,
                        self.config.ef_construction,
                        layer,
                        visited,
                        true,
                    )
                    .into_iter()
                    .filter(|&(_, c)| c != node)
                    .collect();
                links[layer] = self.select_neighbors(&candidates, self.max_links(layer));
                if !candidates.is_empty() {
                    layer_eps = candidates.iter().map(|&(_, id)| id).collect();
                }
            }
            links
        });

        // Phase 3: add bidirectional connections and prune over-capacity neighbors
        for (layer, links) in node_links.into_iter().enumerate().take(top + 1) {
            let m_max = self.max_links(layer);
            self.set_links(node, layer, links.clone());
            for neighbor_id in links {
                let mut theirs = self.neighbors[neighbor_id as usize][layer].clone();
                if theirs.contains(&node) {
                    continue;
                }
                theirs.push(node);
                if theirs.len() > m_max {
                    let base = self.items[neighbor_id as usize].vector();
                    let scored: Vec<(F::Distance, u32)> = theirs
                        .iter()
                        .map(|&cid| (self.distance_to(base, cid), cid))
                        .collect();
                    theirs = self.select_neighbors(&scored, m_max);
                }
                self.set_links(neighbor_id, layer, theirs);
            }
        }

        // Update entry point if the node reaches a higher layer
        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node);
        }
    }

    /// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
    ///
    /// A candidate is selected only if it is no farther from the base node than
    /// from every already-selected neighbor. Remaining slots are filled with the
    /// closest unused candidates.
    pub(crate) fn select_neighbors(&self, candidates: &[(F::Distance, u32)], m: usize) -> Vec<u32> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| self.compare(a, b));

        let mut selected: Vec<u32> = Vec::with_capacity(m.min(sorted.len()));
        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            let candidate = self.items[cid as usize].vector();
            let is_diverse = selected.iter().all(|&sid| {
                let dist_to_selected = self.distance_to(candidate, sid);
                self.ordering.compare(&dist_to_base, &dist_to_selected) != Ordering::Greater
            });
            if is_diverse {
                selected.push(cid);
            }
        }

        if selected.len() < m {
            for &(_, cid) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !selected.contains(&cid) {
                    selected.push(cid);
                }
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use crate::distance::DistanceMetric;
    use crate::error::Error;
    use crate::hnsw::HnswIndex;
    use crate::index::SearchIndex;
    use crate::item::Item;

    type TestIndex = HnswIndex<u32, Vec<f32>, DistanceMetric>;

    fn index(remove_enabled: bool) -> TestIndex {
        HnswIndex::builder(2, DistanceMetric::Euclidean, 100)
            .m(4)
            .remove_enabled(remove_enabled)
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_insert_sets_entry_point() {
        let mut index = index(false);
        assert!(index.add(Item::new(7, vec![1.0, 1.0])).unwrap());
        assert_eq!(index.entry_point, Some(0));
        assert_eq!(index.len(), 1);
        assert!(index.contains(&7));
    }

    #[test]
    fn test_links_are_bounded_and_valid() {
        let mut index = index(true);
        for i in 0..60u32 {
            let x = (i % 8) as f32;
            let y = (i / 8) as f32;
            index.add(Item::new(i, vec![x, y])).unwrap();
        }
        for (node, layers) in index.neighbors.iter().enumerate() {
            for (layer, links) in layers.iter().enumerate() {
                assert!(links.len() <= index.max_links(layer));
                assert!(!links.contains(&(node as u32)), "self loop at node {node}");
            }
        }
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_inbound_mirrors_outbound() {
        let mut index = index(true);
        for i in 0..40u32 {
            index.add(Item::new(i, vec![i as f32, (i * 7 % 5) as f32])).unwrap();
        }
        for (node, layers) in index.neighbors.iter().enumerate() {
            for (layer, links) in layers.iter().enumerate() {
                for &target in links {
                    assert!(index.inbound[target as usize][layer].contains(&(node as u32)));
                }
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = index(false);
        let err = index.add(Item::new(1, vec![1.0, 2.0, 3.0])).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_stale_version_is_ignored() {
        let mut index = index(false);
        assert!(index.add(Item::with_version(1, vec![0.0, 0.0], 5)).unwrap());
        assert!(!index.add(Item::with_version(1, vec![9.0, 9.0], 4)).unwrap());
        assert_eq!(index.get(&1).unwrap().vector(), &vec![0.0, 0.0]);
    }

    #[test]
    fn test_same_vector_update_swaps_in_place() {
        let mut index = index(false);
        index.add(Item::new(1, vec![0.0, 0.0])).unwrap();
        index.add(Item::with_version(1, vec![0.0, 0.0], 2)).unwrap();
        assert_eq!(index.items.len(), 1);
        assert_eq!(index.get(&1).unwrap().version(), 2);
    }

    #[test]
    fn test_update_relinks_existing_node() {
        for remove_enabled in [false, true] {
            let mut index = index(remove_enabled);
            for i in 0..10u32 {
                index.add(Item::new(i, vec![i as f32, 0.0])).unwrap();
            }
            index.add(Item::new(3, vec![100.0, 100.0])).unwrap();
            assert_eq!(index.len(), 10);
            assert_eq!(index.items.len(), 10);
            assert!(index.deleted.iter().all(|&d| !d));

            let results = index.find_nearest(&vec![3.0, 0.0], 10).unwrap();
            let threes = results.iter().filter(|n| *n.id() == 3).count();
            assert!(threes <= 1);
            let far = index.find_nearest(&vec![100.0, 100.0], 1).unwrap();
            assert_eq!(*far[0].id(), 3);
            assert!(index.validate().is_ok());
        }
    }

    #[test]
    fn test_repeated_updates_keep_footprint() {
        for remove_enabled in [false, true] {
            let mut index: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 1)
                .remove_enabled(remove_enabled)
                .build()
                .unwrap();
            for step in 0..200u32 {
                let v = vec![step as f32, (step % 7) as f32];
                assert!(index.add(Item::with_version(7, v, step as u64)).unwrap());
            }
            assert_eq!(index.items.len(), 1);
            assert_eq!(index.entry_point, Some(0));
            let found = index.find_nearest(&vec![0.0, 0.0], 1).unwrap();
            assert_eq!(*found[0].id(), 7);
            assert_eq!(index.get(&7).unwrap().vector(), &vec![199.0, 3.0]);
            assert!(matches!(
                index.add(Item::new(8, vec![0.0, 0.0])),
                Err(Error::SizeLimitExceeded { capacity: 1 })
            ));
        }
    }

    #[test]
    fn test_updating_entry_point_keeps_graph_navigable() {
        for remove_enabled in [false, true] {
            let mut index = index(remove_enabled);
            for i in 0..40u32 {
                index.add(Item::new(i, vec![(i % 8) as f32, (i / 8) as f32])).unwrap();
            }
            for round in 0..3 {
                let ep = index.entry_point.unwrap();
                let id = *index.items[ep as usize].id();
                let target = vec![50.0 + round as f32, 50.0];
                index.add(Item::new(id, target.clone())).unwrap();

                assert_eq!(index.items.len(), 40);
                assert!(index.validate().is_ok());
                let found = index.find_nearest(&target, 1).unwrap();
                assert_eq!(*found[0].id(), id);
                assert_eq!(index.find_nearest(&vec![3.0, 2.0], 5).unwrap().len(), 5);
            }
        }
    }

    #[test]
    fn test_update_does_not_count_against_capacity() {
        let mut index: TestIndex = HnswIndex::builder(2, DistanceMetric::Euclidean, 2)
            .build()
            .unwrap();
        index.add(Item::new(1, vec![0.0, 0.0])).unwrap();
        index.add(Item::new(2, vec![1.0, 0.0])).unwrap();
        assert!(index.add(Item::new(2, vec![5.0, 5.0])).unwrap());
        assert!(index.add(Item::new(3, vec![2.0, 0.0])).is_err());
    }

    #[test]
    fn test_select_neighbors_prefers_diverse() {
        let mut index = index(false);
        // Base at the origin: two close points on the same side and one on the other side.
        index.add(Item::new(0, vec![0.0, 0.0])).unwrap();
        index.add(Item::new(1, vec![1.0, 0.0])).unwrap();
        index.add(Item::new(2, vec![1.1, 0.0])).unwrap();
        index.add(Item::new(3, vec![-1.5, 0.0])).unwrap();
        let base = vec![0.0f32, 0.0];
        let scored: Vec<(f32, u32)> = (1..4).map(|n| (index.distance_to(&base, n), n)).collect();
        let selected = index.select_neighbors(&scored, 2);
        assert_eq!(selected, vec![1, 3]);

        // Leftover slots are filled with the closest unused candidates.
        let selected = index.select_neighbors(&scored, 3);
        assert_eq!(selected, vec![1, 3, 2]);
    }
}
