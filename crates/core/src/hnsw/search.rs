//! HNSW search algorithms: single-layer beam search and multi-layer KNN.
//!
//! Distances are compared through the index's [`DistanceOrdering`], so the
//! candidate and result queues are sorted vectors driven by that comparator
//! rather than heaps over a fixed float type. Tombstoned nodes are still used
//! for navigation but excluded from results.

use crate::distance::{DistanceFunction, DistanceOrdering};
use crate::error::{Error, Result};
use crate::hnsw::graph::HnswIndex;
use crate::hnsw::visited::{with_visited, VisitedSet};
use crate::item::{ItemId, Neighbor, Vector};
use std::cmp::Ordering;

impl<Id, V, F, O> HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    /// Search a single layer of the HNSW graph.
    ///
    /// Returns up to `ef` nodes closest to `query`, closest first. With
    /// `live_only` tombstoned nodes are traversed but not returned.
    /// `visited` is cleared at the start of each call.
    pub(crate) fn search_layer(
        &self,
        query: &V,
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        live_only: bool,
    ) -> Vec<(F::Distance, u32)> {
        visited.clear();
        let ef = ef.clamp(1, self.items.len().max(1));
        // Farthest first, so pop() yields the closest candidate
        let mut candidates: Vec<(F::Distance, u32)> = Vec::with_capacity(ef * 2);
        // Closest first, bounded by ef
        let mut results: Vec<(F::Distance, u32)> = Vec::with_capacity(ef + 1);

        for &ep in entry_points {
            if visited.insert(ep) {
                let scored = (self.distance_to(query, ep), ep);
                self.push_candidate(&mut candidates, scored);
                if !live_only || !self.deleted[ep as usize] {
                    self.push_result(&mut results, scored, ef);
                }
            }
        }

        while let Some(current) = candidates.pop() {
            // If the closest candidate is farther than the worst result, stop
            if results.len() >= ef {
                if let Some(worst) = results.last() {
                    if self.compare(&current, worst) == Ordering::Greater {
                        break;
                    }
                }
            }

            let Some(neighbor_list) = self.neighbors[current.1 as usize].get(layer) else {
                continue;
            };
            for &neighbor_id in neighbor_list {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let scored = (self.distance_to(query, neighbor_id), neighbor_id);
                let should_add = results.len() < ef
                    || results
                        .last()
                        .is_some_and(|worst| self.compare(&scored, worst) == Ordering::Less);
                if should_add {
                    self.push_candidate(&mut candidates, scored);
                    if !live_only || !self.deleted[neighbor_id as usize] {
                        self.push_result(&mut results, scored, ef);
                    }
                }
            }
        }
        results
    }

    #[inline]
    fn push_candidate(&self, candidates: &mut Vec<(F::Distance, u32)>, entry: (F::Distance, u32)) {
        let pos = candidates.partition_point(|e| self.compare(e, &entry) == Ordering::Greater);
        candidates.insert(pos, entry);
    }

    #[inline]
    fn push_result(&self, results: &mut Vec<(F::Distance, u32)>, entry: (F::Distance, u32), ef: usize) {
        let pos = results.partition_point(|e| self.compare(e, &entry) == Ordering::Less);
        if pos >= ef {
            return;
        }
        results.insert(pos, entry);
        if results.len() > ef {
            results.pop(); // remove worst
        }
    }

    /// Multi-layer KNN search with a per-call candidate list size.
    ///
    /// Uses `max(ef, k)` at layer 0, never more than the node count. If
    /// tombstones leave fewer than `k` live results, retries with a doubled
    /// list size up to four times the base.
    /// Results are sorted closest first, ties broken by id.
    pub fn find_nearest_with_ef(
        &self,
        query: &V,
        k: usize,
        ef: usize,
    ) -> Result<Vec<Neighbor<Id, F::Distance>>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".into()));
        }
        if ef == 0 {
            return Err(Error::InvalidArgument("ef must be positive".into()));
        }
        self.check_dimensions(query)?;

        let Some(entry_point) = self.entry_point else {
            return Ok(Vec::new());
        };

        let found = with_visited(self.items.len(), |visited| {
            let mut current_ep = entry_point;

            // Traverse from top layer down to layer 1 with ef = 1
            for layer in (1..=self.max_layer).rev() {
                let results =
                    self.search_layer(query, std::slice::from_ref(&current_ep), 1, layer, visited, false);
                if let Some(&(_, nearest)) = results.first() {
                    current_ep = nearest;
                }
            }

            let base_ef = ef.max(k).min(self.items.len());
            let max_ef = base_ef.saturating_mul(4).min(self.items.len());
            let mut ef = base_ef;
            loop {
                let results =
                    self.search_layer(query, std::slice::from_ref(&current_ep), ef, 0, visited, true);
                if results.len() >= k || ef >= max_ef {
                    break results;
                }
                ef = ef.saturating_mul(2).min(max_ef);
            }
        });

        let mut neighbors: Vec<Neighbor<Id, F::Distance>> = found
            .into_iter()
            .map(|(distance, node)| Neighbor::new(self.items[node as usize].id().clone(), distance))
            .collect();
        neighbors.sort_by(|a, b| {
            self.ordering
                .compare(&a.distance(), &b.distance())
                .then_with(|| a.id().cmp(b.id()))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }
}
