//! Node removal.
//!
//! A removed node is tombstoned and unlinked: every node pointing at it drops
//! the edge and is re-linked through the selection heuristic, using the
//! removed node's own neighbors as extra candidates. Updates reuse the same
//! unlinking before relinking a node at its new position.

use crate::distance::{DistanceFunction, DistanceOrdering};
use crate::error::{Error, Result};
use crate::hnsw::graph::HnswIndex;
use crate::item::{ItemId, Vector};

impl<Id, V, F, O> HnswIndex<Id, V, F, O>
where
    Id: ItemId,
    V: Vector,
    F: DistanceFunction<V>,
    O: DistanceOrdering<F::Distance>,
{
    /// Removes the item with this id unless the stored version is newer than `version`.
    ///
    /// Fails with [`Error::UnsupportedOperation`] if the index was built without
    /// `remove_enabled`.
    pub fn remove(&mut self, id: &Id, version: u64) -> Result<bool> {
        if !self.config.remove_enabled {
            return Err(Error::UnsupportedOperation(
                "remove requires an index built with remove_enabled".into(),
            ));
        }
        let Some(&node) = self.id_to_internal.get(id) else {
            return Ok(false);
        };
        if self.items[node as usize].version() > version {
            return Ok(false);
        }
        self.retire(node);
        tracing::debug!("Removed {:?} (node {})", id, node);
        Ok(true)
    }

    /// Drops `node` from the live set and from the graph.
    fn retire(&mut self, node: u32) {
        let id = self.items[node as usize].id().clone();
        self.id_to_internal.remove(&id);
        self.deleted[node as usize] = true;

        self.unlink(node);
        if self.entry_point == Some(node) {
            self.repick_entry_point();
        }
    }

    /// Detaches `node` on every layer and repairs the nodes that pointed at it.
    /// Requires `remove_enabled`.
    pub(crate) fn unlink(&mut self, node: u32) {
        let n = node as usize;
        for layer in 0..=self.layers[n] as usize {
            let outbound = self.neighbors[n][layer].clone();
            let inbound = self.inbound[n][layer].clone();
            self.set_links(node, layer, Vec::new());

            let m_max = self.max_links(layer);
            for src in inbound {
                if src == node {
                    continue;
                }
                let mut pool: Vec<u32> = self.neighbors[src as usize][layer]
                    .iter()
                    .copied()
                    .filter(|&c| c != node)
                    .collect();
                for &c in &outbound {
                    if c != src && !self.deleted[c as usize] && !pool.contains(&c) {
                        pool.push(c);
                    }
                }
                let base = self.items[src as usize].vector();
                let scored: Vec<(F::Distance, u32)> = pool
                    .iter()
                    .map(|&cid| (self.distance_to(base, cid), cid))
                    .collect();
                let links = self.select_neighbors(&scored, m_max);
                self.set_links(src, layer, links);
            }
        }
    }

    /// Picks the live node with the highest level (lowest id on ties) as entry point.
    pub(crate) fn repick_entry_point(&mut self) {
        let best = (0..self.items.len())
            .filter(|&i| !self.deleted[i])
            .max_by(|&a, &b| self.layers[a].cmp(&self.layers[b]).then(b.cmp(&a)));
        match best {
            Some(node) => {
                self.entry_point = Some(node as u32);
                self.max_layer = self.layers[node] as usize;
            }
            None => {
                self.entry_point = None;
                self.max_layer = 0;
            }
        }
        tracing::debug!("Entry point moved to {:?}", self.entry_point);
    }
}
