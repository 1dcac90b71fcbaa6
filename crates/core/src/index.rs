//! Index capability traits.
//!
//! [`SearchIndex`] is the read side every index and view answers.
//! [`Index`] adds mutation, persistence and the exact-search projection.
//! The evaluator and the query pipeline only see these traits, so any
//! compliant engine can be plugged in behind them.

use crate::config;
use crate::error::{Error, Result};
use crate::item::{Item, Neighbor};
use crate::persistence;
use std::io::{Read, Write};
use std::path::Path;

/// Read-only k-NN contract.
///
/// Implementations must be safe to query from many threads at once.
pub trait SearchIndex<Id, V, D>: Send + Sync {
    /// Returns up to `k` neighbors of `query`, closest first under the index's
    /// distance ordering, ties broken by id.
    ///
    /// Fails with [`Error::InvalidArgument`](crate::Error::InvalidArgument) if `k == 0`.
    fn find_nearest(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, D>>>;

    /// Returns the stored item with this id, if any.
    fn get(&self, id: &Id) -> Option<&Item<Id, V>>;

    /// Number of live items.
    fn len(&self) -> usize;

    /// All live items, in no particular order.
    fn items(&self) -> Vec<&Item<Id, V>>;

    fn contains(&self, id: &Id) -> bool {
        self.get(id).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest neighbors of a stored item, excluding the item itself.
    /// Empty if the id is not present. Fails like [`find_nearest`](Self::find_nearest)
    /// if `k == 0`.
    fn find_neighbors(&self, id: &Id, k: usize) -> Result<Vec<Neighbor<Id, D>>>
    where
        Id: PartialEq,
    {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".into()));
        }
        let Some(item) = self.get(id) else {
            return Ok(Vec::new());
        };
        let mut neighbors = self.find_nearest(item.vector(), k.saturating_add(1))?;
        neighbors.retain(|n| *n.id() != *id);
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// References to an index answer queries like the index itself.
impl<Id, V, D, T> SearchIndex<Id, V, D> for &T
where
    T: SearchIndex<Id, V, D> + ?Sized,
{
    fn find_nearest(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, D>>> {
        (**self).find_nearest(query, k)
    }

    fn get(&self, id: &Id) -> Option<&Item<Id, V>> {
        (**self).get(id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn items(&self) -> Vec<&Item<Id, V>> {
        (**self).items()
    }
}

/// Full index contract: mutation, persistence and an exact-search view.
///
/// Mutation takes `&mut self`; mixing mutation and queries across threads
/// goes through [`SharedIndex`](crate::SharedIndex) or another external lock.
pub trait Index<Id, V, D>: SearchIndex<Id, V, D> {
    /// Brute-force view over the same items, distance function and ordering.
    type Exact<'a>: SearchIndex<Id, V, D>
    where
        Self: 'a;

    /// Inserts or replaces an item by id.
    ///
    /// Returns `false` (and changes nothing) if the stored item has a newer version.
    fn add(&mut self, item: Item<Id, V>) -> Result<bool>;

    /// Removes the item with this id unless the stored version is newer than `version`.
    /// Returns whether an item was removed.
    fn remove(&mut self, id: &Id, version: u64) -> Result<bool>;

    /// Writes the full index state to `writer`.
    fn save(&self, writer: &mut dyn Write) -> Result<()>;

    /// Restores an index written by [`Index::save`]. All-or-nothing.
    fn load(reader: &mut dyn Read) -> Result<Self>
    where
        Self: Sized;

    /// Returns the exact-search projection. O(n) per query.
    fn as_exact_index(&self) -> Self::Exact<'_>;

    /// Adds every item, stopping at the first failure.
    fn add_all<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = Item<Id, V>>,
        Self: Sized,
    {
        self.add_all_with_progress(items, |_, _| {})
    }

    /// Adds every item, reporting `(done, total)` to `listener` every
    /// [`PROGRESS_UPDATE_INTERVAL`](config::PROGRESS_UPDATE_INTERVAL) items and once at the end.
    fn add_all_with_progress<I, L>(&mut self, items: I, mut listener: L) -> Result<()>
    where
        I: IntoIterator<Item = Item<Id, V>>,
        L: FnMut(usize, usize),
        Self: Sized,
    {
        add_with_progress(self, items, config::PROGRESS_UPDATE_INTERVAL, &mut listener)
    }

    /// Saves atomically to `path` (temp file + rename).
    fn save_to_path(&self, path: &Path) -> Result<()> {
        persistence::write_atomic(path, |w| self.save(w))
    }

    /// Loads an index previously written with [`Index::save_to_path`].
    fn load_from_path(path: &Path) -> Result<Self>
    where
        Self: Sized,
    {
        let mut reader = persistence::open(path)?;
        Self::load(&mut reader)
    }
}

/// Adds `items` one by one, calling `listener(done, total)` after every
/// `interval` items and once at the end (`(0, 0)` for empty input).
fn add_with_progress<T, Id, V, D, I, L>(
    index: &mut T,
    items: I,
    interval: usize,
    listener: &mut L,
) -> Result<()>
where
    T: Index<Id, V, D> + ?Sized,
    I: IntoIterator<Item = Item<Id, V>>,
    L: FnMut(usize, usize),
{
    let items: Vec<Item<Id, V>> = items.into_iter().collect();
    let total = items.len();
    for (i, item) in items.into_iter().enumerate() {
        index.add(item)?;
        let done = i + 1;
        if done % interval == 0 && done != total {
            listener(done, total);
        }
    }
    listener(total, total);
    Ok(())
}
