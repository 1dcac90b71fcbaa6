//! Thread-safe handle over any index.
//!
//! Queries take the read lock and run concurrently; mutations take the write
//! lock and are serialized against everything else.

use crate::error::Result;
use crate::index::{Index, SearchIndex};
use crate::item::{Item, Neighbor};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Cloneable, shareable wrapper around an index, protected by a `RwLock`.
#[derive(Debug, Default)]
pub struct SharedIndex<I> {
    inner: Arc<RwLock<I>>,
}

impl<I> Clone for SharedIndex<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> SharedIndex<I> {
    pub fn new(index: I) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Acquires a read lock, e.g. to derive an exact view or run several queries.
    pub fn read(&self) -> RwLockReadGuard<'_, I> {
        self.inner.read()
    }

    /// Acquires the write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, I> {
        self.inner.write()
    }

    /// Returns the index if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<I, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }

    pub fn add<Id, V, D>(&self, item: Item<Id, V>) -> Result<bool>
    where
        I: Index<Id, V, D>,
    {
        self.inner.write().add(item)
    }

    pub fn remove<Id, V, D>(&self, id: &Id, version: u64) -> Result<bool>
    where
        I: Index<Id, V, D>,
    {
        self.inner.write().remove(id, version)
    }

    pub fn find_nearest<Id, V, D>(&self, query: &V, k: usize) -> Result<Vec<Neighbor<Id, D>>>
    where
        I: SearchIndex<Id, V, D>,
    {
        self.inner.read().find_nearest(query, k)
    }

    pub fn len<Id, V, D>(&self) -> usize
    where
        I: SearchIndex<Id, V, D>,
    {
        self.inner.read().len()
    }
}

impl<I> From<I> for SharedIndex<I> {
    fn from(index: I) -> Self {
        Self::new(index)
    }
}
