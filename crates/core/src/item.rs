//! Item and neighbor value types.
//!
//! An [`Item`] is what callers insert: an id, an opaque vector and a version.
//! A [`Neighbor`] is what queries return: an id and its distance to the query.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Bound alias for item identifiers: unique, hashable, comparable, serializable.
pub trait ItemId:
    Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + for<'de> Deserialize<'de>
{
}

impl<T> ItemId for T where
    T: Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + for<'de> Deserialize<'de>
{
}

/// Bound alias for vector payloads stored by an index.
///
/// `PartialEq` lets an update with an unchanged vector skip re-linking.
pub trait Vector:
    Clone + PartialEq + Dimensions + Send + Sync + Serialize + for<'de> Deserialize<'de>
{
}

impl<T> Vector for T where
    T: Clone + PartialEq + Dimensions + Send + Sync + Serialize + for<'de> Deserialize<'de>
{
}

/// Vectors must report their dimensionality so indices can reject mismatches.
pub trait Dimensions {
    /// Number of components.
    fn dimensions(&self) -> usize;
}

impl<T> Dimensions for Vec<T> {
    fn dimensions(&self) -> usize {
        self.len()
    }
}

impl<T> Dimensions for [T] {
    fn dimensions(&self) -> usize {
        self.len()
    }
}

/// An immutable `(id, vector)` pair with a version used to resolve concurrent updates.
///
/// Re-adding an id with a lower version than the stored one is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item<Id, V> {
    id: Id,
    vector: V,
    version: u64,
}

impl<Id, V> Item<Id, V> {
    /// Creates an item with version 0.
    pub fn new(id: Id, vector: V) -> Self {
        Self {
            id,
            vector,
            version: 0,
        }
    }

    /// Creates an item with an explicit version.
    pub fn with_version(id: Id, vector: V, version: u64) -> Self {
        Self {
            id,
            vector,
            version,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn vector(&self) -> &V {
        &self.vector
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Consumes the item, returning its parts.
    pub fn into_parts(self) -> (Id, V, u64) {
        (self.id, self.vector, self.version)
    }
}

/// A single query result: the id of a stored item and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor<Id, D> {
    id: Id,
    distance: D,
}

impl<Id, D> Neighbor<Id, D> {
    pub fn new(id: Id, distance: D) -> Self {
        Self { id, distance }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }
}

impl<Id, D: Copy> Neighbor<Id, D> {
    pub fn distance(&self) -> D {
        self.distance
    }
}
