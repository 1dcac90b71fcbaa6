//! Distance functions and distance orderings.
//!
//! A [`DistanceFunction`] maps two vectors to a distance; a [`DistanceOrdering`]
//! decides which of two distances is "closer". Indices never assume the
//! natural numeric order: passing [`ReverseOrder`] turns any similarity
//! (larger = more alike) into a usable distance.
//!
//! [`DistanceMetric`] provides the dense metrics for `Vec<f32>` and `Vec<f64>`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Sub};

/// A pure function comparing two vectors.
///
/// Implementations must be deterministic: the same inputs always produce the
/// same distance, otherwise neither the exact view nor a restored index can
/// reproduce earlier results.
pub trait DistanceFunction<V: ?Sized>: Send + Sync {
    /// Distance type produced by this function.
    type Distance: Copy + PartialOrd + Debug + Send + Sync;

    fn distance(&self, a: &V, b: &V) -> Self::Distance;
}

/// A total order over distances. `Less` means "closer".
pub trait DistanceOrdering<D>: Send + Sync {
    fn compare(&self, a: &D, b: &D) -> Ordering;
}

/// Ascending order: smaller distance is closer. NaN sorts after every number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaturalOrder;

/// Descending order: larger value is closer. NaN still sorts last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseOrder;

#[inline]
fn is_nan<D: PartialOrd>(d: &D) -> bool {
    d.partial_cmp(d).is_none()
}

#[inline]
fn nan_last<D: PartialOrd>(a: &D, b: &D) -> Ordering {
    match (is_nan(a), is_nan(b)) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

impl<D: PartialOrd> DistanceOrdering<D> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &D, b: &D) -> Ordering {
        a.partial_cmp(b).unwrap_or_else(|| nan_last(a, b))
    }
}

impl<D: PartialOrd> DistanceOrdering<D> for ReverseOrder {
    #[inline]
    fn compare(&self, a: &D, b: &D) -> Ordering {
        match a.partial_cmp(b) {
            Some(o) => o.reverse(),
            None => nan_last(a, b),
        }
    }
}

/// Dense vector distance metrics.
///
/// All metrics return a distance where lower is more similar under
/// [`NaturalOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\]. A zero vector
    /// has similarity 0 to everything.
    #[default]
    Cosine,
    /// Inner product distance: `1 - dot(a, b)`. Meant for normalized vectors.
    InnerProduct,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Manhattan (L1) distance.
    Manhattan,
    /// Canberra distance. Components that are 0 in both vectors contribute nothing.
    Canberra,
    /// Bray-Curtis dissimilarity.
    BrayCurtis,
    /// Correlation distance: `1 - pearson(a, b)`.
    Correlation,
}

/// Float operations the metrics need, implemented for `f32` and `f64`.
pub trait Real:
    Copy
    + PartialOrd
    + Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Sum
{
    const ZERO: Self;
    const ONE: Self;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn from_usize(n: usize) -> Self;
}

macro_rules! impl_real {
    ($t:ty) => {
        impl Real for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            #[inline]
            fn from_usize(n: usize) -> Self {
                n as $t
            }
        }

        impl DistanceFunction<Vec<$t>> for DistanceMetric {
            type Distance = $t;

            #[inline]
            fn distance(&self, a: &Vec<$t>, b: &Vec<$t>) -> $t {
                self.compute(a, b)
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);

impl DistanceMetric {
    /// Applies the metric to two equally-sized slices.
    pub fn compute<T: Real>(&self, a: &[T], b: &[T]) -> T {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::Cosine => {
                let (mut dot, mut na, mut nb) = (T::ZERO, T::ZERO, T::ZERO);
                for (&x, &y) in a.iter().zip(b) {
                    dot = dot + x * y;
                    na = na + x * x;
                    nb = nb + y * y;
                }
                if na == T::ZERO || nb == T::ZERO {
                    T::ONE
                } else {
                    T::ONE - dot / (na.sqrt() * nb.sqrt())
                }
            }
            DistanceMetric::InnerProduct => {
                T::ONE - a.iter().zip(b).map(|(&x, &y)| x * y).sum::<T>()
            }
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(&x, &y)| (x - y) * (x - y))
                .sum::<T>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(&x, &y)| (x - y).abs()).sum(),
            DistanceMetric::Canberra => a
                .iter()
                .zip(b)
                .map(|(&x, &y)| {
                    let denom = x.abs() + y.abs();
                    if denom == T::ZERO {
                        T::ZERO
                    } else {
                        (x - y).abs() / denom
                    }
                })
                .sum(),
            DistanceMetric::BrayCurtis => {
                let (mut num, mut den) = (T::ZERO, T::ZERO);
                for (&x, &y) in a.iter().zip(b) {
                    num = num + (x - y).abs();
                    den = den + (x + y).abs();
                }
                if den == T::ZERO {
                    T::ZERO
                } else {
                    num / den
                }
            }
            DistanceMetric::Correlation => {
                if a.is_empty() {
                    return T::ONE;
                }
                let n = T::from_usize(a.len());
                let mean_a = a.iter().copied().sum::<T>() / n;
                let mean_b = b.iter().copied().sum::<T>() / n;
                let (mut num, mut den_a, mut den_b) = (T::ZERO, T::ZERO, T::ZERO);
                for (&x, &y) in a.iter().zip(b) {
                    let dx = x - mean_a;
                    let dy = y - mean_b;
                    num = num + dx * dy;
                    den_a = den_a + dx * dx;
                    den_b = den_b + dy * dy;
                }
                if den_a == T::ZERO || den_b == T::ZERO {
                    T::ONE
                } else {
                    T::ONE - num / (den_a.sqrt() * den_b.sqrt())
                }
            }
        }
    }
}
