//! Joining per-partition results after a parallel pass.
//!
//! Each worker thread runs over a fixed, contiguous partition of the element
//! range and produces a partial result. Partials are combined with
//! [`Join::join`], which must be associative. Only three shapes of partial
//! are allowed: a [`Sum`], a set [`Union`], and an ordered [`Concat`].
//!
//! # Floating-point sums
//!
//! Floating-point addition is not associative, so a sum is only reproducible
//! if both the partition boundaries and the join order are fixed. The assembly
//! loop guarantees both: partitions are a function of the element count and
//! the configured chunk size (never of the thread count), and
//! [`join_ordered`] folds them strictly left to right.

use std::collections::BTreeSet;
use std::ops::AddAssign;

/// Associative combination of two partial results.
pub trait Join {
    /// Combine `self` (earlier partition) with `other` (later partition).
    fn join(self, other: Self) -> Self;
}

/// Fold partials in partition order, starting from `T::default()`.
pub fn join_ordered<T, I>(partials: I) -> T
where
    T: Join + Default,
    I: IntoIterator<Item = T>,
{
    partials
        .into_iter()
        .fold(T::default(), |acc, part| acc.join(part))
}

/// Arithmetic sum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sum<T>(pub T);

impl<T: AddAssign> Join for Sum<T> {
    fn join(mut self, other: Self) -> Self {
        self.0 += other.0;
        self
    }
}

/// Set union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Union<T: Ord>(pub BTreeSet<T>);

impl<T: Ord> Default for Union<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Ord> Union<T> {
    pub fn insert(&mut self, value: T) {
        self.0.insert(value);
    }
}

impl<T: Ord> Join for Union<T> {
    fn join(mut self, mut other: Self) -> Self {
        self.0.append(&mut other.0);
        self
    }
}

/// Order-preserving concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct Concat<T>(pub Vec<T>);

impl<T> Default for Concat<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Concat<T> {
    pub fn push(&mut self, value: T) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Join for Concat<T> {
    fn join(mut self, mut other: Self) -> Self {
        self.0.append(&mut other.0);
        self
    }
}

impl<A: Join, B: Join> Join for (A, B) {
    fn join(self, other: Self) -> Self {
        (self.0.join(other.0), self.1.join(other.1))
    }
}

impl<T: Join> Join for Vec<T> {
    /// Element-wise join; the shorter side is padded by the longer one's tail.
    fn join(self, other: Self) -> Self {
        let mut out = Vec::with_capacity(self.len().max(other.len()));
        let mut a = self.into_iter();
        let mut b = other.into_iter();
        loop {
            match (a.next(), b.next()) {
                (Some(x), Some(y)) => out.push(x.join(y)),
                (Some(x), None) => out.push(x),
                (None, Some(y)) => out.push(y),
                (None, None) => break,
            }
        }
        out
    }
}
