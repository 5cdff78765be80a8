//! Total-order comparators for index keys and values.
//!
//! Attribute values in a directory are ordered by matching rules that are
//! looked up at runtime, so the index engine cannot rely on [`Ord`].  Instead,
//! every table and tree is built from a [`Comparator`] supplied by the caller.

use std::cmp::Ordering;
use std::sync::Arc;

/// A shareable total order over `T`.
///
/// The comparator must be a strict total order: it must be consistent
/// (`cmp(a, b) == cmp(b, a).reverse()`) and transitive.  Two elements that
/// compare [`Ordering::Equal`] are treated as the same element.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Returns the comparator for `T`'s own [`Ord`] implementation.
pub fn natural<T>() -> Comparator<T>
where
    T: Ord + 'static,
{
    Arc::new(|a: &T, b: &T| a.cmp(b))
}

/// Wraps a closure as a [`Comparator`].
pub fn from_fn<T, F>(f: F) -> Comparator<T>
where
    F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Returns a comparator that orders elements opposite to `comparator`.
pub fn reversed<T>(comparator: Comparator<T>) -> Comparator<T>
where
    T: 'static,
{
    Arc::new(move |a: &T, b: &T| comparator(b, a))
}
