//! Secondary ordered stores for dirindex.
//!
//! When a key of a duplicate-enabled index accumulates many values, the index
//! stops keeping those values inline and moves them into a *secondary store*:
//! an ordered set of values with its own browsing cursor.  This crate defines
//! the interface the index engine needs from such a store ([`OrderedStore`],
//! [`StoreBrowser`]), the factory that creates them ([`StoreFactory`]), and an
//! in-memory reference implementation ([`memory::MemoryStoreFactory`]).
//!
//! A disk-backed store (a B-tree over a page/record manager) plugs in through
//! the same traits.

use std::path::Path;

use dirindex_types::Comparator;

pub use crate::error::{StoreError, StoreId};

pub mod error;
pub mod memory;
pub mod metrics;

/// Where a new [`StoreBrowser`] starts.
///
/// A browser is always positioned in a *gap* between two adjacent values (or
/// before the first, or after the last).
#[derive(Debug)]
pub enum BrowseStart<'a, V> {
    /// In front of the first value.
    First,

    /// Behind the last value.
    Last,

    /// Immediately before the smallest value that is greater than or equal to
    /// the given one.
    Before(&'a V),

    /// Immediately after the largest value that is less than or equal to the
    /// given one.
    After(&'a V),
}

/// A browsing cursor over an [`OrderedStore`].
///
/// [`next`](Self::next) returns the value after the browser's gap and moves
/// the gap past it; [`previous`](Self::previous) returns the value before the
/// gap and moves the gap in front of it.  Consequently, calling `previous`
/// right after `next` returns the same value again.  Callers that think of
/// the browser as sitting *on* the last value it returned have to skip that
/// repeat when they change direction.
pub trait StoreBrowser<V> {
    fn next(&mut self) -> Result<Option<V>, StoreError>;

    fn previous(&mut self) -> Result<Option<V>, StoreError>;
}

/// An ordered set of values, ordered by the comparator it was created with.
pub trait OrderedStore<V>: Send + Sync {
    /// Identifies this store within its factory.
    fn id(&self) -> StoreId;

    /// Inserts `value`.  Returns `false`, leaving the store unchanged, if an
    /// equal value was already present.
    fn insert(&mut self, value: V) -> Result<bool, StoreError>;

    /// Removes `value`.  Returns `false` if it was not present.
    fn remove(&mut self, value: &V) -> Result<bool, StoreError>;

    fn contains(&self, value: &V) -> Result<bool, StoreError>;

    /// Number of values in the store.
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Opens a browser positioned at `start`.
    fn browse<'a>(
        &'a self,
        start: BrowseStart<'_, V>,
    ) -> Result<Box<dyn StoreBrowser<V> + 'a>, StoreError>;

    /// Releases the store.  Every later call fails with
    /// [`StoreError::Closed`].  Closing twice is not an error.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// Creates secondary stores.
pub trait StoreFactory<V>: Send + Sync {
    /// Short name of the backend, used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Creates a new, empty store ordered by `comparator`.
    fn create(&self, comparator: Comparator<V>) -> Result<Box<dyn OrderedStore<V>>, StoreError>;

    /// Whether [`OrderedStore::len`] is exact for stores of this backend.
    fn counts_exact(&self) -> bool {
        true
    }

    /// Sets the number of entries the backend may cache.
    fn set_cache_size(&self, _entries: usize) -> Result<(), StoreError> {
        Err(StoreError::unsupported(self.backend(), "setting a cache size"))
    }

    /// Sets the directory where the backend keeps its files.
    fn set_working_directory(&self, _path: &Path) -> Result<(), StoreError> {
        Err(StoreError::unsupported(
            self.backend(),
            "setting a working directory",
        ))
    }
}
